use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for the roles the CLI prints: headings, field labels, outcomes and object names
#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub heading: Style,
    pub label: Style,
    pub ok: Style,
    pub failure: Style,
    pub name: Style,
}

impl Theme {
    /// `NO_COLOR` and `CLICOLOR` are honored through `console`
    pub fn for_stdout() -> Self {
        let colored = console::Term::stdout().is_term() && console::colors_enabled();
        Self::new(colored)
    }

    pub fn new(colored: bool) -> Self {
        if !colored {
            return Self::default();
        }
        Self {
            heading: Style::new().cyan().bold(),
            label: Style::new().white().dimmed(),
            ok: Style::new().green().bold(),
            failure: Style::new().red().bold(),
            name: Style::new().bright_blue(),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::for_stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use owo_colors::OwoColorize;

    #[test]
    fn test_plain_theme_adds_no_escapes() {
        let plain = Theme::new(false);
        assert_eq!("north".style(plain.name).to_string(), "north");
        assert_ne!("north".style(Theme::new(true).name).to_string(), "north");
    }
}
