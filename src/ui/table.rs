use crate::notify::AnyDescription;
use tabled::builder::Builder;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
pub struct CountRow {
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Rows")]
    pub rows: usize,
}

pub fn stats_table(stats: &[(String, usize)]) -> String {
    if stats.is_empty() {
        return String::new();
    }
    let rows: Vec<CountRow> = stats
        .iter()
        .map(|(kind, rows)| CountRow { kind: kind.clone(), rows: *rows })
        .collect();
    Table::new(&rows).with(Style::rounded()).to_string()
}

/// One row per object: name, info and a kind-specific detail column
pub struct ObjectTable {
    builder: Builder,
    rows: usize,
}

impl ObjectTable {
    pub fn new() -> Self {
        let mut builder = Builder::default();
        builder.push_record(["Name", "Info", "Details"]);
        Self { builder, rows: 0 }
    }

    pub fn add(&mut self, description: &AnyDescription) {
        self.builder.push_record([
            description.name().hyphenated().to_string(),
            description.info().to_string(),
            details(description),
        ]);
        self.rows += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn build(self) -> String {
        if self.rows == 0 {
            return String::new();
        }
        self.builder.build().with(Style::rounded()).to_string()
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}

fn details(description: &AnyDescription) -> String {
    match description {
        AnyDescription::Channel(d) => format!("{} ({} device(s))", d.settings, d.connected_devices.len()),
        AnyDescription::Device(d) => format!("id {} on {} channel(s)", d.protocol_id.id, d.channels.len()),
        AnyDescription::Protocol(d) => {
            if d.shareable { "shareable".to_string() } else { "exclusive".to_string() }
        }
        AnyDescription::Radar(d) => d.settings.clone(),
        AnyDescription::Firmware(d) => format!("{} bytes", d.payload.len()),
        AnyDescription::DeviceUi(d) => format!("{} bytes", d.payload.len()),
        AnyDescription::TmSession(d) => match d.finished {
            Some(finished) => format!("{} .. {}", d.started.format("%F %T"), finished.format("%F %T")),
            None => format!("{} .. open", d.started.format("%F %T")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RadarDescription;
    use std::sync::Arc;

    #[test]
    fn test_empty_tables_render_nothing() {
        assert!(stats_table(&[]).is_empty());
        assert!(ObjectTable::new().build().is_empty());
    }

    #[test]
    fn test_object_table_lists_rows() {
        let mut table = ObjectTable::new();
        table.add(&AnyDescription::Radar(Arc::new(RadarDescription::new("north", "10.0.0.1"))));
        assert!(!table.is_empty());
        let text = table.build();
        assert!(text.contains("north"));
        assert!(text.contains("10.0.0.1"));
    }
}
