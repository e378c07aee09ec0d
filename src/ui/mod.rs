//! Terminal output for the `mccdb` binary

pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{accent, error, header, section, status, success, summary_row};
pub use table::{ObjectTable, stats_table};
pub use theme::{Theme, theme};
