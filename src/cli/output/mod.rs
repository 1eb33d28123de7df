//! Terminal output formatting.

pub mod table;

pub use table::{time_ago, TableFormatter};
