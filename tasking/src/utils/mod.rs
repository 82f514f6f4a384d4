//! String utilities shared by agents.

mod extract;

pub use extract::{extract_by_label, fix_incomplete_labels};
