//! Quarto documents as sequences of executable cells.

mod parser;
mod selector;

pub use parser::{file_stem, parse_qmd, parse_str, CodeCell};
pub use selector::{parse_selector_list, select_cells};
