//! Presenting execution results.
//!
//! [`OutputRenderer`] prints each cell's text output and saves image and
//! PDF representations under a per-document cache directory:
//!
//! ```text
//! <cache>/<file-stem>/<cell-id>/output.png      one display
//! <cache>/<file-stem>/<cell-id>/output_<i>.svg  several displays
//! ```
//!
//! # Example
//!
//! ```
//! use qkernel::output::AnsiSanitizer;
//!
//! let clean = AnsiSanitizer::strip("\x1b[0;31mNameError\x1b[0m: boom");
//! assert_eq!(clean, "NameError: boom");
//! ```

mod renderer;
mod sanitizer;

pub use renderer::{clear_file_cache, file_cache_dir, print_summary, OutputRenderer};
pub use sanitizer::AnsiSanitizer;
