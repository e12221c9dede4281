//! ANSI escape stripping for kernel output.
//!
//! Kernels colour their tracebacks with SGR sequences meant for a
//! terminal. When output goes to a file or a pipe those sequences are
//! noise, so they are run through a `vte` parser and only printable text
//! is kept.

use vte::{Parser, Perform};

/// Removes terminal control sequences from text.
pub struct AnsiSanitizer;

impl AnsiSanitizer {
    /// Strip escape sequences from raw bytes.
    ///
    /// Newlines, carriage returns and tabs survive; every other control
    /// character and all CSI/OSC/DCS sequences are dropped.
    pub fn strip_bytes(input: &[u8]) -> String {
        let mut text = PlainText::default();
        let mut parser = Parser::new();
        parser.advance(&mut text, input);
        text.0
    }

    /// Strip escape sequences from a string.
    pub fn strip(input: &str) -> String {
        Self::strip_bytes(input.as_bytes())
    }

    /// Strip every line of a traceback.
    pub fn strip_lines<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
        lines.iter().map(|l| Self::strip(l.as_ref())).collect()
    }
}

#[derive(Default)]
struct PlainText(String);

impl Perform for PlainText {
    fn print(&mut self, c: char) {
        self.0.push(c);
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.0.push(char::from(byte));
        }
    }
}
