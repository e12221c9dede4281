//! Printing cell results and saving rich outputs to the cache.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

use super::AnsiSanitizer;
use crate::document::CodeCell;
use crate::execution::{BatchOutcome, ExecutionPhase, ExecutionResult, ResultSink};
use crate::protocol::{MimeBundle, MimePayload, MimeType};

const RED: &str = "\u{1b}[91m";
const RESET: &str = "\u{1b}[0m";

/// Representations saved to disk, in preference order.
static SAVED_TYPES: [MimeType; 6] = [
    MimeType::ImagePng,
    MimeType::ImageJpeg,
    MimeType::ImageGif,
    MimeType::ImageSvg,
    MimeType::ImageWebp,
    MimeType::ApplicationPdf,
];

/// File extension for a saved representation.
fn extension(mime: &MimeType) -> Option<&'static str> {
    match mime {
        MimeType::ImagePng => Some("png"),
        MimeType::ImageJpeg => Some("jpg"),
        MimeType::ImageGif => Some("gif"),
        MimeType::ImageSvg => Some("svg"),
        MimeType::ImageWebp => Some("webp"),
        MimeType::ApplicationPdf => Some("pdf"),
        _ => None,
    }
}

/// Cache directory for one document.
pub fn file_cache_dir(cache_root: &Path, file_stem: &str) -> PathBuf {
    cache_root.join(file_stem)
}

/// Empty (or create) a document's cache directory.
pub fn clear_file_cache(cache_root: &Path, file_stem: &str) -> io::Result<PathBuf> {
    let dir = file_cache_dir(cache_root, file_stem);
    match fs::remove_dir_all(&dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    fs::create_dir_all(&dir)?;
    debug!(dir = %dir.display(), "cleared output cache");
    Ok(dir)
}

/// Print the end-of-run totals.
pub fn print_summary<W: Write>(out: &mut W, outcome: &BatchOutcome) -> io::Result<()> {
    writeln!(out, "\n{}", "=".repeat(40))?;
    writeln!(out, "Executed {} cell(s)", outcome.executed)?;
    if !outcome.saved.is_empty() {
        writeln!(out, "Saved {} image(s):", outcome.saved.len())?;
        for path in &outcome.saved {
            writeln!(out, "  - {}", path.display())?;
        }
    }
    if outcome.errors > 0 {
        writeln!(out, "Encountered {} error(s)", outcome.errors)?;
    }
    if outcome.incomplete > 0 {
        writeln!(out, "{} cell(s) did not complete", outcome.incomplete)?;
    }
    out.flush()
}

/// Writes each cell's output to a pair of streams.
pub struct OutputRenderer<W, E> {
    out: W,
    err: E,
    file_cache: PathBuf,
    color_out: bool,
    color_err: bool,
}

impl OutputRenderer<io::Stdout, io::Stderr> {
    /// Render to the process's stdout/stderr, colouring whichever is a
    /// terminal.
    pub fn stdio(file_cache: impl Into<PathBuf>) -> Self {
        let out = io::stdout();
        let err = io::stderr();
        let color_out = out.is_terminal();
        let color_err = err.is_terminal();
        Self::new(out, err, file_cache).with_color(color_out, color_err)
    }
}

impl<W: Write, E: Write> OutputRenderer<W, E> {
    /// Render to arbitrary writers, without colour.
    pub fn new(out: W, err: E, file_cache: impl Into<PathBuf>) -> Self {
        Self {
            out,
            err,
            file_cache: file_cache.into(),
            color_out: false,
            color_err: false,
        }
    }

    /// Enable colour (and raw tracebacks) per stream.
    pub fn with_color(mut self, out: bool, err: bool) -> Self {
        self.color_out = out;
        self.color_err = err;
        self
    }

    pub fn file_cache(&self) -> &Path {
        &self.file_cache
    }

    /// Recover the writers.
    pub fn into_parts(self) -> (W, E) {
        (self.out, self.err)
    }

    fn cell_dir(&self, cell: &CodeCell) -> PathBuf {
        self.file_cache.join(cell.id())
    }

    fn render(
        &mut self,
        cell: &CodeCell,
        result: &ExecutionResult,
        saved: &mut Vec<PathBuf>,
    ) -> io::Result<()> {
        if !result.stdout.is_empty() {
            write!(self.out, "{}", result.stdout)?;
        }

        if !result.stderr.is_empty() {
            if self.color_err {
                write!(self.err, "{RED}{}{RESET}", result.stderr)?;
            } else {
                write!(self.err, "{}", result.stderr)?;
            }
            self.err.flush()?;
        }

        if let Some(text) = result.primary_text() {
            writeln!(self.out, "{text}")?;
        }

        let multiple = result.displays.len() > 1;
        for (i, display) in result.displays.iter().enumerate() {
            self.render_display(cell, display, multiple.then_some(i), saved)?;
        }

        if let Some(failure) = &result.failure {
            if self.color_out {
                writeln!(self.out, "\n{RED}Error: {}: {}{RESET}", failure.kind, failure.message)?;
                for line in &failure.traceback {
                    writeln!(self.out, "{line}")?;
                }
            } else {
                writeln!(self.out, "\nError: {}: {}", failure.kind, failure.message)?;
                for line in AnsiSanitizer::strip_lines(&failure.traceback) {
                    writeln!(self.out, "{line}")?;
                }
            }
        }

        match result.phase {
            ExecutionPhase::TimedOut => writeln!(
                self.out,
                "[Timed out after {:.1}s; the kernel may still be running this cell]",
                result.duration.as_secs_f64()
            )?,
            ExecutionPhase::Disconnected => {
                writeln!(self.out, "[Lost connection to the kernel; output may be incomplete]")?
            }
            _ => {}
        }

        self.out.flush()
    }

    fn render_display(
        &mut self,
        cell: &CodeCell,
        display: &MimeBundle,
        position: Option<usize>,
        saved: &mut Vec<PathBuf>,
    ) -> io::Result<()> {
        let found = SAVED_TYPES
            .iter()
            .find_map(|mime| Some((mime, extension(mime)?, display.get(mime)?)));

        let Some((mime, ext, payload)) = found else {
            if let Some(text) = display.plain_text() {
                writeln!(self.out, "{text}")?;
            } else if display.contains(&MimeType::TextHtml) {
                writeln!(self.out, "[HTML output produced]")?;
            }
            return Ok(());
        };

        let name = match position {
            Some(i) => format!("output_{i}.{ext}"),
            None => format!("output.{ext}"),
        };
        let path = self.cell_dir(cell).join(name);

        match save_payload(mime, payload, &path) {
            Ok(()) => {
                writeln!(self.out, "[Image saved to: {}]", path.display())?;
                saved.push(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to save output");
                writeln!(self.err, "[Failed to save {mime} output: {e}]")?;
            }
        }
        Ok(())
    }
}

impl<W: Write, E: Write> ResultSink for OutputRenderer<W, E> {
    fn session_ready(&mut self, temporary: bool) {
        if temporary {
            let _ = writeln!(self.out, "Started temporary kernel");
        }
    }

    fn cell_started(&mut self, cell: &CodeCell) {
        let label = cell
            .label
            .as_ref()
            .map(|l| format!(" [{l}]"))
            .unwrap_or_default();
        let _ = writeln!(self.out, "\n--- Cell {}{label} ---", cell.index);
        let _ = self.out.flush();
    }

    fn cell_finished(&mut self, cell: &CodeCell, result: &ExecutionResult) -> Vec<PathBuf> {
        let mut saved = Vec::new();
        if let Err(e) = self.render(cell, result, &mut saved) {
            warn!(cell = %cell.id(), error = %e, "failed to write cell output");
        }
        saved
    }
}

/// Write one representation to `path`, decoding base64 for binary types.
fn save_payload(mime: &MimeType, payload: &MimePayload, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let text = match payload {
        MimePayload::Text(text) => text.clone(),
        MimePayload::Json(value) => value.to_string(),
    };

    if *mime == MimeType::ImageSvg {
        return fs::write(path, text);
    }

    let compact: String = text.split_whitespace().collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionFailure;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;

    // 1x1 transparent PNG.
    const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn cell(index: usize, label: Option<&str>) -> CodeCell {
        CodeCell {
            index,
            label: label.map(String::from),
            language: "python".into(),
            source: String::new(),
            line: 1,
        }
    }

    fn renderer(dir: &Path) -> OutputRenderer<Vec<u8>, Vec<u8>> {
        OutputRenderer::new(Vec::new(), Vec::new(), dir.join("doc"))
    }

    fn text(buf: &[u8]) -> String {
        String::from_utf8_lossy(buf).into_owned()
    }

    #[test]
    fn test_text_outputs() {
        let dir = tempdir().unwrap();
        let mut r = renderer(dir.path());
        let result = ExecutionResult {
            stdout: "42\n".into(),
            stderr: "warning\n".into(),
            value: Some(MimeBundle::from_json(&json!({"text/plain": "84"}))),
            phase: ExecutionPhase::Completed,
            ..ExecutionResult::default()
        };

        r.cell_started(&cell(0, Some("setup")));
        let saved = r.cell_finished(&cell(0, Some("setup")), &result);
        let (out, err) = r.into_parts();

        assert!(saved.is_empty());
        assert_eq!(text(&out), "\n--- Cell 0 [setup] ---\n42\n84\n");
        assert_eq!(text(&err), "warning\n");
    }

    #[test]
    fn test_single_image_saved_under_label() {
        let dir = tempdir().unwrap();
        let mut r = renderer(dir.path());
        let result = ExecutionResult {
            displays: vec![MimeBundle::from_json(
                &json!({"image/png": format!("{}\n", PNG_B64), "text/plain": "<Figure>"}),
            )],
            phase: ExecutionPhase::Completed,
            ..ExecutionResult::default()
        };

        let saved = r.cell_finished(&cell(3, Some("plot")), &result);
        let expected = dir.path().join("doc").join("plot").join("output.png");
        assert_eq!(saved, vec![expected.clone()]);

        let bytes = fs::read(&expected).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        let (out, _) = r.into_parts();
        assert!(text(&out).contains("[Image saved to: "));
        assert!(!text(&out).contains("<Figure>"));
    }

    #[test]
    fn test_multiple_displays_are_numbered() {
        let dir = tempdir().unwrap();
        let mut r = renderer(dir.path());
        let result = ExecutionResult {
            displays: vec![
                MimeBundle::from_json(&json!({"image/svg+xml": "<svg/>"})),
                MimeBundle::from_json(&json!({"text/plain": "just text"})),
                MimeBundle::from_json(&json!({"text/html": "<table></table>"})),
                MimeBundle::from_json(&json!({"image/png": PNG_B64})),
            ],
            phase: ExecutionPhase::Completed,
            ..ExecutionResult::default()
        };

        let saved = r.cell_finished(&cell(1, None), &result);
        let cell_dir = dir.path().join("doc").join("1");
        assert_eq!(
            saved,
            vec![cell_dir.join("output_0.svg"), cell_dir.join("output_3.png")]
        );
        assert_eq!(fs::read_to_string(cell_dir.join("output_0.svg")).unwrap(), "<svg/>");

        let (out, _) = r.into_parts();
        let out = text(&out);
        assert!(out.contains("just text\n"));
        assert!(out.contains("[HTML output produced]\n"));
    }

    #[test]
    fn test_bad_base64_is_reported_not_saved() {
        let dir = tempdir().unwrap();
        let mut r = renderer(dir.path());
        let result = ExecutionResult {
            displays: vec![MimeBundle::from_json(&json!({"image/png": "not base64!"}))],
            ..ExecutionResult::default()
        };

        let saved = r.cell_finished(&cell(0, None), &result);
        assert!(saved.is_empty());
        let (_, err) = r.into_parts();
        assert!(text(&err).contains("Failed to save image/png output"));
    }

    #[test]
    fn test_failure_traceback_stripped_without_color() {
        let dir = tempdir().unwrap();
        let mut r = renderer(dir.path());
        let result = ExecutionResult {
            failure: Some(ExecutionFailure {
                kind: "NameError".into(),
                message: "name 'undefined_name' is not defined".into(),
                traceback: vec!["\u{1b}[0;31mNameError\u{1b}[0m: boom".into()],
            }),
            phase: ExecutionPhase::Completed,
            ..ExecutionResult::default()
        };

        r.cell_finished(&cell(0, None), &result);
        let (out, _) = r.into_parts();
        assert_eq!(
            text(&out),
            "\nError: NameError: name 'undefined_name' is not defined\nNameError: boom\n"
        );
    }

    #[test]
    fn test_failure_colored_on_terminal() {
        let dir = tempdir().unwrap();
        let mut r = renderer(dir.path()).with_color(true, true);
        let result = ExecutionResult {
            stderr: "oops".into(),
            failure: Some(ExecutionFailure {
                kind: "ValueError".into(),
                message: "bad".into(),
                traceback: vec!["\u{1b}[0;31mraw\u{1b}[0m".into()],
            }),
            ..ExecutionResult::default()
        };

        r.cell_finished(&cell(0, None), &result);
        let (out, err) = r.into_parts();
        assert!(text(&out).contains("\u{1b}[91mError: ValueError: bad\u{1b}[0m"));
        assert!(text(&out).contains("\u{1b}[0;31mraw"));
        assert_eq!(text(&err), "\u{1b}[91moops\u{1b}[0m");
    }

    #[test]
    fn test_timeout_note() {
        let dir = tempdir().unwrap();
        let mut r = renderer(dir.path());
        let result = ExecutionResult {
            phase: ExecutionPhase::TimedOut,
            duration: Duration::from_millis(1500),
            ..ExecutionResult::default()
        };

        r.cell_finished(&cell(0, None), &result);
        let (out, _) = r.into_parts();
        assert!(text(&out).contains("[Timed out after 1.5s"));
    }

    #[test]
    fn test_clear_file_cache() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("doc").join("0").join("output.png");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"old").unwrap();

        let cleared = clear_file_cache(dir.path(), "doc").unwrap();
        assert_eq!(cleared, dir.path().join("doc"));
        assert!(cleared.is_dir());
        assert!(!stale.exists());

        // Idempotent on a missing directory.
        let fresh = clear_file_cache(dir.path(), "other").unwrap();
        assert!(fresh.is_dir());
    }

    #[test]
    fn test_print_summary() {
        let outcome = BatchOutcome {
            executed: 3,
            errors: 1,
            saved: vec![PathBuf::from("/cache/doc/plot/output.png")],
            ..BatchOutcome::default()
        };
        let mut out = Vec::new();
        print_summary(&mut out, &outcome).unwrap();

        let out = text(&out);
        assert!(out.contains("Executed 3 cell(s)\n"));
        assert!(out.contains("Saved 1 image(s):\n  - /cache/doc/plot/output.png\n"));
        assert!(out.contains("Encountered 1 error(s)\n"));
        assert!(!out.contains("did not complete"));
    }

    #[test]
    fn test_summary_without_errors() {
        let mut out = Vec::new();
        print_summary(&mut out, &BatchOutcome { executed: 1, ..BatchOutcome::default() }).unwrap();
        let out = text(&out);
        assert!(!out.contains("image(s)"));
        assert!(!out.contains("error(s)"));
    }
}
