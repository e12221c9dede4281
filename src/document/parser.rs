//! Quarto (`.qmd`) code cell extraction.

use std::fs;
use std::path::Path;

use crate::error::QkernelError;
use crate::Result;

/// One executable code cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeCell {
    /// 0-based position among the document's code cells.
    pub index: usize,
    /// Label from `#| label:` or the fence header.
    pub label: Option<String>,
    /// Language named in the fence, e.g. `python`.
    pub language: String,
    /// Code with the cell option lines removed.
    pub source: String,
    /// 1-based line of the opening fence.
    pub line: usize,
}

impl CodeCell {
    /// Stable identifier: the label when present, otherwise the index.
    pub fn id(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.index.to_string(),
        }
    }
}

/// Read and parse a `.qmd` file.
pub fn parse_qmd(path: &Path) -> Result<Vec<CodeCell>> {
    let text = fs::read_to_string(path)?;
    parse_str(&text).map_err(|reason| QkernelError::Parse {
        path: path.to_path_buf(),
        reason,
    })
}

/// File name without its extension, used to key the output cache.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_string())
}

/// An opening fence.
struct Fence {
    ticks: usize,
    header: Option<Header>,
    line: usize,
}

/// Parsed `{lang ...}` fence header.
#[derive(Debug, PartialEq, Eq)]
struct Header {
    language: String,
    label: Option<String>,
}

/// Extract the code cells from Quarto markdown.
///
/// Returns the reason on failure; [`parse_qmd`] attaches the path.
pub fn parse_str(text: &str) -> std::result::Result<Vec<CodeCell>, String> {
    let mut cells = Vec::new();
    let mut open: Option<Fence> = None;
    let mut body: Vec<&str> = Vec::new();

    for (n, line) in text.lines().enumerate() {
        let line_no = n + 1;

        let Some(ticks) = open.as_ref().map(|f| f.ticks) else {
            if let Some((ticks, info)) = fence_marker(line) {
                open = Some(Fence {
                    ticks,
                    header: parse_header(info),
                    line: line_no,
                });
                body.clear();
            }
            continue;
        };

        if !is_closing(line, ticks) {
            body.push(line);
        } else if let Some(Fence {
            header: Some(header),
            line,
            ..
        }) = open.take()
        {
            cells.push(build_cell(cells.len(), header, line, &body));
        }
    }

    if let Some(Fence {
        header: Some(header),
        line,
        ..
    }) = open
    {
        return Err(format!(
            "unterminated {} code block starting at line {line}",
            header.language
        ));
    }

    Ok(cells)
}

/// Returns the backtick count and info string of a fence line.
fn fence_marker(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let ticks = trimmed.chars().take_while(|&c| c == '`').count();
    (ticks >= 3).then(|| (ticks, trimmed[ticks..].trim()))
}

fn is_closing(line: &str, ticks: usize) -> bool {
    matches!(fence_marker(line), Some((n, "")) if n >= ticks)
}

/// Parse an executable header such as `{python}`, `{python setup}` or
/// `{python, label="setup"}`.
///
/// Display-only forms (`{=html}`, `{.python}`, `{{python}}`) and plain
/// fences are not executable.
fn parse_header(info: &str) -> Option<Header> {
    let inner = info.strip_prefix('{')?.strip_suffix('}')?.trim();
    if inner.is_empty() || inner.starts_with(['{', '=', '.']) {
        return None;
    }

    let mut parts = inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty());
    let language = parts.next()?.to_string();
    let mut label = None;

    for part in parts {
        match part.split_once('=') {
            Some((key, value)) if key.trim() == "label" => label = Some(unquote(value)),
            Some(_) => {}
            None if label.is_none() => label = Some(unquote(part)),
            None => {}
        }
    }

    Some(Header { language, label })
}

fn build_cell(index: usize, header: Header, line: usize, body: &[&str]) -> CodeCell {
    let mut label = header.label;
    let mut options_done = false;
    let mut source = Vec::with_capacity(body.len());

    for &line in body {
        if !options_done {
            if let Some(option) = line.trim_start().strip_prefix("#|") {
                if let Some((key, value)) = option.split_once(':') {
                    if key.trim() == "label" {
                        label = Some(unquote(value));
                    }
                }
                continue;
            }
            options_done = true;
        }
        source.push(line);
    }

    CodeCell {
        index,
        label: label.filter(|l| !l.is_empty()),
        language: header.language,
        source: source.join("\n"),
        line,
    }
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches(|c| c == '"' || c == '\'').to_string()
}
