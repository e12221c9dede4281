//! Representation-type tagged payloads (`data` dictionaries).

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// A representation type the crate knows by name.
///
/// Anything else is carried as [`MimeType::Other`] so downstream consumers
/// can still handle it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MimeType {
    TextPlain,
    TextHtml,
    TextMarkdown,
    TextLatex,
    ImagePng,
    ImageJpeg,
    ImageGif,
    ImageSvg,
    ImageWebp,
    ApplicationPdf,
    ApplicationJson,
    Other(String),
}

impl MimeType {
    /// Parse a MIME tag.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "text/plain" => Self::TextPlain,
            "text/html" => Self::TextHtml,
            "text/markdown" => Self::TextMarkdown,
            "text/latex" => Self::TextLatex,
            "image/png" => Self::ImagePng,
            // `image/jpg` is not registered but kernels emit it.
            "image/jpeg" | "image/jpg" => Self::ImageJpeg,
            "image/gif" => Self::ImageGif,
            "image/svg+xml" => Self::ImageSvg,
            "image/webp" => Self::ImageWebp,
            "application/pdf" => Self::ApplicationPdf,
            "application/json" => Self::ApplicationJson,
            other => Self::Other(other.to_string()),
        }
    }

    /// The canonical tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::TextPlain => "text/plain",
            Self::TextHtml => "text/html",
            Self::TextMarkdown => "text/markdown",
            Self::TextLatex => "text/latex",
            Self::ImagePng => "image/png",
            Self::ImageJpeg => "image/jpeg",
            Self::ImageGif => "image/gif",
            Self::ImageSvg => "image/svg+xml",
            Self::ImageWebp => "image/webp",
            Self::ApplicationPdf => "application/pdf",
            Self::ApplicationJson => "application/json",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payload in a bundle.
#[derive(Debug, Clone, PartialEq)]
pub enum MimePayload {
    /// A string value (plain text, base64 image data, SVG source...).
    Text(String),
    /// Structured JSON such as `application/json` content.
    Json(Value),
}

impl MimePayload {
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            // Some kernels split text into a list of lines.
            Value::Array(items) if items.iter().all(Value::is_string) => Self::Text(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .concat(),
            ),
            other => Self::Json(other),
        }
    }

    /// The payload as text, if it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Json(_) => None,
        }
    }
}

/// Payloads of a single output keyed by representation type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MimeBundle {
    entries: BTreeMap<MimeType, MimePayload>,
}

impl MimeBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bundle from a message's `data` object.
    ///
    /// A non-object value yields an empty bundle.
    pub fn from_json(data: &Value) -> Self {
        let entries = data
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(tag, value)| (MimeType::parse(tag), MimePayload::from_value(value.clone())))
                    .collect()
            })
            .unwrap_or_default();
        Self { entries }
    }

    /// Insert a payload, returning `self` for chaining.
    pub fn with(mut self, mime: MimeType, payload: MimePayload) -> Self {
        self.entries.insert(mime, payload);
        self
    }

    /// Look up a payload.
    pub fn get(&self, mime: &MimeType) -> Option<&MimePayload> {
        self.entries.get(mime)
    }

    /// Textual payload for a type.
    pub fn text(&self, mime: &MimeType) -> Option<&str> {
        self.get(mime).and_then(MimePayload::as_text)
    }

    /// The `text/plain` representation.
    pub fn plain_text(&self) -> Option<&str> {
        self.text(&MimeType::TextPlain)
    }

    /// Whether a type is present.
    pub fn contains(&self, mime: &MimeType) -> bool {
        self.entries.contains_key(mime)
    }

    /// Iterate entries in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (&MimeType, &MimePayload)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bundle has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
