//! Single-note export to downloadable artifacts.
//!
//! # Responsibility
//! - Render a note's title and content as markdown, plain text or HTML.
//! - Derive a file-system safe file name from the title.
//!
//! # Invariants
//! - Markdown and plain text carry the content verbatim.
//! - HTML wraps the escaped markdown source in one `<pre>` block; markdown
//!   is not rendered.

use crate::model::note::DEFAULT_NOTE_TITLE;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

static FILE_NAME_RESERVED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]+"#).expect("valid file name regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

const MAX_FILE_STEM_CHARS: usize = 120;

const HTML_STYLESHEET: &str = "body { font-family: -apple-system, BlinkMacSystemFont, \"Segoe UI\", sans-serif; margin: 2rem auto; max-width: 48rem; padding: 0 1rem; }\n\
pre { white-space: pre-wrap; word-wrap: break-word; font-family: inherit; line-height: 1.5; }";

/// Output format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Markdown,
    PlainText,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::PlainText => "txt",
            Self::Html => "html",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Markdown => "text/markdown",
            Self::PlainText => "text/plain",
            Self::Html => "text/html",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(Self::Markdown),
            "txt" | "text" | "plain" => Ok(Self::PlainText),
            "html" | "htm" => Ok(Self::Html),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Export failures.
#[derive(Debug)]
pub enum ExportError {
    UnknownFormat(String),
    Io { path: PathBuf, source: std::io::Error },
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownFormat(value) => {
                write!(f, "unknown export format `{value}`; expected md|txt|html")
            }
            Self::Io { path, source } => {
                write!(f, "cannot write export to `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::UnknownFormat(_) => None,
        }
    }
}

/// Rendered export ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime_type: &'static str,
    pub body: String,
}

impl ExportArtifact {
    /// Writes the artifact into `dir` and returns the written path.
    pub fn write_into(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
        let path = dir.as_ref().join(&self.file_name);
        fs::write(&path, &self.body).map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;
        info!(
            "event=note_export module=export status=ok mime={} bytes={}",
            self.mime_type,
            self.body.len()
        );
        Ok(path)
    }
}

/// Renders `title` and `content` in `format`.
pub fn export_note(title: &str, content: &str, format: ExportFormat) -> ExportArtifact {
    let display_title = display_title(title);
    let body = match format {
        ExportFormat::Markdown | ExportFormat::PlainText => content.to_string(),
        ExportFormat::Html => render_html(display_title, content),
    };
    ExportArtifact {
        file_name: format!("{}.{}", file_stem(display_title), format.extension()),
        mime_type: format.mime_type(),
        body,
    }
}

fn display_title(title: &str) -> &str {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        DEFAULT_NOTE_TITLE
    } else {
        trimmed
    }
}

fn render_html(title: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>\n{HTML_STYLESHEET}\n</style>\n</head>\n<body>\n<pre>{}</pre>\n</body>\n</html>\n",
        escape_html(title),
        escape_html(content)
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn file_stem(title: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(title, " ");
    let replaced = FILE_NAME_RESERVED_RE.replace_all(&collapsed, "_");
    let stem = replaced
        .trim()
        .trim_matches('.')
        .chars()
        .take(MAX_FILE_STEM_CHARS)
        .collect::<String>();
    if stem.trim().is_empty() {
        DEFAULT_NOTE_TITLE.to_string()
    } else {
        stem.trim().to_string()
    }
}
