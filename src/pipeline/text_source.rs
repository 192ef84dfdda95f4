use std::fs;
use std::path::Path;
use std::process::Command;

use crate::error::PipelineError;

/// Page texts of one input document, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDocumentText {
    pub pages: Vec<String>,
}

impl RawDocumentText {
    pub fn text(&self) -> String {
        self.pages.join("\n")
    }
}

pub trait TextSource {
    /// File extension (without the dot) of documents this source can read.
    fn extension(&self) -> &str;

    fn extract_text(&self, path: &Path) -> Result<RawDocumentText, PipelineError>;
}

/// Renders the PDF text layer through poppler's `pdftotext`.
#[derive(Debug, Clone)]
pub struct PdftotextSource {
    pub max_pages: Option<usize>,
    pub keep_layout: bool,
}

impl Default for PdftotextSource {
    fn default() -> Self {
        Self {
            max_pages: None,
            keep_layout: true,
        }
    }
}

impl TextSource for PdftotextSource {
    fn extension(&self) -> &str {
        "pdf"
    }

    fn extract_text(&self, path: &Path) -> Result<RawDocumentText, PipelineError> {
        let mut command = Command::new("pdftotext");
        command.arg("-enc").arg("UTF-8").arg("-f").arg("1");
        if let Some(max_pages) = self.max_pages {
            command.arg("-l").arg(max_pages.to_string());
        }
        if self.keep_layout {
            command.arg("-layout");
        }
        command.arg(path).arg("-");

        let output = command.output().map_err(|err| {
            PipelineError::text_source(path, format!("failed to execute pdftotext: {err}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::text_source(
                path,
                format!("pdftotext returned non-zero exit status: {}", stderr.trim()),
            ));
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        let pages = split_pages(&raw);
        if pages.is_empty() {
            return Err(PipelineError::text_source(path, "document has no text layer"));
        }

        Ok(RawDocumentText { pages })
    }
}

/// Reads text dumps that were rendered ahead of time; pages may be separated
/// by form feeds.
#[derive(Debug, Clone, Default)]
pub struct PlainTextSource;

impl TextSource for PlainTextSource {
    fn extension(&self) -> &str {
        "txt"
    }

    fn extract_text(&self, path: &Path) -> Result<RawDocumentText, PipelineError> {
        let bytes = fs::read(path).map_err(|err| PipelineError::text_source(path, err))?;
        let raw = String::from_utf8(bytes)
            .map_err(|err| PipelineError::text_source(path, format!("invalid UTF-8: {err}")))?;

        Ok(RawDocumentText {
            pages: split_pages(&raw),
        })
    }
}

fn split_pages(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', "").replace("\r\n", "\n"))
        .collect();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }

    pages
}
