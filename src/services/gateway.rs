// Submission Gateway
// Turns uploaded files (notebooks, source, documents) into plain submission text

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{ExtractedSubmission, SubmissionKind};
use crate::services::text_processor::normalize_text;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid notebook JSON: {0}")]
    Notebook(#[from] serde_json::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX parsing failed: {0}")]
    Docx(String),
    #[error("File {0} contains no extractable text")]
    Empty(String),
}

/// Classify a file by its extension; unknown extensions are treated as text
pub fn detect_kind(file_name: &str) -> SubmissionKind {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "ipynb" => SubmissionKind::Notebook,
        "pdf" => SubmissionKind::Pdf,
        "docx" => SubmissionKind::Docx,
        "md" | "markdown" => SubmissionKind::Markdown,
        "csv" | "json" | "xml" => SubmissionKind::Data,
        "py" => SubmissionKind::Code("Python".to_string()),
        "cpp" | "cc" | "cxx" | "hpp" => SubmissionKind::Code("C++".to_string()),
        "c" | "h" => SubmissionKind::Code("C".to_string()),
        "java" => SubmissionKind::Code("Java".to_string()),
        "js" | "jsx" => SubmissionKind::Code("JavaScript".to_string()),
        "ts" | "tsx" => SubmissionKind::Code("TypeScript".to_string()),
        "html" => SubmissionKind::Code("HTML".to_string()),
        "css" => SubmissionKind::Code("CSS".to_string()),
        _ => SubmissionKind::Text,
    }
}

pub fn is_supported(file_name: &str) -> bool {
    const KNOWN: &[&str] = &[
        "ipynb", "pdf", "docx", "txt", "md", "markdown", "py", "cpp", "c", "cc", "cxx", "h", "hpp",
        "java", "js", "jsx", "ts", "tsx", "html", "css", "csv", "json", "xml",
    ];
    Path::new(file_name)
        .extension()
        .map(|e| KNOWN.contains(&e.to_string_lossy().to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn extract(file_name: &str, bytes: &[u8]) -> Result<ExtractedSubmission, GatewayError> {
    let kind = detect_kind(file_name);
    if !is_supported(file_name) {
        warn!("[GATEWAY] Unrecognized extension for {}, decoding as text", file_name);
    }

    let raw = match &kind {
        SubmissionKind::Notebook => extract_notebook(bytes)?,
        SubmissionKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| GatewayError::Pdf(e.to_string()))?,
        SubmissionKind::Docx => extract_docx(bytes)?,
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    let text = normalize_text(&raw);
    if text.trim().is_empty() && matches!(kind, SubmissionKind::Pdf | SubmissionKind::Docx) {
        return Err(GatewayError::Empty(file_name.to_string()));
    }

    info!(
        "[GATEWAY] Extracted {} chars from {} ({})",
        text.chars().count(),
        file_name,
        kind.describe()
    );
    Ok(ExtractedSubmission {
        file_name: file_name.to_string(),
        kind,
        text,
    })
}

#[derive(Debug, Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<NotebookCell>,
}

#[derive(Debug, Deserialize)]
struct NotebookCell {
    #[serde(default)]
    cell_type: String,
    #[serde(default)]
    source: CellSource,
}

/// nbformat allows a single string or a list of lines
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Text(String),
    Lines(Vec<String>),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Text(String::new())
    }
}

impl CellSource {
    fn joined(&self) -> String {
        match self {
            CellSource::Text(s) => s.clone(),
            CellSource::Lines(lines) => lines.concat(),
        }
    }
}

/// Code and markdown cell sources, separated by blank lines
fn extract_notebook(bytes: &[u8]) -> Result<String, GatewayError> {
    let notebook: Notebook = serde_json::from_slice(bytes)?;
    let parts: Vec<String> = notebook
        .cells
        .iter()
        .filter(|c| c.cell_type == "code" || c.cell_type == "markdown")
        .map(|c| c.source.joined())
        .filter(|s| !s.trim().is_empty())
        .collect();
    Ok(parts.join("\n\n"))
}

fn extract_docx(bytes: &[u8]) -> Result<String, GatewayError> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| GatewayError::Docx(e.to_string()))?;

    let mut text = String::new();
    for child in &docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(paragraph) => {
                text.push_str(&paragraph_text(paragraph));
                text.push('\n');
            }
            docx_rs::DocumentChild::Table(table) => {
                table_text(table, &mut text);
                text.push('\n');
            }
            _ => {}
        }
    }
    Ok(text)
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut line = String::new();
    for pc in &paragraph.children {
        match pc {
            docx_rs::ParagraphChild::Run(run) => run_text(run, &mut line),
            docx_rs::ParagraphChild::Hyperlink(link) => {
                for lc in &link.children {
                    if let docx_rs::ParagraphChild::Run(run) = lc {
                        run_text(run, &mut line);
                    }
                }
            }
            docx_rs::ParagraphChild::Insert(ins) => {
                for ic in &ins.children {
                    if let docx_rs::InsertChild::Run(run) = ic {
                        run_text(run, &mut line);
                    }
                }
            }
            _ => {}
        }
    }
    line
}

fn run_text(run: &docx_rs::Run, out: &mut String) {
    for rc in &run.children {
        match rc {
            docx_rs::RunChild::Text(t) => out.push_str(&t.text),
            docx_rs::RunChild::Tab(_) => out.push('\t'),
            docx_rs::RunChild::Break(_) => out.push('\n'),
            _ => {}
        }
    }
}

/// One line per row, cells separated by ` | `
fn table_text(table: &docx_rs::Table, out: &mut String) {
    for tc in &table.rows {
        let docx_rs::TableChild::TableRow(row) = tc else {
            continue;
        };
        let mut cells: Vec<String> = Vec::new();
        for rc in &row.cells {
            let docx_rs::TableRowChild::TableCell(cell) = rc else {
                continue;
            };
            let mut cell_text = String::new();
            for cc in &cell.children {
                if let docx_rs::TableCellContent::Paragraph(paragraph) = cc {
                    let t = paragraph_text(paragraph);
                    if !t.trim().is_empty() {
                        if !cell_text.is_empty() {
                            cell_text.push(' ');
                        }
                        cell_text.push_str(t.trim());
                    }
                }
            }
            cells.push(cell_text);
        }
        if cells.iter().any(|c| !c.is_empty()) {
            out.push_str(&cells.join(" | "));
            out.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_kind() {
        assert_eq!(detect_kind("hw1.ipynb"), SubmissionKind::Notebook);
        assert_eq!(detect_kind("Main.CPP"), SubmissionKind::Code("C++".to_string()));
        assert_eq!(detect_kind("essay.docx"), SubmissionKind::Docx);
        assert_eq!(detect_kind("notes"), SubmissionKind::Text);
        assert!(detect_kind("solution.py").is_code());
    }

    #[test]
    fn test_notebook_extraction() {
        let nb = r##"{
            "cells": [
                {"cell_type": "markdown", "source": ["# Title\n", "Intro text"]},
                {"cell_type": "code", "source": "print('hi')", "outputs": []},
                {"cell_type": "raw", "source": "ignored"},
                {"cell_type": "code", "source": []}
            ],
            "nbformat": 4
        }"##;
        let extracted = extract("hw.ipynb", nb.as_bytes()).unwrap();
        assert_eq!(extracted.kind, SubmissionKind::Notebook);
        assert_eq!(extracted.text, "# Title\nIntro text\n\nprint('hi')");
    }

    #[test]
    fn test_invalid_notebook() {
        assert!(matches!(extract("bad.ipynb", b"not json"), Err(GatewayError::Notebook(_))));
    }

    #[test]
    fn test_source_file_normalized() {
        let src = "def add(a, b):\r\n    return a + b\r\n";
        let extracted = extract("add.py", src.as_bytes()).unwrap();
        assert_eq!(extracted.text, "def add(a, b):\n    return a + b");
        assert_eq!(extracted.kind, SubmissionKind::Code("Python".to_string()));
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let extracted = extract("data.bin", &[0x68, 0x69, 0xff]).unwrap();
        assert!(extracted.text.starts_with("hi"));
    }

    #[test]
    fn test_corrupt_docx() {
        assert!(matches!(extract("essay.docx", b"PK-not-a-zip"), Err(GatewayError::Docx(_))));
    }

    #[test]
    fn test_docx_table_text_is_kept() {
        let table = docx_rs::Table::new(vec![docx_rs::TableRow::new(vec![
            docx_rs::TableCell::new()
                .add_paragraph(docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text("Input"))),
            docx_rs::TableCell::new()
                .add_paragraph(docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text("Output"))),
        ])]);
        let docx = docx_rs::Docx::new()
            .add_paragraph(docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text("Lab report")))
            .add_table(table);
        let mut buf = std::io::Cursor::new(Vec::new());
        docx.build().pack(&mut buf).unwrap();

        let extracted = extract("report.docx", &buf.into_inner()).unwrap();
        assert_eq!(extracted.kind, SubmissionKind::Docx);
        assert!(extracted.text.contains("Lab report"));
        assert!(extracted.text.contains("Input | Output"));
    }
}
