//! Typed content blocks
//!
//! Blocks are the language-agnostic content units downstream renderers
//! consume. Each block carries a stable `id` unique within its candidate;
//! text-bearing blocks store `inline_runs` only when they contain non-text
//! runs and `inline_markdown` only when it differs from the plain text.

use serde::{Deserialize, Serialize};

use crate::inline::InlineRun;

/// Shared carrier for the text-bearing block variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_runs: Option<Vec<InlineRun>>,
}

impl RichText {
    pub fn plain(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            inline_markdown: None,
            inline_runs: None,
        }
    }
}

/// One table cell with span accounting and optional rich text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub text: String,
    pub is_header: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_runs: Option<Vec<InlineRun>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colspan: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rowspan: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// An auto-detected link attached to a bibliography reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLink {
    pub href: String,
    pub label: String,
    pub kind: String,
}

/// A tagged, reader-ready content unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    H1(RichText),
    H2(RichText),
    H3(RichText),
    /// Generic heading emitted by the plain-text reader-block splitter.
    Heading(RichText),
    Paragraph(RichText),
    Blockquote(RichText),
    List {
        id: String,
        ordered: bool,
        items: Vec<String>,
    },
    Table {
        id: String,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        header_rows: Vec<Vec<TableCell>>,
        body_rows: Vec<Vec<TableCell>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<Vec<String>>,
    },
    Equation {
        id: String,
        equation_tex: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        equation_number: Option<String>,
    },
    Code {
        id: String,
        text: String,
    },
    Image {
        id: String,
        image_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    Reference {
        id: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor_id: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        links: Vec<ReferenceLink>,
    },
}

const MAX_PROJECTED_HEADER_ROWS: usize = 3;
const MAX_PROJECTED_BODY_ROWS: usize = 8;
const MAX_PROJECTED_NOTES: usize = 8;

impl Block {
    pub fn id(&self) -> &str {
        match self {
            Block::H1(rich)
            | Block::H2(rich)
            | Block::H3(rich)
            | Block::Heading(rich)
            | Block::Paragraph(rich)
            | Block::Blockquote(rich) => &rich.id,
            Block::List { id, .. }
            | Block::Table { id, .. }
            | Block::Equation { id, .. }
            | Block::Code { id, .. }
            | Block::Image { id, .. }
            | Block::Reference { id, .. } => id,
        }
    }

    /// The serialized `type` tag, used for structure-diversity scoring.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Block::H1(_) => "h1",
            Block::H2(_) => "h2",
            Block::H3(_) => "h3",
            Block::Heading(_) => "heading",
            Block::Paragraph(_) => "paragraph",
            Block::Blockquote(_) => "blockquote",
            Block::List { .. } => "list",
            Block::Table { .. } => "table",
            Block::Equation { .. } => "equation",
            Block::Code { .. } => "code",
            Block::Image { .. } => "image",
            Block::Reference { .. } => "reference",
        }
    }

    /// Textual form of the block for the document's plain-text projection.
    ///
    /// Headings, paragraphs, blockquotes, code, and references project their
    /// text; equations project TeX; lists project `- ` items; tables project
    /// the caption, the first header/body rows joined by ` | `, and notes;
    /// images project their caption.
    pub fn projection_text(&self) -> String {
        match self {
            Block::H1(rich)
            | Block::H2(rich)
            | Block::H3(rich)
            | Block::Heading(rich)
            | Block::Paragraph(rich)
            | Block::Blockquote(rich) => normalize_multiline(&rich.text),
            Block::Code { text, .. } => normalize_multiline(text),
            Block::Reference { text, .. } => normalize_multiline(text),
            Block::Equation { equation_tex, .. } => normalize_multiline(equation_tex),
            Block::List { items, .. } => {
                let lines: Vec<String> = items
                    .iter()
                    .map(|item| item.trim())
                    .filter(|item| !item.is_empty())
                    .map(|item| format!("- {item}"))
                    .collect();
                normalize_multiline(&lines.join("\n"))
            }
            Block::Image { caption, .. } => {
                normalize_multiline(caption.as_deref().unwrap_or_default())
            }
            Block::Table {
                columns,
                rows,
                header_rows,
                body_rows,
                caption,
                notes,
                ..
            } => project_table(columns, rows, header_rows, body_rows, caption, notes),
        }
    }
}

fn cells_to_line(cells: &[TableCell]) -> String {
    let values: Vec<&str> = cells
        .iter()
        .map(|cell| cell.text.trim())
        .filter(|text| !text.is_empty())
        .collect();
    values.join(" | ")
}

fn project_table(
    columns: &[String],
    rows: &[Vec<String>],
    header_rows: &[Vec<TableCell>],
    body_rows: &[Vec<TableCell>],
    caption: &Option<String>,
    notes: &Option<Vec<String>>,
) -> String {
    let mut table_lines: Vec<String> = Vec::new();

    if !header_rows.is_empty() {
        for row in header_rows.iter().take(MAX_PROJECTED_HEADER_ROWS) {
            let line = cells_to_line(row);
            if !line.is_empty() {
                table_lines.push(line);
            }
        }
    } else {
        let trimmed: Vec<&str> = columns
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .collect();
        if !trimmed.is_empty() {
            table_lines.push(trimmed.join(" | "));
        }
    }

    if !body_rows.is_empty() {
        for row in body_rows.iter().take(MAX_PROJECTED_BODY_ROWS) {
            let line = cells_to_line(row);
            if !line.is_empty() {
                table_lines.push(line);
            }
        }
    } else {
        for row in rows.iter().take(MAX_PROJECTED_BODY_ROWS) {
            let values: Vec<&str> = row
                .iter()
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .collect();
            if !values.is_empty() {
                table_lines.push(values.join(" | "));
            }
        }
    }

    let mut parts: Vec<String> = Vec::new();
    if let Some(caption) = caption {
        let caption = caption.trim();
        if !caption.is_empty() {
            parts.push(caption.to_string());
        }
    }
    parts.extend(table_lines);
    if let Some(notes) = notes {
        parts.extend(
            notes
                .iter()
                .map(|note| note.trim().to_string())
                .filter(|note| !note.is_empty())
                .take(MAX_PROJECTED_NOTES),
        );
    }
    normalize_multiline(&parts.join("\n"))
}

/// Collapse blank-line runs and per-line whitespace while keeping paragraph
/// breaks, for already-decoded plain text.
pub fn normalize_multiline(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.replace("\r\n", "\n").replace('\r', "\n").split('\n') {
        let cleaned: String = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !cleaned.is_empty() {
            lines.push(cleaned);
        } else if lines.last().map(|last| !last.is_empty()).unwrap_or(false) {
            lines.push(String::new());
        }
    }
    while lines.last().map(|last| last.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(text: &str, is_header: bool) -> TableCell {
        TableCell {
            text: text.into(),
            is_header,
            inline_markdown: None,
            inline_runs: None,
            colspan: None,
            rowspan: None,
            scope: None,
        }
    }

    #[test]
    fn block_serializes_with_type_tag() {
        let block = Block::Equation {
            id: "arxiv-3".into(),
            equation_tex: "L = E + R".into(),
            equation_number: Some("(1)".into()),
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "equation");
        assert_eq!(value["equation_tex"], "L = E + R");
        assert_eq!(value["equation_number"], "(1)");
    }

    #[test]
    fn paragraph_omits_empty_inline_fields() {
        let block = Block::Paragraph(RichText::plain("b1", "plain body"));
        let value = serde_json::to_value(&block).unwrap();
        assert!(value.get("inline_markdown").is_none());
        assert!(value.get("inline_runs").is_none());
    }

    #[test]
    fn table_projection_joins_rows_with_pipes() {
        let block = Block::Table {
            id: "arxiv-5".into(),
            columns: vec![],
            rows: vec![],
            header_rows: vec![vec![cell("Task Group", true), cell("Metric", true)]],
            body_rows: vec![vec![cell("MT", false), cell("BLEU", false)]],
            caption: Some("Main benchmark table".into()),
            notes: Some(vec!["Scores averaged over three runs.".into()]),
        };
        let projected = block.projection_text();
        assert_eq!(
            projected,
            "Main benchmark table\nTask Group | Metric\nMT | BLEU\nScores averaged over three runs."
        );
    }

    #[test]
    fn list_projection_prefixes_items() {
        let block = Block::List {
            id: "arxiv-7".into(),
            ordered: false,
            items: vec!["first".into(), "second".into()],
        };
        assert_eq!(block.projection_text(), "- first\n- second");
    }
}
