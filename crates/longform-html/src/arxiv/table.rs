//! Table extraction, both `<table>` markup and span-based `ltx_tabular`
//! figures

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};

use longform_types::inline::{normalize_inline_spacing, runs_have_structure, runs_to_markdown, runs_to_plain_text};
use longform_types::{Block, TableCell};

use super::inline::extract_inline_runs;
use super::{
    direct_children, element_text_space, find_descendant, has_class, normalize_text_single_line,
    parent_or_self_figure,
};
use crate::text::truncate_chars;

pub(crate) const MAX_TABLE_ROWS: usize = 24;
const MAX_TABLE_COLS: u32 = 10;
const MAX_HEADER_ROWS: usize = 4;
const MAX_TABLE_CELL_CHARS: usize = 280;
const MAX_TABLE_NOTES: usize = 8;

static COLSPAN_CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ltx_colspan_(\d+)$").unwrap());
static ROWSPAN_CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ltx_rowspan_(\d+)$").unwrap());
static CAPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("caption").unwrap());
static TABULAR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".ltx_tabular").unwrap());
static NOTE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [".ltx_note", ".ltx_tablenote", ".ltx_note_outer"]
        .iter()
        .map(|selector| Selector::parse(selector).unwrap())
        .collect()
});

fn parse_positive_int(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value >= 1)
        .unwrap_or(default)
}

fn class_span_value(el: ElementRef, pattern: &Regex, default: u32) -> u32 {
    for class in el.value().classes() {
        if let Some(captures) = pattern.captures(class.trim()) {
            return parse_positive_int(Some(&captures[1]), default);
        }
    }
    default
}

fn table_cell(cell: ElementRef) -> Option<TableCell> {
    let inline_runs = extract_inline_runs(cell, None, false);
    let mut text = normalize_inline_spacing(&runs_to_plain_text(&inline_runs));
    if text.is_empty() {
        text = normalize_text_single_line(&element_text_space(cell));
    }
    let text = truncate_chars(&text, MAX_TABLE_CELL_CHARS);

    let mut colspan = parse_positive_int(cell.value().attr("colspan"), 1);
    if colspan == 1 {
        colspan = class_span_value(cell, &COLSPAN_CLASS_RE, 1);
    }
    let mut rowspan = parse_positive_int(cell.value().attr("rowspan"), 1);
    if rowspan == 1 {
        rowspan = class_span_value(cell, &ROWSPAN_CLASS_RE, 1);
    }
    let is_header = cell.value().name() == "th" || has_class(cell, "ltx_th");

    if text.is_empty() && colspan == 1 && rowspan == 1 {
        return None;
    }

    let inline_markdown = {
        let markdown = normalize_inline_spacing(&runs_to_markdown(&inline_runs));
        (!markdown.is_empty() && markdown != text).then_some(markdown)
    };
    let inline_runs = runs_have_structure(&inline_runs).then_some(inline_runs);

    let mut scope = cell
        .value()
        .attr("scope")
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if scope.is_empty() {
        if has_class(cell, "ltx_th_row") {
            scope = "row".into();
        } else if has_class(cell, "ltx_th_column") {
            scope = "col".into();
        }
    }

    Some(TableCell {
        text,
        is_header,
        inline_markdown,
        inline_runs,
        colspan: (colspan > 1).then_some(colspan),
        rowspan: (rowspan > 1).then_some(rowspan),
        scope: (!scope.is_empty()).then_some(scope),
    })
}

fn collect_cells<'a>(candidates: impl Iterator<Item = ElementRef<'a>>) -> Vec<TableCell> {
    let mut parsed: Vec<TableCell> = Vec::new();
    let mut column_budget = 0u32;
    for cell in candidates {
        let Some(parsed_cell) = table_cell(cell) else {
            continue;
        };
        let span = parsed_cell.colspan.unwrap_or(1);
        if column_budget + span > MAX_TABLE_COLS {
            break;
        }
        column_budget += span;
        parsed.push(parsed_cell);
    }
    parsed
}

fn table_row_cells(tr: ElementRef) -> Vec<TableCell> {
    let direct: Vec<ElementRef> = direct_children(tr)
        .filter(|child| matches!(child.value().name(), "th" | "td"))
        .collect();
    if !direct.is_empty() {
        return collect_cells(direct.into_iter());
    }
    let all = tr
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|node| matches!(node.value().name(), "th" | "td"));
    collect_cells(all)
}

fn collect_table_rows(section: Option<ElementRef>, max_rows: usize) -> Vec<Vec<TableCell>> {
    let Some(section) = section else {
        return Vec::new();
    };
    let mut rows: Vec<Vec<TableCell>> = Vec::new();
    for tr in direct_children(section).filter(|child| child.value().name() == "tr") {
        let parsed = table_row_cells(tr);
        if parsed.is_empty() {
            continue;
        }
        rows.push(parsed);
        if rows.len() >= max_rows {
            break;
        }
    }
    if !rows.is_empty() {
        return rows;
    }
    for tr in section
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|node| node.value().name() == "tr" && node.id() != section.id())
    {
        let parsed = table_row_cells(tr);
        if parsed.is_empty() {
            continue;
        }
        rows.push(parsed);
        if rows.len() >= max_rows {
            break;
        }
    }
    rows
}

fn span_row_cells(row: ElementRef) -> Vec<TableCell> {
    let direct: Vec<ElementRef> = direct_children(row)
        .filter(|child| has_class(*child, "ltx_td"))
        .collect();
    if !direct.is_empty() {
        return collect_cells(direct.into_iter());
    }
    let all = row
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|node| has_class(*node, "ltx_td") && node.id() != row.id());
    collect_cells(all)
}

fn collect_span_rows(section: Option<ElementRef>, max_rows: usize) -> Vec<Vec<TableCell>> {
    let Some(section) = section else {
        return Vec::new();
    };
    let mut row_tags: Vec<ElementRef> = direct_children(section)
        .filter(|child| has_class(*child, "ltx_tr"))
        .collect();
    if row_tags.is_empty() {
        row_tags = section
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|node| has_class(*node, "ltx_tr") && node.id() != section.id())
            .collect();
    }

    let mut rows: Vec<Vec<TableCell>> = Vec::new();
    for row_tag in row_tags {
        let parsed = span_row_cells(row_tag);
        if parsed.is_empty() {
            continue;
        }
        rows.push(parsed);
        if rows.len() >= max_rows {
            break;
        }
    }
    rows
}

fn collect_span_section_rows(
    tabular: ElementRef,
    section_class: &str,
    max_rows: usize,
) -> Vec<Vec<TableCell>> {
    let mut sections: Vec<ElementRef> = direct_children(tabular)
        .filter(|child| has_class(*child, section_class))
        .collect();
    if sections.is_empty() {
        sections = tabular
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|node| has_class(*node, section_class) && node.id() != tabular.id())
            .collect();
    }

    let mut rows: Vec<Vec<TableCell>> = Vec::new();
    for section in sections {
        let remaining = max_rows.saturating_sub(rows.len());
        if remaining == 0 {
            break;
        }
        rows.extend(collect_span_rows(Some(section), remaining));
    }
    rows
}

fn legacy_row_text(row: &[TableCell]) -> Vec<String> {
    row.iter()
        .map(|cell| cell.text.trim().to_string())
        .filter(|text| !text.is_empty())
        .take(MAX_TABLE_COLS as usize)
        .collect()
}

fn table_caption(el: ElementRef) -> String {
    if let Some(caption_el) = el.select(&CAPTION_SELECTOR).next() {
        let runs = extract_inline_runs(caption_el, None, false);
        let caption = normalize_inline_spacing(&runs_to_plain_text(&runs));
        if !caption.is_empty() {
            return caption;
        }
    }

    if let Some(figure) = parent_or_self_figure(el) {
        if let Some(figcaption) = find_descendant(figure, "figcaption") {
            let runs = extract_inline_runs(figcaption, None, false);
            let caption = normalize_inline_spacing(&runs_to_plain_text(&runs));
            if !caption.is_empty() {
                return caption;
            }
        }
    }
    String::new()
}

fn table_notes(el: ElementRef) -> Vec<String> {
    let mut notes: Vec<String> = Vec::new();

    if let Some(tfoot) = find_descendant(el, "tfoot") {
        for tr in tfoot
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|node| node.value().name() == "tr")
        {
            let line = normalize_text_single_line(&element_text_space(tr));
            if line.is_empty() {
                continue;
            }
            if !notes.contains(&line) {
                notes.push(line);
            }
            if notes.len() >= MAX_TABLE_NOTES {
                return notes;
            }
        }
    }

    if let Some(figure) = parent_or_self_figure(el) {
        for selector in NOTE_SELECTORS.iter() {
            for node in figure.select(selector) {
                let line = normalize_text_single_line(&element_text_space(node));
                if line.is_empty() {
                    continue;
                }
                if !notes.contains(&line) {
                    notes.push(line);
                }
                if notes.len() >= MAX_TABLE_NOTES {
                    return notes;
                }
            }
        }
    }

    notes
}

fn build_table_block(
    mut header_rows: Vec<Vec<TableCell>>,
    mut body_rows: Vec<Vec<TableCell>>,
    caption: String,
    notes: Vec<String>,
    block_index: usize,
) -> Option<Block> {
    if header_rows.is_empty() && body_rows.is_empty() {
        return None;
    }

    if header_rows.is_empty() {
        let promote = body_rows
            .first()
            .map(|row| row.iter().any(|cell| cell.is_header))
            .unwrap_or(false);
        if promote {
            header_rows.push(body_rows.remove(0));
        }
    }

    let mut legacy_columns = header_rows
        .last()
        .map(|row| legacy_row_text(row))
        .unwrap_or_default();
    let mut legacy_rows: Vec<Vec<String>> = body_rows
        .iter()
        .map(|row| legacy_row_text(row))
        .filter(|row| !row.is_empty())
        .collect();
    if legacy_columns.is_empty() && !legacy_rows.is_empty() {
        legacy_columns = legacy_rows.remove(0);
    }

    Some(Block::Table {
        id: format!("arxiv-{block_index}"),
        columns: legacy_columns,
        rows: legacy_rows,
        header_rows,
        body_rows,
        caption: (!caption.is_empty()).then_some(caption),
        notes: (!notes.is_empty()).then_some(notes),
    })
}

fn split_header_and_body(all_rows: Vec<Vec<TableCell>>) -> (Vec<Vec<TableCell>>, Vec<Vec<TableCell>>) {
    let mut header_rows: Vec<Vec<TableCell>> = Vec::new();
    let mut body_rows: Vec<Vec<TableCell>> = Vec::new();
    for row in all_rows {
        let has_header_cell = row.iter().any(|cell| cell.is_header);
        if has_header_cell && body_rows.is_empty() && header_rows.len() < MAX_HEADER_ROWS {
            header_rows.push(row);
        } else {
            body_rows.push(row);
        }
        if body_rows.len() >= MAX_TABLE_ROWS {
            break;
        }
    }
    (header_rows, body_rows)
}

/// A `<table>` block with explicit or inferred header rows.
pub(crate) fn table_block(el: ElementRef, block_index: usize) -> Option<Block> {
    let thead = find_descendant(el, "thead");
    let tbody = find_descendant(el, "tbody");
    let mut header_rows = collect_table_rows(thead, MAX_HEADER_ROWS);
    let mut body_rows = collect_table_rows(tbody, MAX_TABLE_ROWS);

    if header_rows.is_empty() && body_rows.is_empty() {
        let all_rows = collect_table_rows(Some(el), MAX_TABLE_ROWS + MAX_HEADER_ROWS);
        let split = split_header_and_body(all_rows);
        header_rows = split.0;
        body_rows = split.1;
    }

    build_table_block(
        header_rows,
        body_rows,
        table_caption(el),
        table_notes(el),
        block_index,
    )
}

/// A span-based `figure.ltx_table` wrapping an `.ltx_tabular` grid.
pub(crate) fn span_table_figure_block(el: ElementRef, block_index: usize) -> Option<Block> {
    let tabular = el.select(&TABULAR_SELECTOR).next()?;

    let mut header_rows = collect_span_section_rows(tabular, "ltx_thead", MAX_HEADER_ROWS);
    let mut body_rows = collect_span_section_rows(tabular, "ltx_tbody", MAX_TABLE_ROWS);

    if header_rows.is_empty() && body_rows.is_empty() {
        let all_rows = collect_span_rows(Some(tabular), MAX_TABLE_ROWS + MAX_HEADER_ROWS);
        let split = split_header_and_body(all_rows);
        header_rows = split.0;
        body_rows = split.1;
    }

    build_table_block(
        header_rows,
        body_rows,
        table_caption(el),
        table_notes(el),
        block_index,
    )
}
