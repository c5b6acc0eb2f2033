use super::*;
use longform_types::{Block, InlineRun};

const BASE_URL: &str = "https://arxiv.org/html/2401.01234v1";

fn parse(html: &str) -> ArxivStructuredContent {
    extract_arxiv_structured_content(html, BASE_URL, 120_000)
}

fn blocks_of<'a>(content: &'a ArxivStructuredContent, kind: &str) -> Vec<&'a Block> {
    content
        .blocks
        .iter()
        .filter(|block| block.kind_name() == kind)
        .collect()
}

fn paragraph_rich(block: &Block) -> &longform_types::RichText {
    match block {
        Block::Paragraph(rich) => rich,
        other => panic!("expected paragraph, got {}", other.kind_name()),
    }
}

const FULL_DOCUMENT: &str = r#"
<html><body>
<article class="ltx_document">
  <h1 class="ltx_title">Benchmarking Neural Extraction Systems</h1>
  <div class="ltx_para">
    <p class="ltx_p">This paper studies robust content extraction across heterogeneous web sources and reports results.</p>
  </div>
  <table class="ltx_equation">
    <tr>
      <td class="ltx_eqn_cell">
        <math display="block" alttext="x = y + z">
          <semantics>
            <mrow><mi>x</mi><mo>=</mo><mi>y</mi><mo>+</mo><mi>z</mi></mrow>
            <annotation encoding="application/x-tex">x = y + z</annotation>
          </semantics>
        </math>
      </td>
      <td class="ltx_eqn_cell"><span class="ltx_tag ltx_tag_equation">(2)</span></td>
    </tr>
  </table>
  <ul class="ltx_itemize">
    <li class="ltx_item">First takeaway about scoring</li>
    <li class="ltx_item">Second takeaway about fallbacks</li>
  </ul>
  <table>
    <caption>Main benchmark table</caption>
    <thead>
      <tr><th rowspan="2">Task Group</th><th colspan="2">Language Pair</th></tr>
      <tr><th>Source</th><th>Target</th></tr>
    </thead>
    <tbody>
      <tr><td>MT</td><td>en</td><td>de</td></tr>
      <tr><td>Summarization</td><td>en</td><td>en</td></tr>
    </tbody>
    <tfoot><tr><td colspan="3">Scores averaged over three seeds.</td></tr></tfoot>
  </table>
  <figure class="ltx_figure">
    <img src="x1.png"/>
    <figcaption>Figure 1: System overview.</figcaption>
  </figure>
</article>
</body></html>
"#;

#[test]
fn extracts_structured_blocks_and_raw_content() {
    let result = parse(FULL_DOCUMENT);
    let kinds: Vec<&str> = result.blocks.iter().map(Block::kind_name).collect();

    assert!(kinds.contains(&"h1"));
    assert!(kinds.contains(&"paragraph"));
    assert!(kinds.contains(&"equation"));
    assert!(kinds.contains(&"list"));
    assert!(kinds.contains(&"table"));
    assert!(kinds.contains(&"image"));

    assert!(result.raw_content.contains("x = y + z"));
    assert!(result.raw_content.contains("Task Group | Language Pair"));
    assert!(*result.block_counts.get("equation").unwrap_or(&0) >= 1);
    assert!(*result.block_counts.get("table").unwrap_or(&0) >= 1);

    let table = blocks_of(&result, "table")[0];
    let Block::Table {
        caption,
        notes,
        header_rows,
        body_rows,
        ..
    } = table
    else {
        panic!("expected table");
    };
    assert_eq!(caption.as_deref(), Some("Main benchmark table"));
    assert_eq!(
        notes.as_deref(),
        Some(&["Scores averaged over three seeds.".to_string()][..])
    );
    assert_eq!(header_rows.len(), 2);
    assert_eq!(body_rows.len(), 2);
    assert_eq!(header_rows[0][0].rowspan, Some(2));
    assert_eq!(header_rows[0][1].colspan, Some(2));
}

#[test]
fn block_ids_are_stable_across_reparses() {
    let first: Vec<String> = parse(FULL_DOCUMENT)
        .blocks
        .iter()
        .map(|block| block.id().to_string())
        .collect();
    let second: Vec<String> = parse(FULL_DOCUMENT)
        .blocks
        .iter()
        .map(|block| block.id().to_string())
        .collect();
    assert_eq!(first, second);
    assert_eq!(first[0], "arxiv-1");
    assert_eq!(parse(FULL_DOCUMENT).raw_content, parse(FULL_DOCUMENT).raw_content);
}

#[test]
fn truncates_raw_content_to_max_chars() {
    let mut paragraphs = String::new();
    for index in 0..40 {
        paragraphs.push_str(&format!(
            "<div class=\"ltx_para\">Paragraph number {index} keeps adding content until the cap is exhausted entirely.</div>"
        ));
    }
    let html = format!("<article class=\"ltx_document\">{paragraphs}</article>");
    let result = extract_arxiv_structured_content(&html, BASE_URL, 512);
    assert!(result.raw_content.chars().count() <= 512);
    assert!(!result.raw_content.is_empty());
}

#[test]
fn equation_inside_ltx_para_is_extracted_separately() {
    let html = r#"
    <article class="ltx_document">
      <div class="ltx_para">
        The total loss combines reconstruction and regularization terms during training.
        <table class="ltx_equation">
          <tr>
            <td>
              <math display="block" alttext="L = E + R">
                <annotation encoding="application/x-tex">L = E + R</annotation>
              </math>
            </td>
            <td><span class="ltx_tag ltx_tag_equation">(1)</span></td>
          </tr>
        </table>
      </div>
    </article>
    "#;
    let result = parse(html);
    let kinds: Vec<&str> = result.blocks.iter().map(Block::kind_name).collect();
    assert!(kinds.contains(&"paragraph"));
    assert!(kinds.contains(&"equation"));
    assert!(result.raw_content.contains("L = E + R"));

    let equations = blocks_of(&result, "equation");
    assert_eq!(equations.len(), 1);
    let Block::Equation {
        equation_tex,
        equation_number,
        ..
    } = equations[0]
    else {
        panic!("expected equation");
    };
    assert_eq!(equation_tex, "L = E + R");
    assert_eq!(equation_number.as_deref(), Some("(1)"));

    // The paragraph text must not swallow the equation body.
    let paragraph = blocks_of(&result, "paragraph")[0];
    assert!(!paragraph_rich(paragraph).text.contains("L = E + R"));
}

#[test]
fn relative_figure_assets_resolve_with_document_path() {
    let html = r#"
    <article class="ltx_document">
      <figure class="ltx_figure">
        <img src="extracted/6611031/figures/overview.png"/>
        <figcaption>Overview of the system.</figcaption>
      </figure>
    </article>
    "#;
    let result = extract_arxiv_structured_content(html, "https://arxiv.org/html/2507.11966v1", 4096);
    let images = blocks_of(&result, "image");
    assert_eq!(images.len(), 1);
    let Block::Image { image_url, caption, .. } = images[0] else {
        panic!("expected image");
    };
    assert_eq!(
        image_url,
        "https://arxiv.org/html/2507.11966v1/extracted/6611031/figures/overview.png"
    );
    assert_eq!(caption.as_deref(), Some("Overview of the system."));
}

#[test]
fn site_chrome_images_are_rejected() {
    let html = r#"
    <article class="ltx_document">
      <figure><img src="/static/arxiv-logo.png"/></figure>
    </article>
    "#;
    let result = parse(html);
    assert!(blocks_of(&result, "image").is_empty());
}

#[test]
fn extracts_reference_items_with_clickable_arxiv_links() {
    let html = r#"
    <article class="ltx_document">
      <ul class="ltx_biblist">
        <li class="ltx_bibitem" id="bib.bib1">
          Author, A. A useful transformer paper. arXiv:2401.01234, 2024.
        </li>
      </ul>
    </article>
    "#;
    let result = parse(html);
    let references = blocks_of(&result, "reference");
    assert_eq!(references.len(), 1);
    let Block::Reference {
        text,
        anchor_id,
        links,
        ..
    } = references[0]
    else {
        panic!("expected reference");
    };
    assert!(text.contains("A useful transformer paper"));
    assert_eq!(anchor_id.as_deref(), Some("article-ref-bib-bib1"));
    assert!(!links.is_empty());
    assert_eq!(links[0].href, "https://arxiv.org/abs/2401.01234");
    assert_eq!(links[0].label, "arXiv:2401.01234");
    assert_eq!(
        links.iter().filter(|link| link.kind == "arxiv").count(),
        1
    );

    // The bibliography list itself must not double as a list block.
    assert!(blocks_of(&result, "list").is_empty());
}

#[test]
fn reference_items_without_identifiers_get_scholar_fallback() {
    let html = r#"
    <article class="ltx_document">
      <li class="ltx_bibitem" id="bib.bib9">
        Author, B. An offline-only technical report with no identifiers, 2019.
      </li>
    </article>
    "#;
    let result = parse(html);
    let references = blocks_of(&result, "reference");
    let Block::Reference { links, .. } = references[0] else {
        panic!("expected reference");
    };
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].label, "Scholar");
    assert!(links[0]
        .href
        .starts_with("https://scholar.google.com/scholar?q="));
}

#[test]
fn paragraph_preserves_inline_links_and_math() {
    let html = r##"
    <article class="ltx_document">
      <div class="ltx_para" id="S1.p1">
        <p class="ltx_p">Prior work <cite class="ltx_cite"><a href="#bib.bib1">Smith et al. (2024)</a></cite>
        showed robustness up to <math alttext="2^{64}"><semantics><msup><mn>2</mn><mn>64</mn></msup>
        <annotation encoding="application/x-tex">2^{64}</annotation></semantics></math> states;
        see also <a href="#bib.bib2">Appendix B</a>.</p>
      </div>
      <li class="ltx_bibitem" id="bib.bib1">Smith et al. Robustness bounds. arXiv:2312.00001, 2024.</li>
    </article>
    "##;
    let result = parse(html);
    let paragraphs = blocks_of(&result, "paragraph");
    assert_eq!(paragraphs.len(), 1);
    let rich = paragraph_rich(paragraphs[0]);
    let runs = rich.inline_runs.as_deref().expect("structured runs");
    assert!(runs.len() >= 3);

    let link_runs: Vec<&InlineRun> = runs
        .iter()
        .filter(|run| matches!(run, InlineRun::Link { .. }))
        .collect();
    assert_eq!(link_runs.len(), 2);
    let InlineRun::Link { href, .. } = link_runs[0] else {
        unreachable!()
    };
    assert_eq!(href, "#article-ref-bib-bib1");
    let InlineRun::Link { href, .. } = link_runs[1] else {
        unreachable!()
    };
    assert_eq!(href, "#article-ref-bib-bib2");

    let math_run = runs
        .iter()
        .find(|run| matches!(run, InlineRun::Math { .. }))
        .expect("math run");
    let InlineRun::Math { text } = math_run else {
        unreachable!()
    };
    assert_eq!(text, "2^{64}");
    assert!(rich.text.contains("2^{64}"));

    let references = blocks_of(&result, "reference");
    let Block::Reference { anchor_id, .. } = references[0] else {
        panic!("expected reference");
    };
    assert_eq!(anchor_id.as_deref(), Some("article-ref-bib-bib1"));
}

#[test]
fn paragraph_preserves_emphasis_bold_code_sub_and_sup_runs() {
    let html = r#"
    <article class="ltx_document">
      <div class="ltx_para">
        <p class="ltx_p">We propose <em>masked Bit Autoregressive modeling</em> (<b>BAR</b>) over a shared
        <code>codebook</code>, evaluated on H<sub>2</sub>O simulations with x<sup>2</sup> scaling.</p>
      </div>
    </article>
    "#;
    let result = parse(html);
    let rich = paragraph_rich(blocks_of(&result, "paragraph")[0]);
    assert!(rich.text.contains("masked Bit Autoregressive modeling"));
    assert!(rich.text.contains("H2O"));
    assert!(rich.text.contains("x2 scaling"));

    let markdown = rich.inline_markdown.as_deref().expect("markdown");
    assert!(markdown.contains("*masked Bit Autoregressive modeling*"));
    assert!(markdown.contains("**BAR**"));
    assert!(markdown.contains("`codebook`"));

    let runs = rich.inline_runs.as_deref().expect("runs");
    let kinds: Vec<&str> = runs
        .iter()
        .map(|run| match run {
            InlineRun::Em { .. } => "em",
            InlineRun::Strong { .. } => "strong",
            InlineRun::Code { .. } => "code",
            InlineRun::Sub { .. } => "sub",
            InlineRun::Sup { .. } => "sup",
            _ => "other",
        })
        .collect();
    for expected in ["em", "strong", "code", "sub", "sup"] {
        assert!(kinds.contains(&expected), "missing {expected}");
    }
}

#[test]
fn paragraph_preserves_smallcaps_underline_and_strike_runs() {
    let html = r#"
    <article class="ltx_document">
      <div class="ltx_para">
        <p class="ltx_p">The <span class="ltx_font_smallcaps">Longform</span> reader
        <u>always keeps</u> structure and drops <del>legacy decoding</del> entirely.</p>
      </div>
    </article>
    "#;
    let result = parse(html);
    let rich = paragraph_rich(blocks_of(&result, "paragraph")[0]);
    let runs = rich.inline_runs.as_deref().expect("runs");
    assert!(runs.iter().any(|run| matches!(run, InlineRun::Smallcaps { .. })));
    assert!(runs.iter().any(|run| matches!(run, InlineRun::Underline { .. })));
    assert!(runs.iter().any(|run| matches!(run, InlineRun::Strike { .. })));
    assert!(rich
        .inline_markdown
        .as_deref()
        .unwrap()
        .contains("~~legacy decoding~~"));
}

#[test]
fn extracts_span_based_figure_tables() {
    let html = r#"
    <article class="ltx_document">
      <figure class="ltx_table" id="S4.T2">
        <figcaption class="ltx_caption"><span class="ltx_tag ltx_tag_table">Table 2: </span>Ablation results across decoding strategies.</figcaption>
        <span class="ltx_tabular">
          <span class="ltx_thead">
            <span class="ltx_tr">
              <span class="ltx_td ltx_th ltx_th_column ltx_rowspan_2">Method</span>
              <span class="ltx_td ltx_th ltx_th_column">Speed</span>
              <span class="ltx_td ltx_th ltx_th_column ltx_colspan_2">Quality</span>
            </span>
            <span class="ltx_tr">
              <span class="ltx_td ltx_th">gFID</span>
              <span class="ltx_td ltx_th">IS</span>
            </span>
          </span>
          <span class="ltx_tbody">
            <span class="ltx_tr">
              <span class="ltx_td">Baseline</span>
              <span class="ltx_td">1.0x</span>
              <span class="ltx_td">5.2</span>
              <span class="ltx_td">180</span>
            </span>
            <span class="ltx_tr">
              <span class="ltx_td">Ours</span>
              <span class="ltx_td">2.1x</span>
              <span class="ltx_td">4.1</span>
              <span class="ltx_td">204</span>
            </span>
          </span>
        </span>
      </figure>
    </article>
    "#;
    let result = parse(html);
    let tables = blocks_of(&result, "table");
    assert_eq!(tables.len(), 1);
    assert!(blocks_of(&result, "image").is_empty());

    let Block::Table {
        caption,
        header_rows,
        body_rows,
        ..
    } = tables[0]
    else {
        panic!("expected table");
    };
    assert_eq!(
        caption.as_deref(),
        Some("Table 2: Ablation results across decoding strategies.")
    );
    assert_eq!(header_rows.len(), 2);
    assert_eq!(body_rows.len(), 2);
    assert_eq!(header_rows[0][0].rowspan, Some(2));
    assert_eq!(header_rows[0][2].colspan, Some(2));
    assert!(result.raw_content.contains("Baseline | 1.0x | 5.2 | 180"));
}

#[test]
fn table_cells_preserve_inline_math_and_emphasis() {
    let html = r#"
    <article class="ltx_document">
      <table>
        <thead><tr><th><b>Metric</b></th><th>Value</th></tr></thead>
        <tbody><tr><td><em>gFID</em></td><td>4.1</td></tr></tbody>
      </table>
    </article>
    "#;
    let result = parse(html);
    let Block::Table {
        header_rows,
        body_rows,
        ..
    } = blocks_of(&result, "table")[0]
    else {
        panic!("expected table");
    };
    let header_cell = &header_rows[0][0];
    assert_eq!(header_cell.inline_markdown.as_deref(), Some("**Metric**"));
    assert!(matches!(
        header_cell.inline_runs.as_deref().unwrap()[0],
        InlineRun::Strong { .. }
    ));
    let body_cell = &body_rows[0][0];
    assert_eq!(body_cell.inline_markdown.as_deref(), Some("*gFID*"));
    assert!(matches!(
        body_cell.inline_runs.as_deref().unwrap()[0],
        InlineRun::Em { .. }
    ));
}

#[test]
fn table_with_many_rows_truncates_body_and_keeps_header() {
    let mut rows = String::new();
    for index in 0..100 {
        rows.push_str(&format!("<tr><td>row {index}</td><td>{index}</td></tr>"));
    }
    let html = format!(
        "<article class=\"ltx_document\"><table><thead><tr><th>Name</th><th>Value</th></tr></thead><tbody>{rows}</tbody></table></article>"
    );
    let result = parse(&html);
    let Block::Table {
        header_rows,
        body_rows,
        ..
    } = blocks_of(&result, "table")[0]
    else {
        panic!("expected table");
    };
    assert_eq!(header_rows.len(), 1);
    assert_eq!(body_rows.len(), super::table::MAX_TABLE_ROWS);
}

#[test]
fn duplicate_segments_are_skipped_in_projection_but_kept_as_blocks() {
    let repeated = "This exact sentence is repeated verbatim across two separate containers of the paper body.";
    let html = format!(
        "<article class=\"ltx_document\"><div class=\"ltx_para\">{repeated}</div><div class=\"ltx_para\">{repeated}</div></article>"
    );
    let result = parse(&html);
    assert_eq!(blocks_of(&result, "paragraph").len(), 2);
    assert_eq!(result.raw_content.matches("repeated verbatim").count(), 1);
}

#[test]
fn headings_collapse_to_h3_below_level_three() {
    let html = r#"
    <article class="ltx_document">
      <h1>Top level</h1>
      <h2>Second level</h2>
      <h5>Deep level heading</h5>
    </article>
    "#;
    let result = parse(html);
    let kinds: Vec<&str> = result.blocks.iter().map(Block::kind_name).collect();
    assert_eq!(kinds, vec!["h1", "h2", "h3"]);
}
