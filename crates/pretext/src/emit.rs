//! PreTeXt emission.
//!
//! Walks a finished [`Document`] and writes the chapter element. Emission is
//! a pure function of the tree and the configuration, so converting the same
//! input twice yields byte-identical output.

use qmdptx_core::{
    Block, Classification, CodeArtifact, ConvertConfig, Document, FigureSpec, InlineSpan, List,
    ListMarker, Section, SectionLevel, SpecialBlock, SpecialKind, TableSpec,
};
use serde::Serialize;

use crate::writer::XmlWriter;

const XINCLUDE_NS: &str = "http://www.w3.org/2001/XInclude";

/// External content the output refers to but does not contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AssetRequest {
    /// Image file to be rendered from the figure's chunk.
    Image {
        /// Chunk label.
        label: String,
        /// Path used in the `source` attribute.
        path: String,
    },
    /// Table body to be generated from the table's chunk.
    TableBody {
        /// Chunk label.
        label: String,
        /// Path used in the `xi:include`.
        path: String,
    },
}

/// Output of [`emit_document`].
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    /// The PreTeXt document.
    pub xml: String,
    /// Assets referenced by the document, in output order.
    pub assets: Vec<AssetRequest>,
}

/// Writes `document` as a PreTeXt chapter.
pub fn emit_document(document: &Document, config: &ConvertConfig) -> Emission {
    let mut emitter = Emitter {
        config,
        writer: XmlWriter::new(),
        assets: Vec::new(),
    };
    emitter.document(document);
    Emission {
        xml: emitter.writer.finish(),
        assets: emitter.assets,
    }
}

struct Emitter<'a> {
    config: &'a ConvertConfig,
    writer: XmlWriter,
    assets: Vec<AssetRequest>,
}

impl Emitter<'_> {
    fn document(&mut self, document: &Document) {
        self.writer.declaration();
        self.writer.open(
            "chapter",
            &[("xml:id", document.id.as_str()), ("xmlns:xi", XINCLUDE_NS)],
        );
        self.title(&document.title);
        if let Some(introduction) = &document.introduction {
            self.special(introduction);
        }
        for section in &document.sections {
            self.section(section);
        }
        self.writer.close();
    }

    fn section(&mut self, section: &Section) {
        let name = match (section.level, section.exercises) {
            (SectionLevel::Section, true) => "exercises",
            (SectionLevel::Section, false) => "section",
            (SectionLevel::Subsection, _) => "subsection",
        };
        self.writer.open(name, &[("xml:id", section.id.as_str())]);
        self.title(&section.title);
        if section.exercises {
            self.exercises_children(&section.children);
        } else {
            self.blocks(&section.children);
        }
        self.writer.close();
    }

    /// Prose before the first exercise becomes the division's introduction,
    /// prose after the last one its conclusion.
    fn exercises_children(&mut self, children: &[Block]) {
        let Some(first) = children.iter().position(is_exercise_child) else {
            self.container("introduction", children);
            return;
        };
        let last = children.iter().rposition(is_exercise_child).unwrap_or(first);
        self.container("introduction", &children[..first]);
        self.blocks(&children[first..=last]);
        self.container("conclusion", &children[last + 1..]);
    }

    fn container(&mut self, name: &'static str, blocks: &[Block]) {
        if blocks.is_empty() {
            return;
        }
        self.writer.open(name, &[]);
        self.blocks(blocks);
        self.writer.close();
    }

    fn title(&mut self, title: &[InlineSpan]) {
        self.writer.line_start("title", &[]);
        self.inlines(title);
        self.writer.line_end("title");
    }

    fn blocks(&mut self, blocks: &[Block]) {
        for block in blocks {
            self.block(block);
        }
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Paragraph(spans) => self.paragraph(spans),
            Block::List(list) => {
                self.writer.open("p", &[]);
                self.list(list);
                self.writer.close();
            }
            Block::Code(code) => self.code(code),
            Block::Special(special) => self.special(special),
            Block::Section(section) => self.section(section),
        }
    }

    fn paragraph(&mut self, spans: &[InlineSpan]) {
        self.writer.line_start("p", &[]);
        self.inlines(spans);
        self.writer.line_end("p");
    }

    fn list(&mut self, list: &List) {
        match list.marker {
            ListMarker::Bullet => self.writer.open("ul", &[]),
            ListMarker::Decimal => self.writer.open("ol", &[]),
            ListMarker::LowerAlpha => self.writer.open("ol", &[("marker", "a.")]),
        }
        for item in &list.items {
            self.writer.open("li", &[]);
            if !item.content.is_empty() {
                self.paragraph(&item.content);
            }
            for sublist in &item.sublists {
                self.writer.open("p", &[]);
                self.list(sublist);
                self.writer.close();
            }
            self.writer.close();
        }
        self.writer.close();
    }

    fn special(&mut self, block: &SpecialBlock) {
        let name = match block.kind {
            SpecialKind::Introduction => "introduction",
            SpecialKind::Exercise => "exercise",
            SpecialKind::WorkedExample => "example",
            SpecialKind::DataNote => "note",
            SpecialKind::EmphasisBox => "assemblage",
        };
        match block.id.as_deref() {
            Some(id) => self.writer.open(name, &[("xml:id", id)]),
            None => self.writer.open(name, &[]),
        }
        if let Some(title) = &block.title {
            self.title(title);
        }

        if block.kind.has_solution() {
            self.writer.open("statement", &[]);
            self.blocks(&block.statement);
            self.writer.close();
            if let Some(solution) = &block.solution {
                self.writer.open("solution", &[]);
                self.blocks(solution);
                self.writer.close();
            }
        } else {
            self.blocks(&block.statement);
        }
        self.writer.close();
    }

    fn code(&mut self, code: &CodeArtifact) {
        match &code.classification {
            Classification::Listing { id } => {
                if !code.descriptor.echo {
                    log::debug!("hiding code of chunk at {} (echo: false)", code.location);
                    return;
                }
                match id {
                    Some(id) => {
                        self.writer.open("listing", &[("xml:id", id.as_str())]);
                        self.program(code);
                        self.writer.close();
                    }
                    None => self.program(code),
                }
            }
            Classification::Figure(figure) => {
                self.generating_code(code, &figure.id);
                self.figure(figure);
            }
            Classification::Table(table) => {
                self.generating_code(code, &table.id);
                self.table(table);
            }
        }
    }

    /// Listing of the code behind a figure or table.
    fn generating_code(&mut self, code: &CodeArtifact, target: &str) {
        if !self.config.include_figure_code || !code.descriptor.echo || code.source_lines.is_empty() {
            return;
        }
        let id = format!("listing-{target}");
        self.writer.open("listing", &[("xml:id", id.as_str())]);
        self.writer.line_start("caption", &[]);
        self.writer.push_text("Code to generate ");
        self.writer.inline_empty("xref", &[("ref", target)]);
        self.writer.line_end("caption");
        self.program(code);
        self.writer.close();
    }

    fn program(&mut self, code: &CodeArtifact) {
        match code.language.as_deref() {
            Some(language) => self.writer.open("program", &[("language", language)]),
            None => self.writer.open("program", &[]),
        }
        self.writer.open("input", &[]);
        for line in &code.source_lines {
            self.writer.verbatim_line(line);
        }
        self.writer.close();
        self.writer.close();
    }

    fn figure(&mut self, figure: &FigureSpec) {
        self.writer.open("figure", &[("xml:id", figure.id.as_str())]);
        self.caption(&figure.caption);

        if figure.panels.len() == 1 {
            let width = self.config.figure_width.clone();
            self.image(&figure.label, &figure.panels[0].image, &width, figure.alt.as_deref());
        } else {
            let columns = figure.columns.max(1);
            let width = format!("{}%", 90 / columns);
            for (row_index, row) in figure.panels.chunks(columns).enumerate() {
                let widths = vec![width.as_str(); row.len()].join(" ");
                self.writer.open("sidebyside", &[("widths", widths.as_str())]);
                for (offset, panel) in row.iter().enumerate() {
                    let n = row_index * columns + offset + 1;
                    let id = format!("{}-{}", figure.id, n);
                    self.writer.open("figure", &[("xml:id", id.as_str())]);
                    self.caption(&panel.caption);
                    self.image(&figure.label, &panel.image, "90%", figure.alt.as_deref());
                    self.writer.close();
                }
                self.writer.close();
            }
        }
        self.writer.close();
    }

    fn caption(&mut self, caption: &[InlineSpan]) {
        self.writer.line_start("caption", &[]);
        self.inlines(caption);
        self.writer.line_end("caption");
    }

    fn image(&mut self, label: &str, file: &str, width: &str, alt: Option<&str>) {
        let path = format!("{}/{}", self.config.image_dir, file);
        let attrs = [("source", path.as_str()), ("width", width)];
        match alt {
            Some(alt) => {
                self.writer.open("image", &attrs);
                self.writer.line_start("shortdescription", &[]);
                self.writer.push_text(alt);
                self.writer.line_end("shortdescription");
                self.writer.close();
            }
            None => self.writer.empty("image", &attrs),
        }
        self.assets.push(AssetRequest::Image {
            label: label.to_string(),
            path,
        });
    }

    fn table(&mut self, table: &TableSpec) {
        let path = format!("{}/{}.ptx", self.config.table_dir, table.label);
        self.writer.open("table", &[("xml:id", table.id.as_str())]);
        self.title(&table.caption);
        self.writer.empty("xi:include", &[("href", path.as_str())]);
        self.writer.close();
        self.assets.push(AssetRequest::TableBody {
            label: table.label.clone(),
            path,
        });
    }

    fn inlines(&mut self, spans: &[InlineSpan]) {
        for span in spans {
            self.inline(span);
        }
    }

    fn inline(&mut self, span: &InlineSpan) {
        match span {
            InlineSpan::Text(text) | InlineSpan::Escaped(text) => self.writer.push_text(text),
            InlineSpan::Emphasis(children) => self.wrapped("em", children),
            InlineSpan::Strong(children) => self.wrapped("alert", children),
            InlineSpan::Footnote(children) => self.wrapped("fn", children),
            InlineSpan::Code(code) => self.verbatim("c", code),
            InlineSpan::MathInline(math) => self.verbatim("m", math),
            InlineSpan::MathDisplay(math) => self.verbatim("me", math),
            InlineSpan::Index(term) => self.verbatim("idx", term),
            InlineSpan::CrossReference(target) => {
                self.writer.inline_empty("xref", &[("ref", target.as_str())]);
            }
            InlineSpan::Citation(key) => {
                let target = citation_ref(&self.config.citation_prefix, key);
                self.writer.inline_empty("xref", &[("ref", target.as_str())]);
            }
            InlineSpan::Link { href, label } => {
                let is_bare = matches!(label.as_slice(), [InlineSpan::Text(t)] if t == href);
                if is_bare || label.is_empty() {
                    self.writer.inline_empty("url", &[("href", href.as_str())]);
                } else {
                    self.writer.inline_start("url", &[("href", href.as_str())]);
                    self.inlines(label);
                    self.writer.inline_end("url");
                }
            }
        }
    }

    fn wrapped(&mut self, name: &str, children: &[InlineSpan]) {
        self.writer.inline_start(name, &[]);
        self.inlines(children);
        self.writer.inline_end(name);
    }

    fn verbatim(&mut self, name: &str, content: &str) {
        self.writer.inline_start(name, &[]);
        self.writer.push_text(content);
        self.writer.inline_end(name);
    }
}

fn is_exercise_child(block: &Block) -> bool {
    match block {
        Block::Special(special) => special.kind == SpecialKind::Exercise,
        Block::Section(_) => true,
        _ => false,
    }
}

/// Bibliography keys may hold characters that are not legal in `xml:id`.
fn citation_ref(prefix: &str, key: &str) -> String {
    let normalized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{prefix}{normalized}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use qmdptx_core::parse_document;

    fn emit(input: &str, config: &ConvertConfig) -> Emission {
        let parsed = parse_document(input, config).expect("input should parse");
        emit_document(&parsed.document, config)
    }

    #[test]
    fn citation_keys_are_normalized() {
        assert_eq!(citation_ref("biblio-", "Hesterberg:2015"), "biblio-Hesterberg-2015");
        assert_eq!(citation_ref("", "efron1993"), "efron1993");
    }

    #[test]
    fn hidden_listing_is_not_emitted() {
        let emission = emit("```{r}\n#| echo: false\nx <- 1\n```\n", &ConvertConfig::default());
        assert!(!emission.xml.contains("<program"));
    }

    #[test]
    fn figure_code_listing_is_opt_in() {
        let input = "```{r}\n#| label: fig-x\n#| fig-cap: X\nplot(x)\n```\n";
        let plain = emit(input, &ConvertConfig::default());
        assert!(!plain.xml.contains("<listing"));

        let config = ConvertConfig {
            include_figure_code: true,
            ..ConvertConfig::default()
        };
        let with_code = emit(input, &config);
        let listing = with_code.xml.find("<listing xml:id=\"listing-fig-x\">").unwrap();
        let figure = with_code.xml.find("<figure xml:id=\"fig-x\">").unwrap();
        assert!(listing < figure);
    }

    #[test]
    fn table_requests_its_body() {
        let emission = emit(
            "```{r}\n#| label: tbl-loans\n#| tbl-cap: Loans\nkable(x)\n```\n",
            &ConvertConfig::default(),
        );
        assert!(emission.xml.contains("<xi:include href=\"tables/tbl-loans.ptx\"/>"));
        assert_eq!(
            emission.assets,
            vec![AssetRequest::TableBody {
                label: "tbl-loans".into(),
                path: "tables/tbl-loans.ptx".into(),
            }]
        );
    }

    #[test]
    fn panels_wrap_into_rows() {
        let input = "\
```{r}
#| label: fig-grid
#| fig-cap: Grid
#| fig-subcap: [A, B, C]
#| layout-ncol: 2
plot(x)
```
";
        let emission = emit(input, &ConvertConfig::default());
        assert_eq!(emission.xml.matches("<sidebyside widths=\"45% 45%\">").count(), 1);
        assert_eq!(emission.xml.matches("<sidebyside widths=\"45%\">").count(), 1);
        assert!(emission.xml.contains("<figure xml:id=\"fig-grid-3\">"));
        assert_eq!(emission.assets.len(), 3);
    }

    #[test]
    fn exercises_prose_is_wrapped() {
        let input = "\
## Exercises {#sec-exercises}

Answer every question.

::: {.guidedpractice}
Why?
:::

Solutions are online.
";
        let xml = emit(input, &ConvertConfig::default()).xml;
        let intro = xml.find("<introduction>\n      <p>Answer every question.</p>").unwrap();
        let exercise = xml.find("<exercise xml:id=\"exercise-1\">").unwrap();
        let conclusion = xml.find("<conclusion>\n      <p>Solutions are online.</p>").unwrap();
        assert!(intro < exercise && exercise < conclusion, "{xml}");
        assert!(!xml.contains("<section"));
    }

    #[test]
    fn escaped_punctuation_is_plain_text() {
        let xml = emit("Costs \\$5 and \\<b\\>.\n", &ConvertConfig::default()).xml;
        assert!(xml.contains("<p>Costs $5 and &lt;b&gt;.</p>"), "{xml}");
    }

    #[test]
    fn asset_requests_serialize_tagged() {
        let asset = AssetRequest::Image {
            label: "fig-x".into(),
            path: "images/fig-x-1.png".into(),
        };
        let json = serde_json::to_string(&asset).unwrap();
        assert_eq!(
            json,
            r#"{"type":"image","label":"fig-x","path":"images/fig-x-1.png"}"#
        );
    }
}
