//! Structural validation and repair of a document before transmission.
//!
//! [`validate`] never changes anything; it reports errors (generation must
//! not start) and warnings (worth logging). [`sanitize`] applies only
//! repairs that keep the document's meaning: trimming, naming unnamed
//! tables, padding ragged rows, filling and de-duplicating ids.
//!
//! `sanitize` is idempotent and a document that validates before it still
//! validates after it. What it cannot repair (a table with no data, a
//! subsection pointing at a parent that does not exist) stays an error.

use crate::document::outline::Outline;
use crate::document::{BlockData, BlockKind, ContentBlock, Document, Section};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Result of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn finish(mut self) -> Self {
        self.is_valid = self.errors.is_empty();
        self
    }
}

/// Check every structural invariant the backend relies on.
pub fn validate(doc: &Document) -> ValidationReport {
    let mut report = ValidationReport::default();

    if doc.title.trim().is_empty() {
        report.errors.push("Document title is required".to_string());
    }
    if !doc.authors.iter().any(|a| !a.name.trim().is_empty()) {
        report
            .errors
            .push("At least one author with a name is required".to_string());
    }
    if doc.sections.is_empty() {
        report.warnings.push("Document has no sections".to_string());
    }

    for (si, section) in doc.sections.iter().enumerate() {
        if let Err(e) = Outline::build(section) {
            report
                .errors
                .push(format!("{}: {}", section_label(si, section), e));
        }
        for (bi, block) in section.content_blocks.iter().enumerate() {
            let label = block_label(si, section, bi);
            check_block(&label, block, &mut report);
        }
    }

    for (ti, table) in doc.tables.iter().enumerate() {
        let label = format!("Table {} ('{}')", ti + 1, table.id);
        if table.id.trim().is_empty() {
            report.errors.push(format!("{label}: table has no id"));
        }
        let name = table.table_name.as_deref().map(str::trim).unwrap_or("");
        if name.is_empty() {
            report.errors.push(format!("{label}: table has no name"));
        }
        let has_image = table.data.as_deref().is_some_and(|d| !d.trim().is_empty());
        if table.rows.is_empty() && !has_image {
            report
                .errors
                .push(format!("{label}: table has neither rows nor image data"));
        } else if !table.rows.is_empty() {
            if let Some(problem) = rectangular_problem(&table.headers, &table.rows) {
                report.errors.push(format!("{label}: {problem}"));
            }
        }
    }

    let mut first_use: HashMap<&str, String> = HashMap::new();
    for (id, label) in id_references(doc) {
        match first_use.get(id) {
            Some(first) => report
                .errors
                .push(format!("Duplicate id '{id}' used by {first} and {label}")),
            None => {
                first_use.insert(id, label);
            }
        }
    }

    report.finish()
}

fn check_block(label: &str, block: &ContentBlock, report: &mut ValidationReport) {
    let missing_image_id = block.image_id.as_deref().map_or(true, |id| id.trim().is_empty());
    match block.kind {
        BlockKind::Text => {
            if block.content.as_deref().map_or(true, |c| c.trim().is_empty()) {
                report.warnings.push(format!("{label}: empty text block"));
            }
        }
        BlockKind::Table => {
            let name = block.table_name.as_deref().map(str::trim).unwrap_or("");
            if name.is_empty() && !block.has_data() {
                report
                    .errors
                    .push(format!("{label}: table block has neither a name nor data"));
                return;
            }
            if name.is_empty() {
                report.errors.push(format!("{label}: table block has no name"));
            }
            if !block.has_data() {
                report
                    .errors
                    .push(format!("{label}: table '{name}' has no data"));
                return;
            }
            if let Some(BlockData::Rows(rows)) = &block.data {
                if let Some(problem) = rectangular_problem(&[], rows) {
                    report.errors.push(format!("{label}: {problem}"));
                }
            }
            if missing_image_id {
                report
                    .errors
                    .push(format!("{label}: table block has data but no imageId"));
            }
        }
        BlockKind::Image | BlockKind::Equation => {
            let kind = block.kind.as_str();
            if !block.has_data() {
                report
                    .warnings
                    .push(format!("{label}: {kind} block has no data and will be skipped"));
            } else if missing_image_id {
                report
                    .errors
                    .push(format!("{label}: {kind} block has data but no imageId"));
            }
        }
    }
}

/// `None` when every row (and the header row, if any) has the same width.
fn rectangular_problem(headers: &[String], rows: &[Vec<String>]) -> Option<String> {
    let width = if headers.is_empty() {
        rows.first().map_or(0, Vec::len)
    } else {
        headers.len()
    };
    if width == 0 {
        return Some("table rows have no columns".to_string());
    }
    rows.iter().enumerate().find_map(|(i, row)| {
        (row.len() != width).then(|| {
            format!(
                "table is not rectangular: expected {width} columns, row {} has {}",
                i + 1,
                row.len()
            )
        })
    })
}

/// Every non-blank image/table/figure id, in document order.
fn id_references(doc: &Document) -> Vec<(&str, String)> {
    let mut refs = Vec::new();
    for (si, section) in doc.sections.iter().enumerate() {
        for (bi, block) in section.content_blocks.iter().enumerate() {
            if let Some(id) = block.image_id.as_deref().filter(|id| !id.trim().is_empty()) {
                refs.push((id, block_label(si, section, bi)));
            }
        }
    }
    for (ti, table) in doc.tables.iter().enumerate() {
        if !table.id.trim().is_empty() {
            refs.push((table.id.as_str(), format!("Table {}", ti + 1)));
        }
    }
    for (fi, figure) in doc.figures.iter().enumerate() {
        if !figure.id.trim().is_empty() {
            refs.push((figure.id.as_str(), format!("Figure {}", fi + 1)));
        }
    }
    refs
}

fn section_label(si: usize, section: &Section) -> String {
    if section.title.trim().is_empty() {
        format!("Section {}", si + 1)
    } else {
        format!("Section {} ('{}')", si + 1, section.title.trim())
    }
}

fn block_label(si: usize, section: &Section, bi: usize) -> String {
    format!("{}, block {}", section_label(si, section), bi + 1)
}

// ── Repair ───────────────────────────────────────────────────────────────

/// Return a repaired copy of `doc`.
pub fn sanitize(doc: &Document) -> Document {
    let mut doc = doc.clone();

    doc.title = doc.title.trim().to_string();
    for author in &mut doc.authors {
        author.name = author.name.trim().to_string();
    }

    let mut table_ordinal = 0usize;
    for (si, section) in doc.sections.iter_mut().enumerate() {
        for sub in &mut section.subsections {
            if sub.level == 0 {
                sub.level = 1;
            }
            if sub.level == 1 {
                sub.parent_id = None;
            }
        }

        for (bi, block) in section.content_blocks.iter_mut().enumerate() {
            if block.kind == BlockKind::Table {
                table_ordinal += 1;
                block.table_name = clean_name(block.table_name.take());
                if block.table_name.is_none() && block.has_data() {
                    block.table_name = Some(format!("Table {table_ordinal}"));
                }
                if let Some(BlockData::Rows(rows)) = &mut block.data {
                    pad_rows(None, rows);
                }
            }
            let missing_image_id =
                block.image_id.as_deref().map_or(true, |id| id.trim().is_empty());
            if block.kind != BlockKind::Text && block.has_data() && missing_image_id {
                block.image_id = Some(format!("{}-{}-{}", block.kind.as_str(), si + 1, bi + 1));
            }
        }
    }

    for (ti, table) in doc.tables.iter_mut().enumerate() {
        if table.id.trim().is_empty() {
            table.id = format!("table-{}", ti + 1);
        }
        table.table_name = clean_name(table.table_name.take());
        let has_image = table.data.as_deref().is_some_and(|d| !d.trim().is_empty());
        if table.table_name.is_none() && (has_image || !table.rows.is_empty()) {
            table.table_name = Some(format!("Table {}", ti + 1));
        }
        if !table.rows.is_empty() {
            pad_rows(Some(&mut table.headers), &mut table.rows);
        }
    }

    dedupe_ids(&mut doc);
    doc
}

fn clean_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// Pad the header row (if present) and every data row to the widest one.
fn pad_rows(headers: Option<&mut Vec<String>>, rows: &mut [Vec<String>]) {
    let header_width = headers.as_ref().map_or(0, |h| h.len());
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(header_width);
    for row in rows.iter_mut() {
        row.resize(width, String::new());
    }
    if let Some(headers) = headers.filter(|h| !h.is_empty()) {
        headers.resize(width, String::new());
    }
}

/// Rename later duplicates to the smallest free `<id>-<k>`.
fn dedupe_ids(doc: &mut Document) {
    let mut slots: Vec<&mut String> = Vec::new();
    for section in &mut doc.sections {
        for block in &mut section.content_blocks {
            if let Some(id) = block.image_id.as_mut().filter(|id| !id.trim().is_empty()) {
                slots.push(id);
            }
        }
    }
    for table in &mut doc.tables {
        if !table.id.trim().is_empty() {
            slots.push(&mut table.id);
        }
    }
    for figure in &mut doc.figures {
        if !figure.id.trim().is_empty() {
            slots.push(&mut figure.id);
        }
    }

    let original: HashSet<String> = slots.iter().map(|s| s.to_string()).collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(slots.len());
    for slot in slots {
        if seen.insert(slot.clone()) {
            continue;
        }
        let mut k = 2;
        let renamed = loop {
            let candidate = format!("{slot}-{k}");
            if !original.contains(&candidate) && !seen.contains(&candidate) {
                break candidate;
            }
            k += 1;
        };
        seen.insert(renamed.clone());
        *slot = renamed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Author, Figure, Subsection, Table};

    fn valid_doc() -> Document {
        Document::from_json(
            r#"{
                "id": "d1",
                "title": "On Retries",
                "authors": [{"name": "Ada Lovelace"}],
                "sections": [{
                    "id": "s1", "title": "Intro",
                    "contentBlocks": [
                        {"type": "text", "content": "Hello"},
                        {"type": "table", "tableName": "Results", "imageId": "t1",
                         "data": [["a", "b"], ["1", "2"]]},
                        {"type": "image", "imageId": "img1", "data": "aGVsbG8="}
                    ],
                    "subsections": [
                        {"id": "A", "level": 1},
                        {"id": "B", "level": 2, "parentId": "A"}
                    ]
                }],
                "tables": [{"id": "tab-1", "tableName": "Costs",
                            "headers": ["x", "y"], "rows": [["1", "2"]]}]
            }"#,
        )
        .unwrap()
    }

    fn messy_doc() -> Document {
        let mut doc = valid_doc();
        doc.title = "  On Retries  ".into();
        let blocks = &mut doc.sections[0].content_blocks;
        blocks[1].table_name = Some("   ".into());
        blocks[1].image_id = None;
        blocks[1].data = Some(BlockData::Rows(vec![
            vec!["a".into(), "b".into(), "c".into()],
            vec!["1".into()],
        ]));
        blocks[2].image_id = Some("tab-1".into());
        doc.sections[0].subsections.push(Subsection {
            id: "C".into(),
            level: 1,
            parent_id: Some("A".into()),
            ..Default::default()
        });
        doc.tables.push(Table {
            rows: vec![vec!["1".into(), "2".into()], vec![]],
            ..Default::default()
        });
        doc.figures.push(Figure {
            id: "img1".into(),
            ..Default::default()
        });
        doc
    }

    #[test]
    fn valid_document_passes() {
        let report = validate(&valid_doc());
        assert!(report.is_valid, "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
    }

    #[test]
    fn empty_document_cites_title_and_author() {
        let doc = Document::from_json(r#"{"title":"","sections":[],"authors":[]}"#).unwrap();
        let report = validate(&doc);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("title")));
        assert!(report.errors.iter().any(|e| e.contains("author")));
        assert!(report.warnings.iter().any(|w| w.contains("no sections")));
        // Sanitize cannot invent a title or an author.
        assert!(!validate(&sanitize(&doc)).is_valid);
    }

    #[test]
    fn messy_document_is_invalid_then_repaired() {
        let doc = messy_doc();
        let before = validate(&doc);
        assert!(!before.is_valid);
        assert!(before.errors.iter().any(|e| e.contains("not rectangular")));
        assert!(before.errors.iter().any(|e| e.contains("Duplicate id 'tab-1'")));
        assert!(before.errors.iter().any(|e| e.contains("must not have a parent")));

        let fixed = sanitize(&doc);
        let after = validate(&fixed);
        assert!(after.is_valid, "errors: {:?}", after.errors);

        let block = &fixed.sections[0].content_blocks[1];
        assert_eq!(block.table_name.as_deref(), Some("Table 1"));
        assert_eq!(block.image_id.as_deref(), Some("table-1-2"));
        assert!(
            matches!(&block.data, Some(BlockData::Rows(r)) if r.iter().all(|row| row.len() == 3))
        );
        assert_eq!(fixed.title, "On Retries");
        assert_eq!(fixed.tables[1].id, "table-2");
        assert_eq!(fixed.tables[1].table_name.as_deref(), Some("Table 2"));
        assert_eq!(fixed.tables[0].id, "tab-1-2");
        assert_eq!(fixed.sections[0].content_blocks[2].image_id.as_deref(), Some("tab-1"));
        assert_eq!(fixed.figures[0].id, "img1");
    }

    #[test]
    fn duplicate_ids_get_the_smallest_free_suffix() {
        let mut doc = valid_doc();
        doc.figures = vec![
            Figure { id: "f".into(), ..Default::default() },
            Figure { id: "f".into(), ..Default::default() },
            Figure { id: "f-2".into(), ..Default::default() },
        ];
        let fixed = sanitize(&doc);
        let ids: Vec<&str> = fixed.figures.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["f", "f-3", "f-2"]);
        assert!(validate(&fixed).is_valid);
    }

    #[test]
    fn sanitize_is_idempotent() {
        for doc in [valid_doc(), messy_doc(), Document::default()] {
            let once = sanitize(&doc);
            let twice = sanitize(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn sanitize_keeps_valid_documents_valid_and_unchanged() {
        let doc = valid_doc();
        let fixed = sanitize(&doc);
        assert!(validate(&fixed).is_valid);
        assert_eq!(fixed, doc);
    }

    #[test]
    fn table_block_without_name_or_data_stays_invalid() {
        let mut doc = valid_doc();
        doc.sections[0].content_blocks.push(ContentBlock {
            kind: BlockKind::Table,
            ..Default::default()
        });
        let fixed = sanitize(&doc);
        let report = validate(&fixed);
        assert!(!report.is_valid);
        assert!(report.errors[0].contains("neither a name nor data"), "{:?}", report.errors);
    }

    #[test]
    fn unknown_subsection_parent_is_not_repairable() {
        let mut doc = valid_doc();
        doc.sections[0].subsections.push(Subsection {
            id: "Z".into(),
            level: 2,
            parent_id: Some("nope".into()),
            ..Default::default()
        });
        assert!(!validate(&sanitize(&doc)).is_valid);
    }

    #[test]
    fn image_without_data_is_only_a_warning() {
        let mut doc = valid_doc();
        doc.sections[0].content_blocks.push(ContentBlock {
            kind: BlockKind::Equation,
            ..Default::default()
        });
        let report = validate(&doc);
        assert!(report.is_valid);
        assert!(report.warnings[0].contains("equation block has no data"));
    }

    #[test]
    fn blank_author_names_do_not_count() {
        let mut doc = valid_doc();
        doc.authors = vec![Author { name: "   ".into(), ..Default::default() }];
        let report = validate(&doc);
        assert!(report.errors.iter().any(|e| e.contains("author")));
    }
}
