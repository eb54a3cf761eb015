//! In-memory representation of a research paper.
//!
//! The model mirrors the backend's camelCase JSON. Every collection field is
//! deserialised through [`nullable`], so a missing *or* `null` array arrives
//! as an empty `Vec` and no later stage has to guard against absence.
//!
//! Fields the model does not name (acknowledgments, subsection content
//! blocks, editor state) are kept in each node's `extra` map and written back
//! unchanged, so the backend sees everything the editor produced.
//!
//! Display numbering of subsections is derived on demand by
//! [`outline::Outline`]; it is never stored on the model.

pub mod outline;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Treat `null` like a missing field and fall back to `Default`.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A complete paper, as handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub title: String,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub authors: Vec<Author>,
    #[serde(deserialize_with = "nullable")]
    pub sections: Vec<Section>,
    #[serde(deserialize_with = "nullable")]
    pub references: Vec<Reference>,
    #[serde(deserialize_with = "nullable")]
    pub figures: Vec<Figure>,
    #[serde(deserialize_with = "nullable")]
    pub tables: Vec<Table>,
    #[serde(deserialize_with = "nullable")]
    pub settings: DocumentSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Parse a document from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Key used by the in-flight guard.
    pub fn surface_key(&self) -> &str {
        if self.id.trim().is_empty() {
            "untitled"
        } else {
            &self.id
        }
    }

    /// Iterate every content block with its section index.
    pub fn blocks(&self) -> impl Iterator<Item = (usize, &ContentBlock)> {
        self.sections
            .iter()
            .enumerate()
            .flat_map(|(i, s)| s.content_blocks.iter().map(move |b| (i, b)))
    }

    /// Small summary sent along with download records.
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            authors: self
                .authors
                .iter()
                .map(|a| a.name.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
            section_count: self.sections.len(),
            reference_count: self.references.len(),
            figure_count: self.figures.len()
                + self
                    .blocks()
                    .filter(|(_, b)| b.kind == BlockKind::Image)
                    .count(),
            table_count: self.tables.len()
                + self
                    .blocks()
                    .filter(|(_, b)| b.kind == BlockKind::Table)
                    .count(),
            has_abstract: self
                .abstract_text
                .as_deref()
                .is_some_and(|a| !a.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Author {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub custom_fields: Vec<CustomField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Section {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub title: String,
    pub order: u32,
    #[serde(deserialize_with = "nullable")]
    pub content_blocks: Vec<ContentBlock>,
    #[serde(deserialize_with = "nullable")]
    pub subsections: Vec<Subsection>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A subsection node. `level` 1 nodes are roots; deeper nodes point at a
/// node one level up through `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subsection {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub title: String,
    #[serde(deserialize_with = "nullable")]
    pub content: String,
    pub order: u32,
    pub level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Subsection {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            content: String::new(),
            order: 0,
            level: 1,
            parent_id: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    #[default]
    Text,
    Image,
    Table,
    Equation,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Image => "image",
            BlockKind::Table => "table",
            BlockKind::Equation => "equation",
        }
    }
}

/// Payload of a non-text block: an encoded file (base64 image, rendered
/// equation, table screenshot) or a grid of cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockData {
    Encoded(String),
    Rows(Vec<Vec<String>>),
}

impl BlockData {
    pub fn is_empty(&self) -> bool {
        match self {
            BlockData::Encoded(s) => s.trim().is_empty(),
            BlockData::Rows(rows) => rows.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentBlock {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BlockData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub order: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentBlock {
    /// True once the block carries a non-empty payload.
    pub fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reference {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub text: String,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Figure {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub order: u32,
}

/// A document-level table: either a cell grid (`headers` + `rows`) or an
/// uploaded image of a table (`data`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Table {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub headers: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub rows: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentSettings {
    pub font_size: String,
    pub columns: u8,
    pub include_page_numbers: bool,
    pub include_copyright: bool,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            font_size: "9.5pt".to_string(),
            columns: 2,
            include_page_numbers: true,
            include_copyright: false,
        }
    }
}

/// Summary attached to download records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub authors: Vec<String>,
    pub section_count: usize,
    pub reference_count: usize,
    pub figure_count: usize,
    pub table_count: usize,
    pub has_abstract: bool,
}
