//! Subsection arena and derived numbering.
//!
//! Subsections are stored flat with `parent_id` pointers. [`Outline::build`]
//! indexes them once (`id → node`, `parent → [children]`) and rejects
//! anything that is not a well-formed forest, so numbering never has to walk
//! untrusted pointers.
//!
//! ```text
//! section 2
//! ├─ A  (level 1)          2.1
//! │  └─ B  (level 2, A)    2.1.1
//! └─ C  (level 1)          2.2
//! ```

use super::{Section, Subsection};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Structural problems in one section's subsection graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OutlineError {
    #[error("subsection has an empty id")]
    EmptyId,

    #[error("duplicate subsection id '{id}'")]
    DuplicateId { id: String },

    #[error("subsection '{id}' has level 0; levels start at 1")]
    ZeroLevel { id: String },

    #[error("level-1 subsection '{id}' must not have a parent")]
    RootWithParent { id: String },

    #[error("level-{level} subsection '{id}' has no parent")]
    MissingParentId { id: String, level: u8 },

    #[error("subsection '{id}' references unknown parent '{parent_id}'")]
    UnknownParent { id: String, parent_id: String },

    #[error("subsection '{id}' is part of a parent cycle")]
    Cycle { id: String },

    #[error("subsection '{id}' has level {level} but its parent '{parent_id}' has level {parent_level}")]
    LevelMismatch {
        id: String,
        level: u8,
        parent_id: String,
        parent_level: u8,
    },
}

/// Validated index over one section's subsections.
#[derive(Debug)]
pub struct Outline<'a> {
    nodes: HashMap<&'a str, &'a Subsection>,
    roots: Vec<&'a str>,
    children: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> Outline<'a> {
    /// Index `section.subsections`, failing on the first structural error.
    pub fn build(section: &'a Section) -> Result<Self, OutlineError> {
        Self::from_subsections(&section.subsections)
    }

    /// Like [`Outline::build`] but over a bare slice.
    pub fn from_subsections(subsections: &'a [Subsection]) -> Result<Self, OutlineError> {
        let mut nodes: HashMap<&str, &Subsection> = HashMap::with_capacity(subsections.len());
        for sub in subsections {
            if sub.id.is_empty() {
                return Err(OutlineError::EmptyId);
            }
            if nodes.insert(sub.id.as_str(), sub).is_some() {
                return Err(OutlineError::DuplicateId { id: sub.id.clone() });
            }
        }

        // Sibling order: `order`, then position in the input.
        let mut ordered: Vec<(usize, &Subsection)> = subsections.iter().enumerate().collect();
        ordered.sort_by_key(|(pos, s)| (s.order, *pos));

        let mut roots = Vec::new();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for (_, sub) in &ordered {
            match (sub.level, sub.parent_id.as_deref()) {
                (0, _) => return Err(OutlineError::ZeroLevel { id: sub.id.clone() }),
                (1, Some(_)) => return Err(OutlineError::RootWithParent { id: sub.id.clone() }),
                (1, None) => roots.push(sub.id.as_str()),
                (level, None) => {
                    return Err(OutlineError::MissingParentId {
                        id: sub.id.clone(),
                        level,
                    })
                }
                (_, Some(parent_id)) => {
                    if !nodes.contains_key(parent_id) {
                        return Err(OutlineError::UnknownParent {
                            id: sub.id.clone(),
                            parent_id: parent_id.to_string(),
                        });
                    }
                    children.entry(parent_id).or_default().push(sub.id.as_str());
                }
            }
        }

        for sub in subsections {
            check_chain(&nodes, sub)?;
        }

        for sub in subsections {
            if let Some(parent_id) = sub.parent_id.as_deref() {
                let parent = nodes[parent_id];
                if parent.level.checked_add(1) != Some(sub.level) {
                    return Err(OutlineError::LevelMismatch {
                        id: sub.id.clone(),
                        level: sub.level,
                        parent_id: parent_id.to_string(),
                        parent_level: parent.level,
                    });
                }
            }
        }

        Ok(Self {
            nodes,
            roots,
            children,
        })
    }

    /// Level-1 ids in sibling order.
    pub fn roots(&self) -> &[&'a str] {
        &self.roots
    }

    /// Child ids of `id` in sibling order.
    pub fn children(&self, id: &str) -> &[&'a str] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: &str) -> Option<&'a Subsection> {
        self.nodes.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Display numbers for every subsection, in pre-order.
    ///
    /// `section_index` is 0-based; the printed section number is
    /// `section_index + 1`.
    pub fn numbering(&self, section_index: usize) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(&str, String)> = self
            .roots
            .iter()
            .enumerate()
            .rev()
            .map(|(i, id)| (*id, format!("{}.{}", section_index + 1, i + 1)))
            .collect();
        while let Some((id, number)) = stack.pop() {
            for (i, child) in self.children(id).iter().enumerate().rev() {
                stack.push((*child, format!("{}.{}", number, i + 1)));
            }
            out.push((id.to_string(), number));
        }
        out
    }

    /// Display number of a single subsection.
    pub fn number_of(&self, section_index: usize, id: &str) -> Option<String> {
        let mut path = Vec::new();
        let mut current = self.get(id)?;
        loop {
            let siblings = match current.parent_id.as_deref() {
                None => self.roots(),
                Some(parent) => self.children(parent),
            };
            let pos = siblings.iter().position(|s| *s == current.id)?;
            path.push(pos + 1);
            match current.parent_id.as_deref() {
                None => break,
                Some(parent) => current = self.get(parent)?,
            }
        }
        let mut number = (section_index + 1).to_string();
        for n in path.iter().rev() {
            number.push('.');
            number.push_str(&n.to_string());
        }
        Some(number)
    }
}

/// Walk the parent chain of `start`, failing if it revisits a node.
fn check_chain(nodes: &HashMap<&str, &Subsection>, start: &Subsection) -> Result<(), OutlineError> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current = start;
    seen.insert(current.id.as_str());
    while let Some(parent_id) = current.parent_id.as_deref() {
        if !seen.insert(parent_id) {
            return Err(OutlineError::Cycle {
                id: start.id.clone(),
            });
        }
        match nodes.get(parent_id) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    Ok(())
}
