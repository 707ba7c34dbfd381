//! Resolution of a column path against the flattened schema tree.

use crate::error::{ParquetError, Result};
use crate::metadata::{Repetition, SchemaElement};

/// One node on the path from the root to a leaf
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub element: SchemaElement,
    /// `Required` for the root
    pub repetition: Repetition,
    /// Definition level reached when this node is present
    pub max_definition_level: u16,
    /// Number of repeated nodes from the root down to and including this one
    pub max_repetition_level: u16,
}

/// Root-to-leaf chain of schema nodes for one column
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaPath {
    nodes: Vec<SchemaNode>,
}

impl SchemaPath {
    pub fn nodes(&self) -> &[SchemaNode] {
        &self.nodes
    }

    pub fn leaf(&self) -> &SchemaNode {
        // Construction guarantees at least the root and one leaf
        &self.nodes[self.nodes.len() - 1]
    }

    pub fn leaf_element(&self) -> &SchemaElement {
        &self.leaf().element
    }

    pub fn max_definition_level(&self) -> u16 {
        self.leaf().max_definition_level
    }

    pub fn max_repetition_level(&self) -> u16 {
        self.leaf().max_repetition_level
    }

    /// Dotted path below the root
    pub fn dotted(&self) -> String {
        self.nodes[1..]
            .iter()
            .map(|node| node.element.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// For every repeated node, outermost first, the definition level at
    /// which its enclosing node is present.
    ///
    /// A definition level equal to the threshold means an empty list; below
    /// it, the list itself is null.
    pub fn list_thresholds(&self) -> Vec<u16> {
        self.nodes
            .windows(2)
            .filter(|pair| pair[1].repetition == Repetition::Repeated)
            .map(|pair| pair[0].max_definition_level)
            .collect()
    }
}

/// Index one past the last element of the subtree rooted at `index`.
fn subtree_end(schema: &[SchemaElement], index: usize) -> Result<usize> {
    let mut pending = 1usize;
    let mut cursor = index;
    while pending > 0 {
        let element = schema.get(cursor).ok_or_else(|| {
            ParquetError::format(format!(
                "schema ends inside the subtree of element {index}"
            ))
        })?;
        pending = pending - 1 + element.num_children;
        cursor += 1;
    }
    Ok(cursor)
}

/// Resolve a dotted leaf path (e.g. `tags.list.element`) to its chain of
/// schema nodes, root first.
pub fn get_schema_path(schema: &[SchemaElement], column_path: &str) -> Result<SchemaPath> {
    let parts: Vec<&str> = column_path.split('.').collect();
    get_schema_path_parts(schema, &parts)
}

pub fn get_schema_path_parts(schema: &[SchemaElement], parts: &[&str]) -> Result<SchemaPath> {
    let root = schema
        .first()
        .ok_or_else(|| ParquetError::format("schema is empty"))?;
    let mut nodes = vec![SchemaNode {
        element: root.clone(),
        repetition: Repetition::Required,
        max_definition_level: 0,
        max_repetition_level: 0,
    }];
    let not_found = || {
        ParquetError::format(format!(
            "column {} not found in schema",
            parts.join(".")
        ))
    };

    let mut parent = 0usize;
    for part in parts {
        let mut child = parent + 1;
        let end = subtree_end(schema, parent)?;
        let mut found = None;
        for _ in 0..schema[parent].num_children {
            if child >= end {
                break;
            }
            if schema[child].name == *part {
                found = Some(child);
                break;
            }
            child = subtree_end(schema, child)?;
        }
        let index = found.ok_or_else(not_found)?;
        let element = &schema[index];
        let repetition = element.repetition.unwrap_or(Repetition::Required);
        let previous = &nodes[nodes.len() - 1];
        let max_definition_level =
            previous.max_definition_level + u16::from(repetition != Repetition::Required);
        let max_repetition_level =
            previous.max_repetition_level + u16::from(repetition == Repetition::Repeated);
        nodes.push(SchemaNode {
            element: element.clone(),
            repetition,
            max_definition_level,
            max_repetition_level,
        });
        parent = index;
    }

    if nodes.len() < 2 || !nodes[nodes.len() - 1].element.is_leaf() {
        return Err(not_found());
    }
    Ok(SchemaPath { nodes })
}

/// Dotted paths of every leaf column, in schema order.
pub fn leaf_paths(schema: &[SchemaElement]) -> Result<Vec<String>> {
    fn walk(
        schema: &[SchemaElement],
        index: usize,
        prefix: &mut Vec<String>,
        out: &mut Vec<String>,
    ) -> Result<usize> {
        let element = schema
            .get(index)
            .ok_or_else(|| ParquetError::format("schema ends early"))?;
        if index > 0 {
            prefix.push(element.name.clone());
        }
        let mut next = index + 1;
        if element.num_children == 0 {
            if index > 0 {
                out.push(prefix.join("."));
            }
        } else {
            for _ in 0..element.num_children {
                next = walk(schema, next, prefix, out)?;
            }
        }
        if index > 0 {
            prefix.pop();
        }
        Ok(next)
    }

    let mut out = Vec::new();
    if !schema.is_empty() {
        walk(schema, 0, &mut Vec::new(), &mut out)?;
    }
    Ok(out)
}
