//! Value filter tree and the filtered payload merge.
//!
//! Each entity's value template (e.g. `{{ value_json.rxInfo[0].rssi }}`)
//! names a path into the uplink payload. The union of those paths forms a
//! [`ValueFilterTree`]; merging a payload into the per-device cache keeps
//! exactly the fields reachable through it, so the cache never grows beyond
//! what some entity displays.
//!
//! Recursion is driven by the filter, never by the payload: output shape is
//! fully determined by the templates.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

const TEMPLATE_ROOT: &str = "value_json.";

/// One node of the filter tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FilterNode {
    /// Retain the field as a whole.
    #[default]
    Leaf,
    /// Retain only the listed sub-fields.
    Map(BTreeMap<String, FilterNode>),
    /// The field is a list; filter element 0 with the inner node.
    ArrayOfOne(Box<FilterNode>),
}

impl FilterNode {
    /// Union `other` into `self`.
    ///
    /// When both sides disagree on the shape of a field, the existing shape
    /// is kept and `other` is absorbed below it; a [`Leaf`](Self::Leaf) is
    /// always upgraded to the more specific shape.
    pub fn absorb(&mut self, other: &FilterNode) {
        match other {
            FilterNode::Leaf => {}
            FilterNode::ArrayOfOne(other_inner) => match self {
                FilterNode::ArrayOfOne(inner) => inner.absorb(other_inner),
                FilterNode::Leaf => *self = other.clone(),
                FilterNode::Map(_) => self.absorb(other_inner),
            },
            FilterNode::Map(other_children) => match self {
                FilterNode::Map(children) => {
                    for (key, child) in other_children {
                        children
                            .entry(key.clone())
                            .and_modify(|existing| existing.absorb(child))
                            .or_insert_with(|| child.clone());
                    }
                }
                FilterNode::ArrayOfOne(inner) => inner.absorb(other),
                FilterNode::Leaf => *self = other.clone(),
            },
        }
    }
}

/// One segment of a template path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    /// The segment was indexed (`rxInfo[0]`).
    pub indexed: bool,
}

/// Extract the payload paths referenced by a value template.
///
/// A path starts after `value_json.` and runs up to the next blank; paths not
/// followed by a blank on the same line are ignored.
#[must_use]
pub fn template_paths(template: &str) -> Vec<Vec<PathSegment>> {
    let mut paths = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find(TEMPLATE_ROOT) {
        let after = &rest[start + TEMPLATE_ROOT.len()..];
        let Some(end) = after.find([' ', '\n']) else {
            break;
        };
        if end == 0 || after.as_bytes()[end] == b'\n' {
            rest = &after[end..];
            continue;
        }
        let segments: Vec<PathSegment> = after[..end]
            .split('.')
            .filter_map(|part| {
                let (name, indexed) = match part.split_once('[') {
                    Some((name, _)) => (name, true),
                    None => (part, false),
                };
                (!name.is_empty()).then(|| PathSegment {
                    name: name.to_string(),
                    indexed,
                })
            })
            .collect();
        if !segments.is_empty() {
            paths.push(segments);
        }
        rest = &after[end + 1..];
    }
    paths
}

/// Schema of the fields worth caching, shared by every device of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFilterTree {
    root: FilterNode,
}

impl Default for ValueFilterTree {
    fn default() -> Self {
        Self {
            root: FilterNode::Map(BTreeMap::new()),
        }
    }
}

impl ValueFilterTree {
    /// An empty tree (retains nothing).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a set of value templates.
    #[must_use]
    pub fn from_templates<I, S>(templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for template in templates {
            tree.add_template(template.as_ref());
        }
        tree
    }

    /// Add every path referenced by `template`.
    pub fn add_template(&mut self, template: &str) {
        for path in template_paths(template) {
            self.add_path(&path);
        }
    }

    /// Add a single path.
    pub fn add_path(&mut self, path: &[PathSegment]) {
        let mut node = FilterNode::Leaf;
        for segment in path.iter().rev() {
            let child = if segment.indexed {
                FilterNode::ArrayOfOne(Box::new(node))
            } else {
                node
            };
            node = FilterNode::Map(BTreeMap::from([(segment.name.clone(), child)]));
        }
        self.root.absorb(&node);
    }

    /// Union another tree into this one.
    pub fn extend(&mut self, other: &ValueFilterTree) {
        self.root.absorb(&other.root);
    }

    /// Root node (always a [`FilterNode::Map`]).
    #[must_use]
    pub fn root(&self) -> &FilterNode {
        &self.root
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(&self.root, FilterNode::Map(children) if children.is_empty())
    }

    /// Merge `incoming` into `cached`, keeping only filtered fields.
    ///
    /// Fields missing from `incoming` keep their cached value; the result is
    /// always a JSON object.
    #[must_use]
    pub fn merge(&self, cached: Option<&Value>, incoming: &Value) -> Value {
        merge(cached, Some(incoming), &self.root).unwrap_or_else(|| Value::Object(Map::new()))
    }
}

/// Merge two optional values through a filter node.
///
/// Returns `None` only for a leaf absent on both sides.
#[must_use]
pub fn merge(cached: Option<&Value>, incoming: Option<&Value>, filter: &FilterNode) -> Option<Value> {
    match filter {
        FilterNode::Leaf => incoming.or(cached).cloned(),
        FilterNode::ArrayOfOne(inner) => {
            let cached = cached.and_then(first_element);
            let incoming = incoming.and_then(first_element);
            Some(Value::Array(
                merge(cached, incoming, inner).into_iter().collect(),
            ))
        }
        FilterNode::Map(children) => {
            let mut merged = Map::new();
            for (key, child) in children {
                let cached = cached.and_then(|value| value.get(key));
                let incoming = incoming.and_then(|value| value.get(key));
                if cached.is_none() && incoming.is_none() {
                    continue;
                }
                if let Some(value) = merge(cached, incoming, child) {
                    merged.insert(key.clone(), value);
                }
            }
            Some(Value::Object(merged))
        }
    }
}

fn first_element(value: &Value) -> Option<&Value> {
    value.as_array().and_then(|items| items.first())
}
