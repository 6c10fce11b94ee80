//! Sample context generation from template content.
//!
//! Template variables (`{{ foo.bar }}`) are extracted, expanded into a
//! nested object using the `.` separator, and every leaf is replaced with
//! its uppercased key (`{"foo": {"bar": "BAR"}}`). The result is stored on
//! the template as its test context and used for previews.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

lazy_static! {
    /// Variable references: letters, dots, underscores, surrounding spaces.
    /// Filters, pipes and tags never match.
    static ref TEMPLATE_VARS: Regex = Regex::new(r"\{\{([ ._a-zA-Z]*)\}\}").unwrap();
}

/// Build the placeholder context for a block of template content
pub fn build_sample_context(content: &str) -> Map<String, Value> {
    fill_placeholders(expand_to_tree(&extract_variable_paths(content)))
}

/// Extract the deduplicated set of variable paths found in the content
pub fn extract_variable_paths(content: &str) -> BTreeSet<String> {
    TEMPLATE_VARS
        .captures_iter(content)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}

/// Convert `.` separated paths into nested objects with empty leaves.
///
/// `["a", "b.c"]` becomes `{"a": {}, "b": {"c": {}}}`.
pub fn expand_to_tree<'a, I>(paths: I) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut tree = Map::new();
    for path in paths {
        let parts: Vec<&str> = path.split('.').filter(|p| !p.is_empty()).collect();
        insert_path(&mut tree, &parts);
    }
    tree
}

fn insert_path(node: &mut Map<String, Value>, parts: &[&str]) {
    if let Some((first, rest)) = parts.split_first() {
        let child = node
            .entry(first.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            *child = Value::Object(Map::new());
        }
        if let Value::Object(children) = child {
            insert_path(children, rest);
        }
    }
}

/// Replace every empty-object leaf with its uppercased key
pub fn fill_placeholders(mut tree: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in tree.iter_mut() {
        if let Value::Object(children) = value {
            if children.is_empty() {
                *value = Value::String(key.to_uppercase());
            } else {
                *children = fill_placeholders(std::mem::take(children));
            }
        }
    }
    tree
}

/// Shallow merge of several contexts, later keys win
pub fn merge_contexts<'a, I>(contexts: I) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a Map<String, Value>>,
{
    let mut merged = Map::new();
    for context in contexts {
        for (key, value) in context {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
