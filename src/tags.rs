use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::slug::slugify;

/// Separator between segments of one hierarchy path: "Parent / Child / Grand Child".
pub const TAG_SEP: &str = " / ";

/// Deepest level tree expansion descends to. Nodes below it stay in `nodes` but are
/// left out of `tree`.
pub const MAX_TREE_DEPTH: usize = 256;

// ---------------------------------------------------------------------------
// Path parsing
// ---------------------------------------------------------------------------

fn multi_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*[|;]\s*").expect("invalid multi-path regex"))
}

/// Split a tags cell holding several paths separated by `|` or `;`.
pub fn split_paths_cell(cell: &str) -> Vec<String> {
    multi_path_re()
        .split(cell)
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

/// Split one path into trimmed, non-empty segments.
pub fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub fn join_segments(segs: &[String]) -> String {
    segs.join(TAG_SEP)
}

/// Segments paired with their slugs. Segments that slugify to nothing
/// (pure punctuation) can't be identified and are skipped.
pub fn path_nodes(path: &str) -> Vec<(String, String)> {
    segments(path)
        .into_iter()
        .filter_map(|name| {
            let slug = slugify(&name);
            (!slug.is_empty()).then_some((name, slug))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagNode {
    pub name: String,
    pub slug: String,
    pub parent_slug: Option<String>,
    pub ancestors: Vec<String>,
    pub depth: usize,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The child already hangs under a different parent.
    ParentMismatch,
    /// Linking would make the child its own ancestor.
    Cycle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagConflict {
    pub child: String,
    pub prev_parent: Option<String>,
    pub new_parent: String,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagTreeNode {
    pub slug: String,
    pub name: String,
    pub depth: usize,
    pub children: Vec<TagTreeNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagHierarchy {
    pub nodes: Vec<TagNode>,
    pub tree: Vec<TagTreeNode>,
    pub conflicts: Vec<TagConflict>,
}

impl TagHierarchy {
    #[cfg(test)]
    pub fn node(&self, slug: &str) -> Option<&TagNode> {
        self.nodes.iter().find(|n| n.slug == slug)
    }
}

/// Accumulates tag nodes and parent links across all rows of an upload.
#[derive(Debug, Default)]
pub struct TagHierarchyBuilder {
    nodes: HashMap<String, TagNode>,
    conflicts: Vec<TagConflict>,
}

impl TagHierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the node for a display name. The first display name seen for a
    /// slug is kept. Returns the slug, or `None` when the name slugifies to nothing.
    pub fn ensure_node(&mut self, name: &str) -> Option<String> {
        let slug = slugify(name);
        if slug.is_empty() {
            return None;
        }
        self.nodes.entry(slug.clone()).or_insert_with(|| TagNode {
            name: name.trim().to_string(),
            slug: slug.clone(),
            parent_slug: None,
            ancestors: Vec::new(),
            depth: 1,
            children: Vec::new(),
        });
        Some(slug)
    }

    /// Hang `child` under `parent`. The first parent wins; a different parent or a
    /// cycle-closing link is recorded as a conflict and leaves the graph untouched.
    pub fn link_parent(&mut self, child: &str, parent: &str) {
        let (Some(child), Some(parent)) = (self.ensure_node(child), self.ensure_node(parent)) else {
            return;
        };
        self.link_slugs(&child, &parent);
    }

    fn link_slugs(&mut self, child: &str, parent: &str) {
        let current = self.nodes.get(child).and_then(|n| n.parent_slug.clone());
        match current {
            Some(ref p) if p == parent => return,
            Some(prev) => {
                warn!(child, prev_parent = %prev, new_parent = parent, "tag parent conflict");
                self.conflicts.push(TagConflict {
                    child: child.to_string(),
                    prev_parent: Some(prev),
                    new_parent: parent.to_string(),
                    kind: ConflictKind::ParentMismatch,
                });
                return;
            }
            None => {}
        }

        if child == parent || self.ancestor_chain(parent).iter().any(|s| s == child) {
            warn!(child, new_parent = parent, "tag link would create a cycle");
            self.conflicts.push(TagConflict {
                child: child.to_string(),
                prev_parent: None,
                new_parent: parent.to_string(),
                kind: ConflictKind::Cycle,
            });
            return;
        }

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent_slug = Some(parent.to_string());
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            if !node.children.iter().any(|c| c == child) {
                node.children.push(child.to_string());
            }
        }
    }

    /// Register every segment of a path and link consecutive segments.
    pub fn add_path(&mut self, path: &str) {
        let names: Vec<String> = path_nodes(path).into_iter().map(|(name, _)| name).collect();
        for name in &names {
            self.ensure_node(name);
        }
        for pair in names.windows(2) {
            self.link_parent(&pair[1], &pair[0]);
        }
    }

    /// Slugs from the root down to (excluding) `slug`. A visited set bounds the walk.
    fn ancestor_chain(&self, slug: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([slug]);
        let mut cur = self.nodes.get(slug);
        while let Some(parent_slug) = cur.and_then(|n| n.parent_slug.as_deref()) {
            if !visited.insert(parent_slug) {
                break;
            }
            let Some(parent) = self.nodes.get(parent_slug) else {
                break;
            };
            chain.push(parent.slug.clone());
            cur = Some(parent);
        }
        chain.reverse();
        chain
    }

    pub fn finish(self) -> TagHierarchy {
        let ancestors: HashMap<String, Vec<String>> = self
            .nodes
            .keys()
            .map(|slug| (slug.clone(), self.ancestor_chain(slug)))
            .collect();

        let mut nodes: Vec<TagNode> = self
            .nodes
            .into_values()
            .map(|mut node| {
                node.ancestors = ancestors.get(&node.slug).cloned().unwrap_or_default();
                node.depth = node.ancestors.len() + 1;
                node
            })
            .collect();
        nodes.sort_by(|a, b| cmp_names(&a.name, &b.name).then_with(|| a.slug.cmp(&b.slug)));

        let by_slug: HashMap<&str, &TagNode> = nodes.iter().map(|n| (n.slug.as_str(), n)).collect();
        let tree = nodes
            .iter()
            .filter(|n| n.parent_slug.is_none())
            .filter_map(|root| expand(&root.slug, &by_slug, &mut HashSet::new(), 0))
            .collect();

        TagHierarchy {
            nodes,
            tree,
            conflicts: self.conflicts,
        }
    }
}

fn expand(
    slug: &str,
    by_slug: &HashMap<&str, &TagNode>,
    visited: &mut HashSet<String>,
    depth: usize,
) -> Option<TagTreeNode> {
    if depth >= MAX_TREE_DEPTH || !visited.insert(slug.to_string()) {
        return None;
    }
    let node = by_slug.get(slug)?;
    let children = node
        .children
        .iter()
        .filter_map(|c| expand(c, by_slug, visited, depth + 1))
        .collect();
    Some(TagTreeNode {
        slug: node.slug.clone(),
        name: node.name.clone(),
        depth: node.depth,
        children,
    })
}

fn cmp_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

// ---------------------------------------------------------------------------
// Flat tag index
// ---------------------------------------------------------------------------

/// Every segment of every path in a cell, as a flat set of names.
pub fn flat_tags(cell: &str) -> BTreeSet<String> {
    split_paths_cell(cell)
        .iter()
        .flat_map(|p| segments(p))
        .collect()
}

/// Sorted vocabulary of flat tag names across all rows.
pub fn unique_tags(rows: &[Vec<String>], tags_col: Option<usize>) -> Vec<String> {
    let Some(col) = tags_col else {
        return Vec::new();
    };
    let vocab: BTreeSet<String> = rows
        .iter()
        .filter_map(|r| r.get(col))
        .flat_map(|cell| flat_tags(cell))
        .collect();
    let mut out: Vec<String> = vocab.into_iter().collect();
    out.sort_by(|a, b| cmp_names(a, b));
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagIndex {
    pub index: BTreeMap<String, Vec<String>>,
    pub unique_tags: Vec<String>,
}

/// Inverted index from flat tag name to the ids of rows carrying it.
/// Rows without an id are left out.
pub fn build_tag_index(
    rows: &[Vec<String>],
    tags_col: Option<usize>,
    id_col: Option<usize>,
) -> TagIndex {
    let (Some(tags_col), Some(id_col)) = (tags_col, id_col) else {
        return TagIndex::default();
    };
    let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        let id = row.get(id_col).map(|s| s.trim()).unwrap_or("");
        if id.is_empty() {
            continue;
        }
        let cell = row.get(tags_col).map(|s| s.as_str()).unwrap_or("");
        for tag in flat_tags(cell) {
            index.entry(tag).or_default().push(id.to_string());
        }
    }
    for ids in index.values_mut() {
        ids.sort_by(|a, b| cmp_ids(a, b));
    }
    let mut unique_tags: Vec<String> = index.keys().cloned().collect();
    unique_tags.sort_by(|a, b| cmp_names(a, b));
    TagIndex { index, unique_tags }
}

fn cmp_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => {
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        _ => a.cmp(b),
    }
}
