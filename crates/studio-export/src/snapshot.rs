//! Read-only view of the rendered page the engine scans.
//!
//! The host serializes its node tree as [`SnapshotNode`] JSON; [`Snapshot`]
//! flattens it into a pre-order arena so subtree membership is a range check
//! and descendant walks never recurse.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ExportError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// One node of the serialized tree as the host sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default = "full_opacity")]
    pub opacity: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SnapshotNode>,
}

fn full_opacity() -> f32 {
    1.0
}

impl SnapshotNode {
    #[must_use]
    pub fn element(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            role: None,
            text: None,
            attributes: BTreeMap::new(),
            bbox: None,
            hidden: false,
            opacity: 1.0,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    #[must_use]
    pub fn class(mut self, class: &str) -> Self {
        let entry = self.attributes.entry("class".to_string()).or_default();
        if !entry.is_empty() {
            entry.push(' ');
        }
        entry.push_str(class);
        self
    }

    #[must_use]
    pub fn bbox(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bbox = Some(BoundingBox::new(x, y, width, height));
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    #[must_use]
    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    #[must_use]
    pub fn child(mut self, child: SnapshotNode) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = SnapshotNode>) -> Self {
        self.children.extend(children);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    role: Option<String>,
    text: String,
    attributes: BTreeMap<String, String>,
    bbox: Option<BoundingBox>,
    hidden: bool,
    opacity: f32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    subtree_end: usize,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    nodes: Vec<NodeData>,
}

impl Snapshot {
    #[must_use]
    pub fn from_tree(root: SnapshotNode) -> Self {
        let mut nodes: Vec<NodeData> = Vec::new();
        let mut stack = vec![(root, None::<NodeId>)];

        while let Some((node, parent)) = stack.pop() {
            let id = NodeId(nodes.len());
            if let Some(parent) = parent {
                nodes[parent.0].children.push(id);
            }

            let SnapshotNode {
                tag,
                role,
                text,
                attributes,
                bbox,
                hidden,
                opacity,
                children,
            } = node;

            nodes.push(NodeData {
                tag: tag.trim().to_ascii_lowercase(),
                role: role
                    .map(|role| role.trim().to_ascii_lowercase())
                    .filter(|role| !role.is_empty()),
                text: text.unwrap_or_default(),
                attributes,
                bbox,
                hidden,
                opacity,
                parent,
                children: Vec::new(),
                subtree_end: id.0 + 1,
            });

            for child in children.into_iter().rev() {
                stack.push((child, Some(id)));
            }
        }

        for index in (0..nodes.len()).rev() {
            if let Some(&last) = nodes[index].children.last() {
                nodes[index].subtree_end = nodes[last.0].subtree_end;
            }
        }

        Self { nodes }
    }

    pub fn from_json(json: &str) -> Result<Self, ExportError> {
        let root: SnapshotNode = serde_json::from_str(json)
            .map_err(|error| ExportError::SnapshotUnavailable(error.to_string()))?;
        Ok(Self::from_tree(root))
    }

    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let json = std::fs::read_to_string(path).map_err(|error| {
            ExportError::SnapshotUnavailable(format!("{}: {error}", path.display()))
        })?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            snapshot: self,
            id: NodeId(0),
        }
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeRef { snapshot: self, id })
    }

    /// All nodes in document order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_>> {
        (0..self.nodes.len()).map(move |index| NodeRef {
            snapshot: self,
            id: NodeId(index),
        })
    }
}

impl From<SnapshotNode> for Snapshot {
    fn from(root: SnapshotNode) -> Self {
        Self::from_tree(root)
    }
}

/// Anything that can hand the engine the page it should scan.
pub trait SnapshotSource {
    fn snapshot(&self) -> Result<&Snapshot, ExportError>;
}

impl SnapshotSource for Snapshot {
    fn snapshot(&self) -> Result<&Snapshot, ExportError> {
        Ok(self)
    }
}

impl SnapshotSource for Option<Snapshot> {
    fn snapshot(&self) -> Result<&Snapshot, ExportError> {
        self.as_ref().ok_or_else(|| {
            ExportError::SnapshotUnavailable("no page snapshot has been captured".to_string())
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    snapshot: &'a Snapshot,
    id: NodeId,
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.snapshot, other.snapshot)
    }
}

impl<'a> NodeRef<'a> {
    fn data(&self) -> &'a NodeData {
        &self.snapshot.nodes[self.id.0]
    }

    fn at(&self, id: NodeId) -> NodeRef<'a> {
        NodeRef {
            snapshot: self.snapshot,
            id,
        }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn tag(&self) -> &'a str {
        &self.data().tag
    }

    #[must_use]
    pub fn role(&self) -> Option<&'a str> {
        self.data().role.as_deref()
    }

    #[must_use]
    pub fn own_text(&self) -> &'a str {
        &self.data().text
    }

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.data().attributes.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.data().attributes.contains_key(name)
    }

    pub fn classes(self) -> impl Iterator<Item = &'a str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    #[must_use]
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.data().bbox
    }

    /// Own text plus the text of every descendant, whitespace-collapsed.
    #[must_use]
    pub fn text(&self) -> String {
        let end = self.data().subtree_end;
        let mut parts = Vec::new();
        for node in &self.snapshot.nodes[self.id.0..end] {
            if !node.text.trim().is_empty() {
                parts.push(node.text.as_str());
            }
        }
        normalize_ws(&parts.join(" "))
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.data().parent.map(|id| self.at(id))
    }

    pub fn children(self) -> impl Iterator<Item = NodeRef<'a>> {
        let snapshot = self.snapshot;
        self.data()
            .children
            .iter()
            .map(move |&id| NodeRef { snapshot, id })
    }

    /// Nearest first.
    pub fn ancestors(self) -> impl Iterator<Item = NodeRef<'a>> {
        std::iter::successors(self.parent(), NodeRef::parent)
    }

    /// Pre-order, excluding `self`.
    pub fn descendants(self) -> impl Iterator<Item = NodeRef<'a>> {
        let snapshot = self.snapshot;
        (self.id.0 + 1..self.data().subtree_end).map(move |index| NodeRef {
            snapshot,
            id: NodeId(index),
        })
    }

    /// Siblings before this node, nearest first.
    #[must_use]
    pub fn previous_siblings(&self) -> Vec<NodeRef<'a>> {
        let Some(parent) = self.parent() else {
            return Vec::new();
        };
        let siblings = &parent.data().children;
        let position = siblings.iter().position(|&id| id == self.id).unwrap_or(0);
        siblings[..position]
            .iter()
            .rev()
            .map(|&id| self.at(id))
            .collect()
    }

    #[must_use]
    pub fn next_siblings(&self) -> Vec<NodeRef<'a>> {
        let Some(parent) = self.parent() else {
            return Vec::new();
        };
        let siblings = &parent.data().children;
        let position = siblings
            .iter()
            .position(|&id| id == self.id)
            .map_or(siblings.len(), |index| index + 1);
        siblings[position..].iter().map(|&id| self.at(id)).collect()
    }

    /// True when `self` is `other` or lies inside it.
    #[must_use]
    pub fn is_within(&self, other: NodeId) -> bool {
        let container = &self.snapshot.nodes[other.0];
        other.0 <= self.id.0 && self.id.0 < container.subtree_end
    }

    #[must_use]
    pub fn is_heading(&self) -> bool {
        matches!(self.tag(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
            || self.role() == Some("heading")
    }

    /// Descendants without children that carry text of their own.
    pub fn text_leaves(self) -> impl Iterator<Item = NodeRef<'a>> {
        self.descendants().filter(|node| {
            node.data().children.is_empty() && !node.own_text().trim().is_empty()
        })
    }

    /// Text of the closest heading before this node: a preceding sibling of
    /// the node or of any ancestor, either a heading itself or holding one.
    #[must_use]
    pub fn nearest_heading(&self) -> Option<String> {
        std::iter::once(*self)
            .chain(self.ancestors())
            .flat_map(|node| node.previous_siblings())
            .find_map(|sibling| {
                if sibling.is_heading() {
                    return Some(sibling.text());
                }
                sibling
                    .descendants()
                    .filter(NodeRef::is_heading)
                    .last()
                    .map(|heading| heading.text())
            })
            .filter(|text| !text.is_empty())
    }

    /// Computed visibility: non-empty box, not hidden, not transparent, and
    /// no hidden or transparent ancestor.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        let has_box = self.bbox().is_some_and(|bbox| !bbox.is_empty());
        has_box && self.is_rendered() && self.ancestors().all(|node| node.is_rendered())
    }

    fn is_rendered(&self) -> bool {
        let data = self.data();
        !data.hidden && data.opacity > 0.0
    }

    /// CSS-like path from the root, e.g. `body > div#kpis > table.sales`.
    #[must_use]
    pub fn source_location(&self) -> String {
        let mut segments: Vec<String> = self
            .ancestors()
            .map(|node| node.path_segment())
            .collect();
        segments.reverse();
        segments.push(self.path_segment());
        segments.join(" > ")
    }

    fn path_segment(&self) -> String {
        let mut segment = self.tag().to_string();
        if let Some(id) = self.attr("id").filter(|id| !id.is_empty()) {
            segment.push('#');
            segment.push_str(id);
        } else if let Some(class) = self.classes().next() {
            segment.push('.');
            segment.push_str(class);
        }
        segment
    }
}

pub(crate) fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::{Snapshot, SnapshotNode, SnapshotSource};

    fn sample() -> Snapshot {
        Snapshot::from_tree(
            SnapshotNode::element("body")
                .bbox(0.0, 0.0, 1000.0, 800.0)
                .child(
                    SnapshotNode::element("div")
                        .id("kpis")
                        .bbox(0.0, 0.0, 500.0, 100.0)
                        .child(SnapshotNode::element("span").text(" Active   members "))
                        .child(SnapshotNode::element("span").text("1,204")),
                )
                .child(
                    SnapshotNode::element("section").hidden().child(
                        SnapshotNode::element("p")
                            .text("secret")
                            .bbox(0.0, 0.0, 10.0, 10.0),
                    ),
                ),
        )
    }

    #[test]
    fn flattens_tree_in_document_order() {
        let snapshot = sample();
        let tags = snapshot.nodes().map(|node| node.tag()).collect::<Vec<_>>();
        assert_eq!(tags, vec!["body", "div", "span", "span", "section", "p"]);
    }

    #[test]
    fn collects_descendant_text() {
        let snapshot = sample();
        let kpis = snapshot.nodes().find(|node| node.attr("id") == Some("kpis")).unwrap();
        assert_eq!(kpis.text(), "Active members 1,204");
        assert_eq!(kpis.descendants().count(), 2);
    }

    #[test]
    fn hidden_ancestor_hides_descendants() {
        let snapshot = sample();
        let paragraph = snapshot.nodes().find(|node| node.tag() == "p").unwrap();
        assert!(!paragraph.is_visible());
        assert!(snapshot.root().is_visible());
    }

    #[test]
    fn subtree_membership_and_location() {
        let snapshot = sample();
        let kpis = snapshot.nodes().find(|node| node.attr("id") == Some("kpis")).unwrap();
        let span = kpis.children().next().unwrap();
        assert!(span.is_within(kpis.id()));
        assert!(!kpis.is_within(span.id()));
        assert_eq!(span.source_location(), "body > div#kpis > span");
    }

    #[test]
    fn finds_heading_before_an_ancestor() {
        let snapshot = Snapshot::from_tree(
            SnapshotNode::element("body")
                .child(SnapshotNode::element("h2").text("Revenue by studio"))
                .child(
                    SnapshotNode::element("div")
                        .child(SnapshotNode::element("table").id("sales")),
                ),
        );
        let table = snapshot.nodes().find(|node| node.tag() == "table").unwrap();
        assert_eq!(table.nearest_heading().as_deref(), Some("Revenue by studio"));
        assert_eq!(snapshot.root().nearest_heading(), None);
    }

    #[test]
    fn missing_snapshot_is_unavailable() {
        let absent: Option<Snapshot> = None;
        assert!(absent.snapshot().is_err());
        assert!(Snapshot::from_json("{not json").is_err());
    }
}
