//! Decoded MIME part tree.
//!
//! Parts live in an arena owned by [`PartTree`] and refer to each other by
//! [`PartId`]. The tree only grows: children are appended in document order
//! and a part's parent never changes.

use std::collections::VecDeque;
use std::ops::Index;

use crate::content_type::ContentType;
use crate::disposition::ContentDisposition;
use crate::encoding::codec::CodecRegistry;
use crate::encoding::rfc2047::decode_header;
use crate::header::Headers;

/// Index of a part within its [`PartTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PartId(usize);

impl PartId {
    /// Position of the part in creation order. The root is 0.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// One node of the part tree.
///
/// A container (`multipart/*`) has children and no content. Any other part
/// is a leaf holding its fully decoded body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Part {
    parent: Option<PartId>,
    children: Vec<PartId>,
    next_sibling: Option<PartId>,
    headers: Headers,
    content_type: String,
    disposition: String,
    file_name: String,
    charset: String,
    content: Vec<u8>,
}

impl Part {
    /// Creates a detached part with a media type and header.
    #[must_use]
    pub fn new(content_type: impl Into<String>, headers: Headers) -> Self {
        Self {
            content_type: content_type.into(),
            headers,
            ..Self::default()
        }
    }

    /// Enclosing part, `None` for the root.
    #[must_use]
    pub const fn parent(&self) -> Option<PartId> {
        self.parent
    }

    /// Child parts in document order.
    #[must_use]
    pub fn children(&self) -> &[PartId] {
        &self.children
    }

    /// First child part.
    #[must_use]
    pub fn first_child(&self) -> Option<PartId> {
        self.children.first().copied()
    }

    /// Next part with the same parent.
    #[must_use]
    pub const fn next_sibling(&self) -> Option<PartId> {
        self.next_sibling
    }

    /// Raw header of the part.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Media type without parameters, lower case (e.g. `text/plain`).
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Disposition without parameters, lower case. Empty if not declared.
    #[must_use]
    pub fn disposition(&self) -> &str {
        &self.disposition
    }

    /// Decoded file name. Empty if the part has none.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Declared charset. Empty if not declared.
    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Decoded body. Empty for containers.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// True for `multipart/*` parts, including a bare `multipart` type.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.content_type.split('/').next() == Some("multipart")
    }

    /// Fills in disposition, file name and charset from the part's header
    /// and parsed media type.
    ///
    /// The file name comes from the first non-empty of the disposition
    /// `filename`, the type `name` and the type `file` parameters.
    pub(crate) fn resolve_metadata(
        &mut self,
        content_type: Option<&ContentType>,
        codecs: &CodecRegistry,
    ) {
        let disposition = self
            .headers
            .get("Content-Disposition")
            .map(ContentDisposition::parse)
            .unwrap_or_default();
        self.disposition.clone_from(&disposition.disposition);

        let type_param = |name: &str| content_type.and_then(|ct| ct.parameter(name));
        self.file_name = [
            disposition.filename(),
            type_param("name"),
            type_param("file"),
        ]
        .into_iter()
        .flatten()
        .map(|candidate| decode_header(candidate, codecs))
        .find(|name| !name.is_empty())
        .unwrap_or_default();

        self.charset = content_type
            .and_then(ContentType::charset)
            .unwrap_or_default()
            .to_string();
    }

    pub(crate) fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }
}

/// An arena of parts rooted at the whole message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PartTree {
    parts: Vec<Part>,
}

impl PartTree {
    /// Creates a tree holding only `root`.
    #[must_use]
    pub fn new(mut root: Part) -> Self {
        root.parent = None;
        root.next_sibling = None;
        root.children.clear();
        Self { parts: vec![root] }
    }

    /// Id of the root part.
    #[must_use]
    pub const fn root(&self) -> PartId {
        PartId(0)
    }

    /// Number of parts, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Always false; a tree has at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Looks up a part.
    #[must_use]
    pub fn get(&self, id: PartId) -> Option<&Part> {
        self.parts.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: PartId) -> Option<&mut Part> {
        self.parts.get_mut(id.0)
    }

    /// Links `part` as the last child of `parent` and returns its id.
    pub(crate) fn append_child(&mut self, parent: PartId, mut part: Part) -> PartId {
        let id = PartId(self.parts.len());
        part.parent = Some(parent);
        part.next_sibling = None;
        part.children.clear();

        let siblings = &mut self.parts[parent.0].children;
        let previous = siblings.last().copied();
        siblings.push(id);
        if let Some(previous) = previous {
            self.parts[previous.0].next_sibling = Some(id);
        }
        self.parts.push(part);
        id
    }

    /// Parent of a part.
    #[must_use]
    pub fn parent(&self, id: PartId) -> Option<PartId> {
        self.get(id).and_then(Part::parent)
    }

    /// Children of a part in document order.
    #[must_use]
    pub fn children(&self, id: PartId) -> &[PartId] {
        self.get(id).map_or(&[][..], Part::children)
    }

    /// First child of a part.
    #[must_use]
    pub fn first_child(&self, id: PartId) -> Option<PartId> {
        self.get(id).and_then(Part::first_child)
    }

    /// Next sibling of a part.
    #[must_use]
    pub fn next_sibling(&self, id: PartId) -> Option<PartId> {
        self.get(id).and_then(Part::next_sibling)
    }

    /// Visits all parts level by level, starting at the root.
    #[must_use]
    pub fn breadth_first(&self) -> BreadthFirst<'_> {
        BreadthFirst {
            tree: self,
            queue: VecDeque::from([self.root()]),
        }
    }

    /// Visits all parts in document order (pre-order), starting at the root.
    #[must_use]
    pub fn depth_first(&self) -> DepthFirst<'_> {
        DepthFirst {
            tree: self,
            stack: vec![self.root()],
        }
    }

    /// First part in breadth-first order that matches.
    pub fn breadth_match_first(&self, matcher: impl Fn(&Part) -> bool) -> Option<PartId> {
        self.breadth_first().find(|&id| matcher(&self[id]))
    }

    /// All parts that match, in breadth-first order.
    pub fn breadth_match_all(&self, matcher: impl Fn(&Part) -> bool) -> Vec<PartId> {
        self.breadth_first().filter(|&id| matcher(&self[id])).collect()
    }

    /// All parts that match, in depth-first order.
    pub fn depth_match_all(&self, matcher: impl Fn(&Part) -> bool) -> Vec<PartId> {
        self.depth_first().filter(|&id| matcher(&self[id])).collect()
    }
}

impl Index<PartId> for PartTree {
    type Output = Part;

    fn index(&self, id: PartId) -> &Part {
        &self.parts[id.0]
    }
}

/// Breadth-first iterator over a [`PartTree`].
#[derive(Debug)]
pub struct BreadthFirst<'a> {
    tree: &'a PartTree,
    queue: VecDeque<PartId>,
}

impl Iterator for BreadthFirst<'_> {
    type Item = PartId;

    fn next(&mut self) -> Option<PartId> {
        let id = self.queue.pop_front()?;
        self.queue.extend(self.tree.children(id));
        Some(id)
    }
}

/// Depth-first (pre-order) iterator over a [`PartTree`].
#[derive(Debug)]
pub struct DepthFirst<'a> {
    tree: &'a PartTree,
    stack: Vec<PartId>,
}

impl Iterator for DepthFirst<'_> {
    type Item = PartId;

    fn next(&mut self) -> Option<PartId> {
        let id = self.stack.pop()?;
        self.stack.extend(self.tree.children(id).iter().rev());
        Some(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    ///   root
    ///   ├── a
    ///   │   ├── a1
    ///   │   └── a2
    ///   └── b
    fn sample() -> (PartTree, [PartId; 4]) {
        let mut tree = PartTree::new(Part::new("multipart/mixed", Headers::new()));
        let root = tree.root();
        let a = tree.append_child(root, Part::new("multipart/alternative", Headers::new()));
        let b = tree.append_child(root, Part::new("image/png", Headers::new()));
        let a1 = tree.append_child(a, Part::new("text/plain", Headers::new()));
        let a2 = tree.append_child(a, Part::new("text/html", Headers::new()));
        (tree, [a, b, a1, a2])
    }

    #[test]
    fn test_links() {
        let (tree, [a, b, a1, a2]) = sample();
        let root = tree.root();
        assert_eq!(tree.children(root), [a, b]);
        assert_eq!(tree.first_child(root), Some(a));
        assert_eq!(tree.next_sibling(a), Some(b));
        assert_eq!(tree.next_sibling(b), None);
        assert_eq!(tree.next_sibling(a1), Some(a2));
        assert_eq!(tree.parent(a2), Some(a));
        assert_eq!(tree.parent(root), None);
        assert!(tree[a].is_container());
        assert!(!tree[a1].is_container());
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_traversal_order() {
        let (tree, [a, b, a1, a2]) = sample();
        let root = tree.root();
        assert_eq!(tree.breadth_first().collect::<Vec<_>>(), [root, a, b, a1, a2]);
        assert_eq!(tree.depth_first().collect::<Vec<_>>(), [root, a, a1, a2, b]);
    }

    #[test]
    fn test_matchers() {
        let (tree, [a, b, a1, a2]) = sample();
        let is_text = |p: &Part| p.content_type().starts_with("text/");
        assert_eq!(tree.breadth_match_first(is_text), Some(a1));
        assert_eq!(tree.breadth_match_all(is_text), [a1, a2]);
        assert_eq!(
            tree.depth_match_all(|p| !p.is_container()),
            [a1, a2, b]
        );
        assert_eq!(tree.breadth_match_first(|p| p.content_type() == "audio/ogg"), None);
        assert_eq!(tree.breadth_match_all(Part::is_container), [tree.root(), a]);
    }

    #[test]
    fn test_file_name_priority() {
        let codecs = CodecRegistry::with_defaults();
        let mut headers = Headers::new();
        headers.add("Content-Disposition", "attachment; filename=\"a.txt\"");
        let ct = ContentType::parse("text/plain; name=\"b.txt\"; charset=utf-8").unwrap();
        let mut part = Part::new("text/plain", headers);
        part.resolve_metadata(Some(&ct), &codecs);
        assert_eq!(part.disposition(), "attachment");
        assert_eq!(part.file_name(), "a.txt");
        assert_eq!(part.charset(), "utf-8");
    }

    #[test]
    fn test_file_name_fallbacks() {
        let codecs = CodecRegistry::with_defaults();
        let ct = ContentType::parse(
            "application/pdf; file=c.pdf; name=\"=?utf-8?Q?r=C3=A9sum=C3=A9.pdf?=\"",
        )
        .unwrap();
        let mut part = Part::new("application/pdf", Headers::new());
        part.resolve_metadata(Some(&ct), &codecs);
        assert_eq!(part.file_name(), "résumé.pdf");
        assert_eq!(part.disposition(), "");

        let ct = ContentType::parse("application/pdf; name=\"\"; file=c.pdf").unwrap();
        part.resolve_metadata(Some(&ct), &codecs);
        assert_eq!(part.file_name(), "c.pdf");

        part.resolve_metadata(None, &codecs);
        assert_eq!(part.file_name(), "");
        assert_eq!(part.charset(), "");
    }
}
