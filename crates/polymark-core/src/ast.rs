use bitflags::bitflags;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ListFlags: u32 {
        const ORDERED = 1 << 0;
        const BLOCK = 1 << 1;
        const UNORDERED = 1 << 2;
        const DEF = 1 << 3;
        /// End of the current list item run; never set on a LIST node.
        const LI_END = 1 << 4;
    }
}

impl ListFlags {
    pub const KIND_MASK: ListFlags = ListFlags::ORDERED
        .union(ListFlags::UNORDERED)
        .union(ListFlags::DEF);
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct CellFlags: u32 {
        const ALIGN_LEFT = 1 << 0;
        const ALIGN_RIGHT = 1 << 1;
        const HEADER = 1 << 2;
        const ALIGN_CENTER = Self::ALIGN_LEFT.bits() | Self::ALIGN_RIGHT.bits();
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AutolinkKind {
    None,
    Normal,
    Email,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Root,
    DocHeader,
    DocFooter,
    Meta {
        key: Vec<u8>,
    },
    NormalText {
        text: Vec<u8>,
    },
    Paragraph {
        lines: usize,
        beoln: bool,
    },
    Header {
        // 0-based: a `#` header has level 0.
        level: u8,
    },
    Hrule,
    Blockquote,
    Blockcode {
        text: Vec<u8>,
        lang: Vec<u8>,
    },
    BlockHtml {
        text: Vec<u8>,
    },
    List {
        flags: ListFlags,
        start: Vec<u8>,
    },
    ListItem {
        flags: ListFlags,
        num: usize,
    },
    Definition {
        flags: ListFlags,
    },
    DefinitionTitle,
    DefinitionData,
    Table {
        columns: usize,
    },
    TableHeader {
        columns: usize,
        flags: Vec<CellFlags>,
    },
    TableBody,
    TableRow,
    TableCell {
        flags: CellFlags,
        col: usize,
        columns: usize,
    },
    FootnotesBlock,
    FootnoteDef {
        num: usize,
    },
    FootnoteRef {
        num: usize,
    },
    Emphasis,
    DoubleEmphasis,
    TripleEmphasis,
    Strikethrough,
    Highlight,
    Superscript,
    Codespan {
        text: Vec<u8>,
    },
    Entity {
        text: Vec<u8>,
    },
    RawHtml {
        text: Vec<u8>,
    },
    Link {
        link: Vec<u8>,
        title: Vec<u8>,
    },
    LinkAuto {
        kind: AutolinkKind,
        link: Vec<u8>,
        text: Vec<u8>,
    },
    Image {
        link: Vec<u8>,
        title: Vec<u8>,
        dims: Vec<u8>,
        alt: Vec<u8>,
        attr_width: Vec<u8>,
        attr_height: Vec<u8>,
    },
    Linebreak,
    Math {
        text: Vec<u8>,
        display: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

/// Arena of document nodes. Ids are creation-ordered indices, so parent
/// lookup is O(1) and dropping the tree drops every payload buffer.
#[derive(Clone, Debug, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Allocate a node and link it as the last child of `parent`.
    pub(crate) fn alloc(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(p) = parent {
            self.nodes[p.index()].children.push(id);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].children.last().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Unlink and return the last child of `parent`, leaving the node in
    /// the arena without a parent.
    pub(crate) fn detach_last_child(&mut self, parent: NodeId) -> Option<NodeId> {
        let child = self.nodes[parent.index()].children.pop()?;
        self.nodes[child.index()].parent = None;
        Some(child)
    }

    /// Unlink `child` from `parent`'s child list, leaving it in the
    /// arena without a parent.
    pub(crate) fn detach_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.index()].children.retain(|&c| c != child);
        self.nodes[child.index()].parent = None;
    }

    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    /// Move the last child of `parent` to the head of its child list.
    pub(crate) fn promote_last_child(&mut self, parent: NodeId) {
        let children = &mut self.nodes[parent.index()].children;
        if let Some(last) = children.pop() {
            children.insert(0, last);
        }
    }

    /// Drop the newest arena node. Only valid for a node that was just
    /// detached and has no children; keeps ids contiguous.
    pub(crate) fn discard_tail(&mut self, id: NodeId) {
        debug_assert_eq!(id.index() + 1, self.nodes.len());
        debug_assert!(self.nodes[id.index()].parent.is_none());
        debug_assert!(self.nodes[id.index()].children.is_empty());
        if id.index() + 1 == self.nodes.len() {
            self.nodes.pop();
        }
    }

    /// Depth-first post-order walk from `from`: children before parents,
    /// the walk order renderers use.
    pub fn post_order(&self, from: NodeId) -> PostOrder<'_> {
        PostOrder {
            tree: self,
            stack: vec![(from, 0)],
        }
    }
}

pub struct PostOrder<'a> {
    tree: &'a Tree,
    stack: Vec<(NodeId, usize)>,
}

impl Iterator for PostOrder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        loop {
            let (id, child) = *self.stack.last()?;
            let children = self.tree.children(id);
            if child < children.len() {
                self.stack.last_mut()?.1 += 1;
                self.stack.push((children[child], 0));
            } else {
                self.stack.pop();
                return Some(id);
            }
        }
    }
}
