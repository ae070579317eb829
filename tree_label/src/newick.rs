//! Newick trees with PAML node numbering.
//!
//! Leaves are numbered `1..=n` from left to right, internal nodes `n+1..`
//! in preorder starting at the root. These ids name the labeled tree
//! variants and match the node numbers printed by codeml.

use crate::TreeError;
use std::fmt::Write as _;
use std::path::Path;

pub type NodeIdx = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    /// Branch length as written in the input.
    pub length: Option<String>,
    pub parent: Option<NodeIdx>,
    pub children: Vec<NodeIdx>,
    /// PAML node number.
    pub node_id: usize,
    /// Branch mark token, written as ` #k`.
    pub mark: Option<u32>,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A rooted tree stored as an arena; index 0 is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn parse(text: &str) -> Result<Tree, TreeError> {
        let mut parser = Parser {
            bytes: text.as_bytes(),
            pos: 0,
            nodes: Vec::new(),
        };
        parser.skip_space();
        if parser.at_end() {
            return Err(TreeError::Empty);
        }
        parser.tree()?;
        parser.skip_space();
        if parser.peek() == Some(b';') {
            parser.pos += 1;
        }
        parser.skip_space();
        if !parser.at_end() {
            return Err(parser.error("trailing text after the tree"));
        }
        let mut tree = Tree {
            nodes: parser.nodes,
        };
        tree.assign_node_ids();
        Ok(tree)
    }

    pub fn read(path: &Path) -> Result<Tree, TreeError> {
        let text = std::fs::read_to_string(path).map_err(|source| TreeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Tree::parse(&text)
    }

    pub fn root(&self) -> NodeIdx {
        0
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.preorder().into_iter().filter(move |&i| self.nodes[i].is_leaf())
    }

    pub fn find_by_node_id(&self, node_id: usize) -> Option<NodeIdx> {
        self.nodes.iter().position(|n| n.node_id == node_id)
    }

    pub fn set_mark(&mut self, idx: NodeIdx, mark: Option<u32>) {
        self.nodes[idx].mark = mark;
    }

    pub fn clear_marks(&mut self) {
        for node in &mut self.nodes {
            node.mark = None;
        }
    }

    pub fn preorder(&self) -> Vec<NodeIdx> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.nodes[idx].children.iter().rev());
        }
        order
    }

    /// Breadth-first order from the root, children left to right.
    pub fn level_order(&self) -> Vec<NodeIdx> {
        let mut order = vec![self.root()];
        let mut next = 0;
        while next < order.len() {
            let idx = order[next];
            order.extend(self.nodes[idx].children.iter().copied());
            next += 1;
        }
        order
    }

    /// Ancestors of `idx`, nearest first, ending at the root.
    pub fn ancestors(&self, idx: NodeIdx) -> impl Iterator<Item = NodeIdx> + '_ {
        std::iter::successors(self.nodes[idx].parent, move |&i| self.nodes[i].parent)
    }

    fn assign_node_ids(&mut self) {
        let (leaves, internal): (Vec<NodeIdx>, Vec<NodeIdx>) = self
            .preorder()
            .into_iter()
            .partition(|&i| self.nodes[i].is_leaf());
        for (node_id, idx) in leaves.into_iter().chain(internal).enumerate() {
            self.nodes[idx].node_id = node_id + 1;
        }
    }

    /// Newick text including branch lengths and marks.
    pub fn to_newick(&self) -> String {
        enum Step {
            Enter(NodeIdx),
            Close(NodeIdx),
            Comma,
        }
        let mut out = String::new();
        let mut stack = vec![Step::Enter(self.root())];
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(idx) if self.nodes[idx].is_leaf() => self.write_suffix(idx, &mut out),
                Step::Enter(idx) => {
                    out.push('(');
                    stack.push(Step::Close(idx));
                    for (i, &child) in self.nodes[idx].children.iter().enumerate().rev() {
                        stack.push(Step::Enter(child));
                        if i > 0 {
                            stack.push(Step::Comma);
                        }
                    }
                }
                Step::Close(idx) => {
                    out.push(')');
                    self.write_suffix(idx, &mut out);
                }
                Step::Comma => out.push(','),
            }
        }
        out.push(';');
        out
    }

    /// Name, branch length and mark of one node.
    fn write_suffix(&self, idx: NodeIdx, out: &mut String) {
        let node = &self.nodes[idx];
        out.push_str(&node.name);
        if let Some(length) = &node.length {
            let _ = write!(out, ":{length}");
        }
        if let Some(mark) = node.mark {
            let _ = write!(out, " #{mark}");
        }
    }

    /// `(node_id, name)` of every node, ordered by node id.
    pub fn node_table(&self) -> Vec<(usize, &str)> {
        let mut table: Vec<_> = self
            .nodes
            .iter()
            .map(|n| (n.node_id, n.name.as_str()))
            .collect();
        table.sort_unstable();
        table
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    nodes: Vec<Node>,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, msg: &str) -> TreeError {
        TreeError::Parse {
            pos: self.pos,
            msg: msg.to_string(),
        }
    }

    /// Skip whitespace and `[...]` comments.
    fn skip_space(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if b == b'[' {
                while let Some(c) = self.peek() {
                    self.pos += 1;
                    if c == b']' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn new_node(&mut self, parent: Option<NodeIdx>) -> NodeIdx {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            name: String::new(),
            length: None,
            parent,
            children: Vec::new(),
            node_id: 0,
            mark: None,
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(idx);
        }
        idx
    }

    /// Read the whole tree. Open clades are kept on an explicit stack so
    /// nesting depth is bounded by memory only.
    fn tree(&mut self) -> Result<(), TreeError> {
        let mut open: Vec<NodeIdx> = Vec::new();
        let mut current = self.new_node(None);
        loop {
            self.skip_space();
            if self.peek() == Some(b'(') {
                self.pos += 1;
                open.push(current);
                current = self.new_node(Some(current));
                continue;
            }
            self.node_suffix(current)?;
            loop {
                let Some(&clade) = open.last() else {
                    return Ok(());
                };
                self.skip_space();
                match self.peek() {
                    Some(b',') => {
                        self.pos += 1;
                        current = self.new_node(Some(clade));
                        break;
                    }
                    Some(b')') => {
                        self.pos += 1;
                        open.pop();
                        self.node_suffix(clade)?;
                    }
                    _ => return Err(self.error("expected ',' or ')'")),
                }
            }
        }
    }

    /// Label, branch length and mark following a leaf or a closed clade.
    fn node_suffix(&mut self, idx: NodeIdx) -> Result<(), TreeError> {
        self.skip_space();
        self.nodes[idx].name = self.label()?;
        self.skip_space();
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_space();
            let length = self.token();
            if length.is_empty() {
                return Err(self.error("missing branch length after ':'"));
            }
            self.nodes[idx].length = Some(length);
        }
        self.skip_space();
        if matches!(self.peek(), Some(b'#' | b'$')) {
            self.pos += 1;
            let mark: u32 = self
                .token()
                .parse()
                .map_err(|_| self.error("bad branch mark"))?;
            self.nodes[idx].mark = Some(mark);
        }
        Ok(())
    }

    fn token(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b"(),:;[#$".contains(&b) || b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    /// A node label; quotes are dropped and spaces inside quotes become `_`.
    fn label(&mut self) -> Result<String, TreeError> {
        if self.peek() != Some(b'\'') {
            return Ok(self.token());
        }
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'\'' {
                let name = String::from_utf8_lossy(&self.bytes[start..self.pos]).replace(' ', "_");
                self.pos += 1;
                return Ok(name);
            }
            self.pos += 1;
        }
        Err(self.error("unterminated quoted label"))
    }
}
