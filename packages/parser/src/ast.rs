use serde::{Deserialize, Serialize};

/// Node kinds in the parsed choice tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Straight-line script content (dialogue, jumps, assignments)
    Action,

    /// A `label name:` block, or the synthetic root
    LabelBlock,

    /// An `if cond:` or `elif cond:` block
    IfBlock,

    /// Retained for trees serialized by earlier versions; the builder now
    /// appends else-arm segments to `false_branch` directly.
    ElseBlock,

    /// A `menu:` block
    MenuBlock,

    /// A quoted, colon-terminated choice inside a menu
    MenuOption,
}

/// A node in the choice tree with a stable line-range reference into the
/// source it was parsed from.
///
/// Line numbers are 0-indexed and inclusive. For every finalized node
/// `start_line <= end_line`; child ranges are disjoint, in source order, and
/// contained in the parent's range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChoiceNode>,

    /// The elif/else continuation of an `IfBlock`: a chained `elif` appears
    /// as one nested `IfBlock` entry, an `else` arm contributes its body
    /// segments directly.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub false_branch: Vec<ChoiceNode>,
}

impl ChoiceNode {
    /// Fresh node under construction. `end_line` starts one short of
    /// `start_line` so that a body which consumes no lines is detectable.
    pub fn new(id: String, kind: NodeKind, start_line: usize) -> Self {
        Self {
            id,
            kind,
            label: String::new(),
            start_line,
            end_line: start_line.saturating_sub(1),
            children: Vec::new(),
            false_branch: Vec::new(),
        }
    }

    /// Depth-first walk over the node, its children and its false branch.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ChoiceNode)) {
        visit(self);
        for child in &self.children {
            child.walk(&mut *visit);
        }
        for branch in &self.false_branch {
            branch.walk(&mut *visit);
        }
    }
}
