//! Choice-tree construction from script source.
//!
//! Recursive descent over indentation rather than a token grammar: the
//! classifier decides what a line is, and block extent is derived purely from
//! indent levels. Every parsing function takes the current line index and
//! returns the last index it consumed, so there is no shared cursor state
//! between recursive calls.
//!
//! The parser is permissive. Malformed indentation degrades to best-effort
//! segmentation; the only fatal error is unreadable source.

use std::path::Path;

use crate::ast::{ChoiceNode, NodeKind};
use crate::classifier;
use crate::error::{ParseError, ParseResult};
use crate::id_generator::IdGenerator;
use crate::labeler;

/// Parse a script file into its choice tree.
pub fn parse_file(path: &Path) -> ParseResult<ChoiceNode> {
    let source = std::fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_source(&source, &path.to_string_lossy()))
}

/// Parse in-memory source text. `document_id` seeds the node ids so the same
/// script keeps stable ids across parses.
pub fn parse_source(source: &str, document_id: &str) -> ChoiceNode {
    let lines: Vec<String> = source.lines().map(str::to_string).collect();
    parse_lines(&lines, document_id)
}

/// Parse an already-split line sequence.
pub fn parse_lines(lines: &[String], document_id: &str) -> ChoiceNode {
    TreeBuilder::new(lines, document_id).build()
}

/// Recursive-descent builder over an immutable line array.
pub struct TreeBuilder<'a> {
    lines: &'a [String],
    ids: IdGenerator,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(lines: &'a [String], document_id: &str) -> Self {
        Self {
            lines,
            ids: IdGenerator::new(document_id),
        }
    }

    /// Builds the tree. The root is a synthetic `LabelBlock` spanning the
    /// whole file with one child per `label` statement, in source order.
    pub fn build(mut self) -> ChoiceNode {
        let mut root = self.node(NodeKind::LabelBlock, 0);
        root.label = "root".to_string();

        let mut idx = 0;
        while idx < self.lines.len() {
            if let Some(name) = classifier::is_label(&self.lines[idx]) {
                let name = name.to_string();
                let (label_node, last) = self.parse_label(idx, name);
                root.children.push(label_node);
                // Resume past everything the label consumed. An empty body
                // must still advance past the label line itself.
                idx = last.max(idx) + 1;
            } else {
                idx += 1;
            }
        }

        root.end_line = self.lines.len().saturating_sub(1);
        root
    }

    /// Parses one `label name:` block starting at `label_line`. Returns the
    /// node and the last line it consumed.
    fn parse_label(&mut self, label_line: usize, name: String) -> (ChoiceNode, usize) {
        let mut label_node = self.node(NodeKind::LabelBlock, label_line);
        label_node.label = name;

        let mut idx = label_line + 1;
        loop {
            let mut segment = self.node(NodeKind::Action, idx);
            let (more, last) = self.parse_block(idx, 1, &mut segment);
            idx = last;
            self.push_segment(&mut label_node.children, segment);
            if !more {
                break;
            }
            idx += 1;
        }

        label_node.end_line = idx.max(label_line);
        (label_node, idx)
    }

    /// Scans one same-indent segment into `node`. Returns `(true, last)` when
    /// the segment ended because a new control statement begins, and
    /// `(false, last)` when indentation dropped below `indent` or the input
    /// ran out. `last` is the final line index the segment consumed.
    fn parse_block(
        &mut self,
        mut idx: usize,
        indent: usize,
        node: &mut ChoiceNode,
    ) -> (bool, usize) {
        while idx < self.lines.len() {
            let line = &self.lines[idx];

            // Blank lines never terminate a block on their own.
            if line.trim().is_empty() {
                idx += 1;
                continue;
            }

            let current_indent = classifier::indent_level(line);
            if current_indent < indent {
                idx = idx.saturating_sub(1);
                node.end_line = idx;
                return (false, idx);
            }

            if !classifier::is_statement(line) {
                idx += 1;
                continue;
            }

            if node.start_line != idx {
                // A statement after plain content closes the current segment
                // one line early; the caller re-enters at the statement.
                idx -= 1;
                node.end_line = idx;
                return (true, idx);
            }

            if classifier::is_if_statement(line) {
                let last = self.parse_statement(idx, node, current_indent, NodeKind::IfBlock);
                return (true, last);
            }
            if classifier::is_menu_statement(line) {
                let last = self.parse_menu(idx, node, current_indent);
                return (true, last);
            }

            // A stray elif/else with no preceding if at this level folds into
            // the surrounding segment.
            idx += 1;
        }

        let last = self.lines.len().saturating_sub(1);
        node.end_line = last;
        (false, last)
    }

    /// Parses an `if`/`elif` header (or menu option header) plus its indented
    /// body, then any same-indent elif/else continuation. Returns the last
    /// line consumed; `node.end_line` covers body and continuation.
    fn parse_statement(
        &mut self,
        header: usize,
        node: &mut ChoiceNode,
        indent: usize,
        kind: NodeKind,
    ) -> usize {
        node.kind = kind;
        node.end_line = header;

        let mut idx = header + 1;
        loop {
            let mut segment = self.node(NodeKind::Action, idx);
            let (more, last) = self.parse_block(idx, indent + 1, &mut segment);
            idx = last;
            self.push_segment(&mut node.children, segment);
            if !more {
                break;
            }
            idx += 1;
        }

        idx = self.parse_alternatives(idx, node, indent);
        node.end_line = idx.max(header);
        idx
    }

    /// Consumes an elif/else continuation at the statement's own indent, if
    /// one immediately follows the body. A chained `elif` nests recursively
    /// as a single `IfBlock` entry of the false branch; an `else` appends its
    /// body segments directly.
    fn parse_alternatives(&mut self, mut idx: usize, node: &mut ChoiceNode, indent: usize) -> usize {
        while idx + 1 < self.lines.len() {
            idx += 1;
            let line = &self.lines[idx];
            if line.trim().is_empty() {
                continue;
            }
            if classifier::indent_level(line) != indent {
                return idx - 1;
            }

            if classifier::is_elif_statement(line) {
                let mut branch = self.node(NodeKind::Action, idx);
                let last = self.parse_statement(idx, &mut branch, indent, NodeKind::IfBlock);
                self.finalize(&mut branch);
                node.false_branch.push(branch);
                return last;
            }
            if classifier::is_else_statement(line) {
                return self.parse_else_body(idx, node, indent);
            }

            return idx - 1;
        }
        idx
    }

    /// An else arm has no wrapper node: its body segments land on the false
    /// branch directly.
    fn parse_else_body(&mut self, header: usize, node: &mut ChoiceNode, indent: usize) -> usize {
        let mut idx = header + 1;
        loop {
            let mut segment = self.node(NodeKind::Action, idx);
            let (more, last) = self.parse_block(idx, indent + 1, &mut segment);
            idx = last;
            self.push_segment(&mut node.false_branch, segment);
            if !more {
                break;
            }
            idx += 1;
        }
        idx.max(header)
    }

    /// Parses a `menu:` block. Deeper lines that are quoted strings ending in
    /// `:` open `MenuOption` nodes whose bodies parse like an if branch; the
    /// menu ends when indentation returns to its own level or less.
    fn parse_menu(&mut self, header: usize, node: &mut ChoiceNode, indent: usize) -> usize {
        node.kind = NodeKind::MenuBlock;
        node.end_line = header;

        let mut idx = header + 1;
        while idx < self.lines.len() {
            let line = &self.lines[idx];
            if line.trim().is_empty() {
                idx += 1;
                continue;
            }

            let current_indent = classifier::indent_level(line);
            if current_indent <= indent {
                idx -= 1;
                node.end_line = idx.max(header);
                return idx;
            }

            let trimmed = line.trim();
            if trimmed.starts_with('"') && trimmed.ends_with(':') {
                let mut option = self.node(NodeKind::MenuOption, idx);
                option.label = trimmed[..trimmed.len() - 1].trim().to_string();
                let last = self.parse_statement(idx, &mut option, current_indent, NodeKind::MenuOption);
                node.children.push(option);
                idx = last.max(idx) + 1;
            } else {
                idx += 1;
            }
        }

        let last = self.lines.len().saturating_sub(1);
        node.end_line = last.max(header);
        last
    }

    /// Keeps a finished segment if it covered any lines and has actual
    /// content; empty bodies produce no node.
    fn push_segment(&mut self, target: &mut Vec<ChoiceNode>, mut segment: ChoiceNode) {
        if segment.end_line < segment.start_line {
            return;
        }
        if segment.kind == NodeKind::Action && !self.has_content(segment.start_line, segment.end_line)
        {
            return;
        }
        self.finalize(&mut segment);
        target.push(segment);
    }

    fn has_content(&self, start_line: usize, end_line: usize) -> bool {
        self.lines[start_line..=end_line.min(self.lines.len() - 1)]
            .iter()
            .any(|line| !line.trim().is_empty())
    }

    fn finalize(&mut self, node: &mut ChoiceNode) {
        if node.label.is_empty() {
            node.label = labeler::synthesize(self.lines, node.kind, node.start_line, node.end_line);
        }
    }

    fn node(&mut self, kind: NodeKind, start_line: usize) -> ChoiceNode {
        ChoiceNode::new(self.ids.new_id(), kind, start_line)
    }
}
