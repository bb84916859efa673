//! End-to-end tests for the tree builder: label scanning, block extents,
//! branch chains, menus and the structural invariants of the produced tree.

use crate::ast::{ChoiceNode, NodeKind};
use crate::parser::{parse_file, parse_lines, parse_source};

fn parse(source: &str) -> ChoiceNode {
    parse_source(source, "test-script")
}

/// Asserts range ordering, disjointness and containment for the whole tree.
fn assert_invariants(node: &ChoiceNode) {
    assert!(
        node.start_line <= node.end_line,
        "node {:?} has inverted range {}..{}",
        node.label,
        node.start_line,
        node.end_line
    );

    let mut previous_end: Option<usize> = None;
    for child in &node.children {
        assert!(child.start_line >= node.start_line);
        assert!(child.end_line <= node.end_line);
        if let Some(previous) = previous_end {
            assert!(
                child.start_line > previous,
                "overlapping children under {:?}",
                node.label
            );
        }
        previous_end = Some(child.end_line);
        assert_invariants(child);
    }
    for branch in &node.false_branch {
        assert_invariants(branch);
    }
}

#[test]
fn test_root_has_one_label_block_per_label() {
    let source = "\
label intro:
    \"welcome\"

label middle:
    \"halfway\"

label ending:
    \"goodbye\"
";
    let tree = parse(source);

    assert_eq!(tree.kind, NodeKind::LabelBlock);
    assert_eq!(tree.label, "root");
    assert_eq!(tree.children.len(), 3);
    let names: Vec<&str> = tree.children.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(names, vec!["intro", "middle", "ending"]);
    for child in &tree.children {
        assert_eq!(child.kind, NodeKind::LabelBlock);
    }
    assert_invariants(&tree);
}

#[test]
fn test_action_spans_trailing_blank_line() {
    let source = "label start:\n    \"hi\"\n    jump x\n\nlabel x:\n    return";
    let tree = parse(source);

    assert_eq!(tree.children.len(), 2);
    assert_eq!(tree.children[0].label, "start");
    assert_eq!(tree.children[1].label, "x");

    let start = &tree.children[0];
    assert_eq!(start.children.len(), 1);
    let action = &start.children[0];
    assert_eq!(action.kind, NodeKind::Action);
    assert_eq!((action.start_line, action.end_line), (1, 3));
    assert_invariants(&tree);
}

#[test]
fn test_if_else_populates_false_branch() {
    let source = "label a:\n    if cond:\n        \"yes\"\n    else:\n        \"no\"\n    return";
    let tree = parse(source);

    let label = &tree.children[0];
    let if_block = &label.children[0];
    assert_eq!(if_block.kind, NodeKind::IfBlock);
    assert_eq!(if_block.label, "if cond");
    assert_eq!(if_block.children.len(), 1);
    assert!(if_block.children[0].label.contains("yes"));

    assert_eq!(if_block.false_branch.len(), 1);
    let alternative = &if_block.false_branch[0];
    assert_eq!(alternative.kind, NodeKind::Action);
    assert!(alternative.label.contains("no"));

    // The trailing return is its own segment after the branch.
    assert_eq!(label.children.len(), 2);
    assert!(label.children[1].label.contains("return"));
    assert_invariants(&tree);
}

#[test]
fn test_elif_chain_nests_recursively() {
    let source = "\
label a:
    if first:
        \"one\"
    elif second:
        \"two\"
    else:
        \"three\"
";
    let tree = parse(source);

    let if_block = &tree.children[0].children[0];
    assert_eq!(if_block.kind, NodeKind::IfBlock);
    assert_eq!(if_block.false_branch.len(), 1);

    let elif_block = &if_block.false_branch[0];
    assert_eq!(elif_block.kind, NodeKind::IfBlock);
    assert_eq!(elif_block.label, "elif second");
    assert!(elif_block.children[0].label.contains("two"));

    assert_eq!(elif_block.false_branch.len(), 1);
    assert!(elif_block.false_branch[0].label.contains("three"));
    assert_invariants(&tree);
}

#[test]
fn test_menu_with_two_options() {
    let source = "\
label crossroads:
    menu:
        \"Go left\":
            \"you went left\"
        \"Go right\":
            \"you went right\"
";
    let tree = parse(source);

    let menu = &tree.children[0].children[0];
    assert_eq!(menu.kind, NodeKind::MenuBlock);
    assert_eq!(menu.label, "menu");
    assert_eq!(menu.children.len(), 2);
    assert_eq!(menu.children[0].kind, NodeKind::MenuOption);
    assert_eq!(menu.children[0].label, "\"Go left\"");
    assert_eq!(menu.children[1].label, "\"Go right\"");
    assert!(menu.children[0].children[0].label.contains("went left"));
    assert_invariants(&tree);
}

#[test]
fn test_nested_if_inside_menu_option() {
    let source = "\
label shop:
    menu:
        \"Buy\":
            if coins > 10:
                \"purchased\"
            else:
                \"too poor\"
";
    let tree = parse(source);

    let option = &tree.children[0].children[0].children[0];
    assert_eq!(option.kind, NodeKind::MenuOption);
    let nested_if = &option.children[0];
    assert_eq!(nested_if.kind, NodeKind::IfBlock);
    assert_eq!(nested_if.false_branch.len(), 1);
    assert!(nested_if.false_branch[0].label.contains("too poor"));
    assert_invariants(&tree);
}

#[test]
fn test_tabs_and_spaces_compare_by_level() {
    // Same script indented with tabs instead of four-space units.
    let source = "label a:\n\tif cond:\n\t\t\"yes\"\n\telse:\n\t\t\"no\"\n\treturn";
    let tree = parse(source);

    let if_block = &tree.children[0].children[0];
    assert_eq!(if_block.kind, NodeKind::IfBlock);
    assert_eq!(if_block.false_branch.len(), 1);
    assert_invariants(&tree);
}

#[test]
fn test_line_ranges_round_trip_source_content() {
    let source = "\
label start:
    \"hello there\"
    $ coins = 0

    if coins > 5:
        \"rich\"
    else:
        \"poor\"
    jump ending

label ending:
    \"the end\"
    return
";
    let lines: Vec<String> = source.lines().map(str::to_string).collect();
    let tree = parse_lines(&lines, "round-trip");

    // Every node's range must cut the exact original lines back out.
    tree.walk(&mut |node| {
        assert!(node.end_line < lines.len());
        let segment = lines[node.start_line..=node.end_line].join("\n");
        let extracted: Vec<&str> = segment.split('\n').collect();
        assert_eq!(extracted.len(), node.end_line - node.start_line + 1);
        for (offset, line) in extracted.iter().enumerate() {
            assert_eq!(*line, lines[node.start_line + offset]);
        }
    });
    assert_invariants(&tree);
}

#[test]
fn test_content_before_first_label_is_not_a_label_block() {
    let source = "# init python\ndefine e = Character(\"Eileen\")\n\nlabel start:\n    \"hi\"";
    let tree = parse(source);

    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].label, "start");
    assert_invariants(&tree);
}

#[test]
fn test_empty_label_produces_no_children_and_terminates() {
    let source = "label a:\nlabel b:\n    \"content\"";
    let tree = parse(source);

    assert_eq!(tree.children.len(), 2);
    assert!(tree.children[0].children.is_empty());
    assert_eq!(tree.children[1].children.len(), 1);
    assert_invariants(&tree);
}

#[test]
fn test_blank_only_body_produces_no_action_node() {
    let source = "label a:\n\nlabel b:\n    return";
    let tree = parse(source);

    assert_eq!(tree.children.len(), 2);
    assert!(tree.children[0].children.is_empty());
    assert_invariants(&tree);
}

#[test]
fn test_node_ids_are_unique_and_seeded() {
    let tree = parse("label a:\n    \"x\"\n\nlabel b:\n    \"y\"");

    let mut ids = Vec::new();
    tree.walk(&mut |node| ids.push(node.id.clone()));
    let count = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), count);

    // Same source and seed give the same ids on re-parse.
    let again = parse("label a:\n    \"x\"\n\nlabel b:\n    \"y\"");
    assert_eq!(tree, again);
}

#[test]
fn test_serialized_tree_shape() {
    let tree = parse("label a:\n    \"hi\"");
    let value = serde_json::to_value(&tree).unwrap();

    assert_eq!(value["kind"], "LabelBlock");
    assert_eq!(value["label"], "root");
    assert_eq!(value["children"][0]["label"], "a");
    assert_eq!(value["children"][0]["children"][0]["kind"], "Action");
    assert_eq!(value["children"][0]["children"][0]["start_line"], 1);
}

#[test]
fn test_parse_file_missing_path_is_a_read_error() {
    let missing = std::path::Path::new("/nonexistent/script.rpy");
    let err = parse_file(missing).unwrap_err();
    assert!(err.to_string().contains("failed to read script"));
}

#[test]
fn test_parse_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.rpy");
    std::fs::write(&path, "label start:\n    \"hi\"\n").unwrap();

    let tree = parse_file(&path).unwrap();
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].label, "start");
}

#[test]
fn test_malformed_indentation_degrades_without_failure() {
    // Over-indented body and a dangling else still produce a tree.
    let source = "label odd:\n            \"deep\"\n    else:\n  \"shallow\"";
    let tree = parse(source);
    assert_eq!(tree.children.len(), 1);
    assert_invariants(&tree);
}
