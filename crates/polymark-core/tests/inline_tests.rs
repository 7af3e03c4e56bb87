use polymark_core::{Features, NodeId, NodeKind, ParseOptions, Tree, parse};

fn tree_with(input: &str, features: Features) -> Tree {
    let options = ParseOptions::with_features(features);
    parse(input.as_bytes(), &options).expect("parse").tree
}

/// Children of the first body block (usually a paragraph).
fn inline_of(tree: &Tree) -> Vec<NodeId> {
    let children = tree.children(tree.root());
    tree.children(children[1]).to_vec()
}

fn text_of(tree: &Tree, id: NodeId) -> String {
    let mut out = String::new();
    for n in tree.post_order(id) {
        if let NodeKind::NormalText { text } = tree.kind(n) {
            out.push_str(&String::from_utf8_lossy(text));
        }
    }
    out
}

#[test]
fn single_double_triple_emphasis() {
    let tree = tree_with("*a* **b** ***c***\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(inline.len(), 5);

    assert!(matches!(tree.kind(inline[0]), NodeKind::Emphasis));
    assert_eq!(text_of(&tree, inline[0]), "a");
    assert_eq!(
        tree.kind(inline[1]),
        &NodeKind::NormalText { text: b" ".to_vec() }
    );
    assert!(matches!(tree.kind(inline[2]), NodeKind::DoubleEmphasis));
    assert_eq!(text_of(&tree, inline[2]), "b");
    assert_eq!(
        tree.kind(inline[3]),
        &NodeKind::NormalText { text: b" ".to_vec() }
    );
    assert!(matches!(tree.kind(inline[4]), NodeKind::TripleEmphasis));
    assert_eq!(text_of(&tree, inline[4]), "c");
}

#[test]
fn underscore_emphasis_within_a_word() {
    let tree = tree_with("in*word*s\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(inline.len(), 3);
    assert!(matches!(tree.kind(inline[1]), NodeKind::Emphasis));
    assert_eq!(text_of(&tree, inline[1]), "word");
}

#[test]
fn no_intra_word_emphasis_feature() {
    let tree = tree_with("in_word_\n", Features::NOINTEM);
    for id in tree.post_order(tree.root()) {
        assert!(!matches!(tree.kind(id), NodeKind::Emphasis));
    }
    let inline = inline_of(&tree);
    let all: String = inline.iter().map(|&id| text_of(&tree, id)).collect();
    assert_eq!(all, "in_word_");
}

#[test]
fn unclosed_emphasis_stays_literal() {
    let tree = tree_with("*abc\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(inline.len(), 1);
    assert_eq!(
        tree.kind(inline[0]),
        &NodeKind::NormalText {
            text: b"*abc".to_vec()
        }
    );
}

#[test]
fn strikethrough_needs_double_tilde() {
    let tree = tree_with("~~x~~ and ~y~\n", Features::STRIKE);
    let inline = inline_of(&tree);
    assert!(matches!(tree.kind(inline[0]), NodeKind::Strikethrough));
    assert_eq!(text_of(&tree, inline[0]), "x");
    // The single-tilde pair never matches.
    for &id in &inline[1..] {
        assert!(!matches!(tree.kind(id), NodeKind::Strikethrough));
    }
}

#[test]
fn highlight_with_equals() {
    let tree = tree_with("==x==\n", Features::HILITE);
    let inline = inline_of(&tree);
    assert_eq!(inline.len(), 1);
    assert!(matches!(tree.kind(inline[0]), NodeKind::Highlight));
    assert_eq!(text_of(&tree, inline[0]), "x");
}

#[test]
fn codespan_trims_padding() {
    let tree = tree_with("a `` x `` b\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(inline.len(), 3);
    assert_eq!(
        tree.kind(inline[1]),
        &NodeKind::Codespan { text: b"x".to_vec() }
    );
}

#[test]
fn unclosed_codespan_is_literal() {
    let tree = tree_with("a `b\n", Features::empty());
    let inline = inline_of(&tree);
    let all: String = inline.iter().map(|&id| text_of(&tree, id)).collect();
    assert_eq!(all, "a `b");
}

#[test]
fn escapes_produce_plain_text() {
    let tree = tree_with("\\*not\\*\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(inline.len(), 3);
    let all: String = inline.iter().map(|&id| text_of(&tree, id)).collect();
    assert_eq!(all, "*not*");
    for &id in &inline {
        assert!(matches!(tree.kind(id), NodeKind::NormalText { .. }));
    }
}

#[test]
fn entity_node_keeps_raw_text() {
    let tree = tree_with("AT&amp;T &x\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(
        tree.kind(inline[1]),
        &NodeKind::Entity {
            text: b"&amp;".to_vec()
        }
    );
    // A bare ampersand stays literal.
    let all: String = inline.iter().map(|&id| text_of(&tree, id)).collect();
    assert_eq!(all, "ATT &x");
}

#[test]
fn hard_break_needs_two_spaces() {
    let tree = tree_with("a  \nb\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(inline.len(), 3);
    assert_eq!(
        tree.kind(inline[0]),
        &NodeKind::NormalText { text: b"a".to_vec() }
    );
    assert!(matches!(tree.kind(inline[1]), NodeKind::Linebreak));
    assert_eq!(
        tree.kind(inline[2]),
        &NodeKind::NormalText { text: b"b".to_vec() }
    );
}

#[test]
fn soft_break_is_plain_text() {
    let tree = tree_with("a\nb\n", Features::empty());
    let tree_text: String = inline_of(&tree)
        .iter()
        .map(|&id| text_of(&tree, id))
        .collect();
    assert_eq!(tree_text, "a\nb");
    for id in tree.post_order(tree.root()) {
        assert!(!matches!(tree.kind(id), NodeKind::Linebreak));
    }
}

#[test]
fn commonmark_backslash_break() {
    let tree = tree_with("a\\\nb\n", Features::COMMONMARK);
    let inline = inline_of(&tree);
    assert!(matches!(tree.kind(inline[1]), NodeKind::Linebreak));
}

#[test]
fn superscript_word_and_parenthesised() {
    let tree = tree_with("x^2 and y^(a b)\n", Features::SUPER);
    let inline = inline_of(&tree);
    assert!(matches!(tree.kind(inline[1]), NodeKind::Superscript));
    assert_eq!(text_of(&tree, inline[1]), "2");
    let last = *inline.last().unwrap();
    assert!(matches!(tree.kind(last), NodeKind::Superscript));
    assert_eq!(text_of(&tree, last), "a b");
}

#[test]
fn inline_and_display_math() {
    let tree = tree_with("$x+y$ and $$z$$\n", Features::MATH);
    let inline = inline_of(&tree);
    assert_eq!(
        tree.kind(inline[0]),
        &NodeKind::Math {
            text: b"x+y".to_vec(),
            display: false
        }
    );
    assert_eq!(
        tree.kind(inline[2]),
        &NodeKind::Math {
            text: b"z".to_vec(),
            display: true
        }
    );
}

#[test]
fn escaped_math_delimiters() {
    let tree = tree_with("\\\\(x\\\\)\n", Features::MATH);
    let inline = inline_of(&tree);
    assert_eq!(
        tree.kind(inline[0]),
        &NodeKind::Math {
            text: b"x".to_vec(),
            display: false
        }
    );
}

#[test]
fn unclosed_math_is_literal() {
    let tree = tree_with("$x\n", Features::MATH);
    let inline = inline_of(&tree);
    let all: String = inline.iter().map(|&id| text_of(&tree, id)).collect();
    assert_eq!(all, "$x");
}
