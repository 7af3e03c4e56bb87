use polymark_core::{Features, MetaEntry, NodeId, NodeKind, ParseOptions, Tree, parse};

fn tree_with(input: &str, features: Features) -> Tree {
    let options = ParseOptions::with_features(features);
    parse(input.as_bytes(), &options).expect("parse").tree
}

fn meta_pairs(tree: &Tree) -> Vec<(String, String)> {
    let header = tree.children(tree.root())[0];
    assert!(matches!(tree.kind(header), NodeKind::DocHeader));

    let mut pairs = Vec::new();
    for &meta in tree.children(header) {
        let NodeKind::Meta { key } = tree.kind(meta) else {
            panic!("expected a meta node");
        };
        let value = match tree.children(meta).first() {
            Some(&v) => {
                let NodeKind::NormalText { text } = tree.kind(v) else {
                    panic!("expected a meta value");
                };
                String::from_utf8_lossy(text).into_owned()
            }
            None => String::new(),
        };
        pairs.push((String::from_utf8_lossy(key).into_owned(), value));
    }
    pairs
}

fn body_text(tree: &Tree) -> String {
    let children = tree.children(tree.root());
    let mut out = String::new();
    for &block in &children[1..children.len() - 1] {
        for id in tree.post_order(block) {
            if let NodeKind::NormalText { text } = tree.kind(id) {
                out.push_str(&String::from_utf8_lossy(text));
            }
        }
    }
    out
}

fn body_of(tree: &Tree) -> Vec<NodeId> {
    let children = tree.children(tree.root());
    children[1..children.len() - 1].to_vec()
}

#[test]
fn basic_key_value_block() {
    let tree = tree_with("title: T\nauthor: A\n\nbody\n", Features::METADATA);
    assert_eq!(
        meta_pairs(&tree),
        vec![
            ("title".to_string(), "T".to_string()),
            ("author".to_string(), "A".to_string())
        ]
    );
    assert_eq!(body_text(&tree), "body");
}

#[test]
fn keys_are_normalised() {
    let tree = tree_with("My Key!: v\n\n", Features::METADATA);
    assert_eq!(meta_pairs(&tree), vec![("mykey?".to_string(), "v".to_string())]);
}

#[test]
fn title_moves_to_the_head() {
    let tree = tree_with("author: A\ntitle: T\n\n", Features::METADATA);
    let pairs = meta_pairs(&tree);
    assert_eq!(pairs[0].0, "title");
    assert_eq!(pairs[1].0, "author");
}

#[test]
fn multi_line_value_continues_on_indent() {
    let tree = tree_with("k: a\n b\nnext: x\n\n", Features::METADATA);
    let pairs = meta_pairs(&tree);
    assert_eq!(pairs[0], ("k".to_string(), "a\n b".to_string()));
    assert_eq!(pairs[1], ("next".to_string(), "x".to_string()));
}

#[test]
fn single_line_value_drops_trailing_spaces() {
    let tree = tree_with("k: v  \nnext: x\n\n", Features::METADATA);
    let pairs = meta_pairs(&tree);
    assert_eq!(pairs[0], ("k".to_string(), "v".to_string()));
}

#[test]
fn no_colon_on_first_line_means_no_metadata() {
    let tree = tree_with("hello\nworld\n", Features::METADATA);
    let header = tree.children(tree.root())[0];
    assert!(tree.children(header).is_empty());
    assert_eq!(body_text(&tree), "hello\nworld");
}

#[test]
fn metadata_needs_the_feature() {
    let tree = tree_with("title: T\n\nbody\n", Features::empty());
    let header = tree.children(tree.root())[0];
    assert!(tree.children(header).is_empty());
    // The would-be metadata is ordinary paragraph text.
    assert!(matches!(
        tree.kind(body_of(&tree)[0]),
        NodeKind::Paragraph { .. }
    ));
}

#[test]
fn defaults_are_overridden_by_the_document() {
    let mut options = ParseOptions::with_features(Features::METADATA);
    options.meta.push(MetaEntry::new("author", "X"));
    options.meta.push(MetaEntry::new("date", "D"));

    let tree = parse(b"title: T\nauthor: A\n\n", &options).expect("parse").tree;
    assert_eq!(
        meta_pairs(&tree),
        vec![
            ("title".to_string(), "T".to_string()),
            ("author".to_string(), "A".to_string()),
            ("date".to_string(), "D".to_string())
        ]
    );
}

#[test]
fn overrides_replace_document_values() {
    let mut options = ParseOptions::with_features(Features::METADATA);
    options.metaovr.push(MetaEntry::new("title", "Z"));

    let tree = parse(b"title: T\nauthor: A\n\n", &options).expect("parse").tree;
    assert_eq!(
        meta_pairs(&tree),
        vec![
            ("title".to_string(), "Z".to_string()),
            ("author".to_string(), "A".to_string())
        ]
    );
}

#[test]
fn leftover_overrides_are_appended() {
    let mut options = ParseOptions::with_features(Features::METADATA);
    options.metaovr.push(MetaEntry::new("extra", "E"));

    let tree = parse(b"title: T\n\n", &options).expect("parse").tree;
    assert_eq!(
        meta_pairs(&tree),
        vec![
            ("title".to_string(), "T".to_string()),
            ("extra".to_string(), "E".to_string())
        ]
    );
}
