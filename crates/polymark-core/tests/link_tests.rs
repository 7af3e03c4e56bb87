use polymark_core::{AutolinkKind, Features, NodeId, NodeKind, ParseOptions, Tree, parse};

fn tree_with(input: &str, features: Features) -> Tree {
    let options = ParseOptions::with_features(features);
    parse(input.as_bytes(), &options).expect("parse").tree
}

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

fn find_kind<'t>(tree: &'t Tree, pred: fn(&NodeKind) -> bool) -> Option<NodeId> {
    tree.post_order(tree.root()).find(|&id| pred(tree.kind(id)))
}

#[test]
fn reference_collected_and_resolved() {
    let tree = tree_with("[x]: /u \"t\"\n\n[x]\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(inline.len(), 1);
    assert_eq!(
        tree.kind(inline[0]),
        &NodeKind::Link {
            link: b"/u".to_vec(),
            title: b"t".to_vec()
        }
    );
    assert_eq!(text_of(&tree, inline[0]), "x");
}

#[test]
fn reference_style_link_with_text() {
    let tree = tree_with("[key]: /dest\n\nsee [text][key]\n", Features::empty());
    let link = find_kind(&tree, |k| matches!(k, NodeKind::Link { .. })).expect("link");
    assert_eq!(
        tree.kind(link),
        &NodeKind::Link {
            link: b"/dest".to_vec(),
            title: Vec::new()
        }
    );
    assert_eq!(text_of(&tree, link), "text");
}

#[test]
fn unknown_reference_stays_literal() {
    let tree = tree_with("[nope]\n", Features::empty());
    assert!(find_kind(&tree, |k| matches!(k, NodeKind::Link { .. })).is_none());
    let inline = inline_of(&tree);
    let all: String = inline.iter().map(|&id| text_of(&tree, id)).collect();
    assert_eq!(all, "[nope]");
}

#[test]
fn inline_link_with_title_and_dims() {
    let tree = tree_with("[x](/u \"t\" =5x5)\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(inline.len(), 1);
    // Dimensions apply to images only; a link keeps href and title.
    assert_eq!(
        tree.kind(inline[0]),
        &NodeKind::Link {
            link: b"/u".to_vec(),
            title: b"t".to_vec()
        }
    );
}

#[test]
fn angle_brackets_around_destination_are_stripped() {
    let tree = tree_with("[x](</u>)\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(
        tree.kind(inline[0]),
        &NodeKind::Link {
            link: b"/u".to_vec(),
            title: Vec::new()
        }
    );
}

#[test]
fn escapes_in_destination_are_unescaped() {
    let tree = tree_with("[x](/a\\)b)\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(
        tree.kind(inline[0]),
        &NodeKind::Link {
            link: b"/a)b".to_vec(),
            title: Vec::new()
        }
    );
}

#[test]
fn image_with_title_and_dims() {
    let tree = tree_with("![alt](/img.png \"cap\" =10x20)\n", Features::empty());
    let image = find_kind(&tree, |k| matches!(k, NodeKind::Image { .. })).expect("image");
    assert_eq!(
        tree.kind(image),
        &NodeKind::Image {
            link: b"/img.png".to_vec(),
            title: b"cap".to_vec(),
            dims: b"10x20".to_vec(),
            alt: b"alt".to_vec(),
            attr_width: Vec::new(),
            attr_height: Vec::new(),
        }
    );
    // Image alt text is kept verbatim, not parsed into children.
    assert!(tree.children(image).is_empty());
}

#[test]
fn image_extended_attributes() {
    let tree = tree_with("![a](/i.png){width=50 height=60}\n", Features::IMG_EXT);
    let image = find_kind(&tree, |k| matches!(k, NodeKind::Image { .. })).expect("image");
    let NodeKind::Image {
        attr_width,
        attr_height,
        ..
    } = tree.kind(image)
    else {
        unreachable!()
    };
    assert_eq!(attr_width, b"50");
    assert_eq!(attr_height, b"60");
}

#[test]
fn angle_autolink_url_and_email() {
    let tree = tree_with("<https://x.org> <b@c.d>\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(
        tree.kind(inline[0]),
        &NodeKind::LinkAuto {
            kind: AutolinkKind::Normal,
            link: b"https://x.org".to_vec(),
            text: b"https://x.org".to_vec(),
        }
    );
    assert_eq!(
        tree.kind(inline[2]),
        &NodeKind::LinkAuto {
            kind: AutolinkKind::Email,
            link: b"b@c.d".to_vec(),
            text: b"b@c.d".to_vec(),
        }
    );
}

#[test]
fn raw_html_span() {
    let tree = tree_with("a <em>b</em>\n", Features::empty());
    let inline = inline_of(&tree);
    assert_eq!(
        tree.kind(inline[1]),
        &NodeKind::RawHtml {
            text: b"<em>".to_vec()
        }
    );
}

#[test]
fn bare_url_rewinds_the_scheme() {
    let tree = tree_with("see https://example.com/x now\n", Features::AUTOLINK);
    let inline = inline_of(&tree);
    assert_eq!(
        tree.kind(inline[0]),
        &NodeKind::NormalText {
            text: b"see ".to_vec()
        }
    );
    assert_eq!(
        tree.kind(inline[1]),
        &NodeKind::LinkAuto {
            kind: AutolinkKind::Normal,
            link: b"https://example.com/x".to_vec(),
            text: Vec::new(),
        }
    );
    assert_eq!(
        tree.kind(inline[2]),
        &NodeKind::NormalText {
            text: b" now".to_vec()
        }
    );
}

#[test]
fn bare_url_swallowing_whole_text_node() {
    // The rewind consumes the entire preceding text node; no empty
    // sibling must remain.
    let tree = tree_with("https://example.com/x\n", Features::AUTOLINK);
    let inline = inline_of(&tree);
    assert_eq!(inline.len(), 1);
    assert!(matches!(tree.kind(inline[0]), NodeKind::LinkAuto { .. }));
}

#[test]
fn bare_www_link_gets_http_prefix() {
    let tree = tree_with("go www.foo.com!\n", Features::AUTOLINK);
    let inline = inline_of(&tree);
    assert_eq!(
        tree.kind(inline[1]),
        &NodeKind::Link {
            link: b"http://www.foo.com".to_vec(),
            title: Vec::new()
        }
    );
    assert_eq!(text_of(&tree, inline[1]), "www.foo.com");
    // The delimiter run keeps the bang out of the link.
    assert_eq!(
        tree.kind(inline[2]),
        &NodeKind::NormalText { text: b"!".to_vec() }
    );
}

#[test]
fn bare_email_rewinds_local_part() {
    let tree = tree_with("mail bob@x.io\n", Features::AUTOLINK);
    let inline = inline_of(&tree);
    assert_eq!(
        tree.kind(inline[0]),
        &NodeKind::NormalText {
            text: b"mail ".to_vec()
        }
    );
    assert_eq!(
        tree.kind(inline[1]),
        &NodeKind::LinkAuto {
            kind: AutolinkKind::Email,
            link: b"bob@x.io".to_vec(),
            text: Vec::new(),
        }
    );
}

#[test]
fn autolinks_disabled_inside_link_bodies() {
    let tree = tree_with("[see https://x.org/a](/y)\n", Features::AUTOLINK);
    let link = find_kind(&tree, |k| matches!(k, NodeKind::Link { .. })).expect("link");
    assert_eq!(text_of(&tree, link), "see https://x.org/a");
    assert!(find_kind(&tree, |k| matches!(k, NodeKind::LinkAuto { .. })).is_none());
}

#[test]
fn footnote_reference_and_definition() {
    let tree = tree_with("[^a]: note\n\nsee[^a]\n", Features::FOOTNOTES);
    let root_children = tree.children(tree.root());
    assert_eq!(root_children.len(), 4);

    let fref = find_kind(&tree, |k| matches!(k, NodeKind::FootnoteRef { .. })).expect("ref");
    assert_eq!(tree.kind(fref), &NodeKind::FootnoteRef { num: 1 });

    let block = root_children[2];
    assert!(matches!(tree.kind(block), NodeKind::FootnotesBlock));
    let def = tree.children(block)[0];
    assert_eq!(tree.kind(def), &NodeKind::FootnoteDef { num: 1 });
    assert_eq!(text_of(&tree, def), "note");
}

#[test]
fn footnote_ordinals_follow_reference_order() {
    let input = "[^a]: first\n[^b]: second\n\nuse[^b] then[^a]\n";
    let tree = tree_with(input, Features::FOOTNOTES);

    let mut nums = Vec::new();
    for id in tree.post_order(tree.root()) {
        if let NodeKind::FootnoteRef { num } = tree.kind(id) {
            nums.push(*num);
        }
    }
    nums.sort_unstable();
    assert_eq!(nums, vec![1, 2]);

    // Definitions are emitted in ordinal order: "second" was used first.
    let block =
        find_kind(&tree, |k| matches!(k, NodeKind::FootnotesBlock)).expect("footnote block");
    let defs = tree.children(block);
    assert_eq!(tree.kind(defs[0]), &NodeKind::FootnoteDef { num: 1 });
    assert_eq!(text_of(&tree, defs[0]), "second");
    assert_eq!(tree.kind(defs[1]), &NodeKind::FootnoteDef { num: 2 });
    assert_eq!(text_of(&tree, defs[1]), "first");
}

#[test]
fn second_footnote_reference_is_literal() {
    let tree = tree_with("[^a]: note\n\nx[^a] y[^a]\n", Features::FOOTNOTES);
    let mut refs = 0;
    for id in tree.post_order(tree.root()) {
        if matches!(tree.kind(id), NodeKind::FootnoteRef { .. }) {
            refs += 1;
        }
    }
    assert_eq!(refs, 1);

    let inline = inline_of(&tree);
    let literal = inline
        .iter()
        .any(|&id| tree.kind(id) == &NodeKind::NormalText { text: b"[^a]".to_vec() });
    assert!(literal);
}

#[test]
fn unknown_footnote_is_literal() {
    let tree = tree_with("x[^missing]\n", Features::FOOTNOTES);
    assert!(find_kind(&tree, |k| matches!(k, NodeKind::FootnoteRef { .. })).is_none());
    let inline = inline_of(&tree);
    let all: String = inline.iter().map(|&id| text_of(&tree, id)).collect();
    assert_eq!(all, "x[^missing]");
}

#[test]
fn tab_indented_footnote_continuation() {
    let input = "[^t]:\tfirst\n\n\tmore\n\nx[^t]\n";
    let tree = tree_with(input, Features::FOOTNOTES);

    let def = find_kind(&tree, |k| matches!(k, NodeKind::FootnoteDef { .. })).expect("def");
    let paragraphs = tree.children(def);
    assert_eq!(paragraphs.len(), 2);
    assert_eq!(text_of(&tree, paragraphs[0]), "first");
    assert_eq!(text_of(&tree, paragraphs[1]), "more");
}

#[test]
fn metadata_reference_inlines_the_value() {
    let tree = tree_with("title: Wow\n\nsay [%title].\n", Features::METADATA);
    let children = tree.children(tree.root());
    let paragraph = children[1];
    let all: String = tree
        .children(paragraph)
        .iter()
        .map(|&id| text_of(&tree, id))
        .collect();
    assert_eq!(all, "say Wow.");
}

#[test]
fn unknown_metadata_reference_vanishes() {
    let tree = tree_with("title: T\n\na[%nope]b\n", Features::METADATA);
    let children = tree.children(tree.root());
    let paragraph = children[1];
    let all: String = tree
        .children(paragraph)
        .iter()
        .map(|&id| text_of(&tree, id))
        .collect();
    assert_eq!(all, "ab");
}
