use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

use polymark_core::{Features, MetaEntry, NodeId, NodeKind, ParseOptions, Tree, parse};

fn main() {
    let mut input: Option<String> = None;
    let mut options = ParseOptions::new();
    options.features = Features::TABLES
        | Features::FENCED
        | Features::FOOTNOTES
        | Features::AUTOLINK
        | Features::STRIKE
        | Features::SUPER
        | Features::MATH
        | Features::METADATA
        | Features::DEFLIST;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return;
            }
            "--commonmark" => options.features |= Features::COMMONMARK,
            "--hilite" => options.features |= Features::HILITE,
            "--img-ext" => options.features |= Features::IMG_EXT,
            "--no-intra-emphasis" => options.features |= Features::NOINTEM,
            "--no-indented-code" => options.features |= Features::NOCODEIND,
            "--no-tables" => options.features &= !Features::TABLES,
            "--no-fenced" => options.features &= !Features::FENCED,
            "--no-footnotes" => options.features &= !Features::FOOTNOTES,
            "--no-autolink" => options.features &= !Features::AUTOLINK,
            "--no-metadata" => options.features &= !Features::METADATA,
            "--maxdepth" => {
                let value = args.next().and_then(|v| v.parse().ok());
                match value {
                    Some(depth) => options.maxdepth = depth,
                    None => {
                        eprintln!("--maxdepth expects a number");
                        process::exit(2);
                    }
                }
            }
            "-m" | "-M" => {
                let Some(spec) = args.next() else {
                    eprintln!("{} expects key=value", arg);
                    process::exit(2);
                };
                let Some((key, value)) = spec.split_once('=') else {
                    eprintln!("{} expects key=value", arg);
                    process::exit(2);
                };
                let entry = MetaEntry::new(key, value);
                if arg == "-m" {
                    options.meta.push(entry);
                } else {
                    options.metaovr.push(entry);
                }
            }
            _ => {
                if input.is_none() {
                    input = Some(arg);
                } else {
                    eprintln!("unexpected argument: {}", arg);
                    print_usage();
                    process::exit(2);
                }
            }
        }
    }

    let source = match input {
        Some(path) => fs::read(&path).unwrap_or_else(|err| {
            eprintln!("failed to read {}: {}", path, err);
            process::exit(1);
        }),
        None => {
            let mut buffer = Vec::new();
            io::stdin()
                .read_to_end(&mut buffer)
                .unwrap_or_else(|err| {
                    eprintln!("failed to read stdin: {}", err);
                    process::exit(1);
                });
            buffer
        }
    };

    match parse(&source, &options) {
        Ok(result) => {
            let mut out = String::new();
            dump(&result.tree, result.tree.root(), 0, &mut out);
            print!("{}", out);
        }
        Err(err) => {
            eprintln!("parse failed: {}", err);
            process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("usage: polymark [options] [file]");
    eprintln!();
    eprintln!("  --commonmark          CommonMark-flavoured parsing");
    eprintln!("  --hilite              ==highlight== spans");
    eprintln!("  --img-ext             {{width=.. height=..}} image attributes");
    eprintln!("  --no-intra-emphasis   no emphasis within words");
    eprintln!("  --no-indented-code    disable 4-space code blocks");
    eprintln!("  --no-tables, --no-fenced, --no-footnotes,");
    eprintln!("  --no-autolink, --no-metadata");
    eprintln!("  --maxdepth <n>        parse depth limit (0 = unlimited)");
    eprintln!("  -m key=value          metadata default (document wins)");
    eprintln!("  -M key=value          metadata override (flag wins)");
    eprintln!();
    eprintln!("Reads stdin when no file is given; prints the parse tree.");
}

fn dump(tree: &Tree, id: NodeId, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(&describe(tree.kind(id)));
    out.push('\n');
    for &child in tree.children(id) {
        dump(tree, child, depth + 1, out);
    }
}

fn describe(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Root => "root".into(),
        NodeKind::DocHeader => "doc-header".into(),
        NodeKind::DocFooter => "doc-footer".into(),
        NodeKind::Meta { key } => format!("meta key={}", text(key)),
        NodeKind::NormalText { text: t } => format!("normal-text {}", text(t)),
        NodeKind::Paragraph { lines, beoln } => {
            format!("paragraph lines={} beoln={}", lines, beoln)
        }
        NodeKind::Header { level } => format!("header level={}", level),
        NodeKind::Hrule => "hrule".into(),
        NodeKind::Blockquote => "blockquote".into(),
        NodeKind::Blockcode { text: t, lang } => {
            format!("blockcode lang={} {}", text(lang), text(t))
        }
        NodeKind::BlockHtml { text: t } => format!("blockhtml {}", text(t)),
        NodeKind::List { flags, start } => {
            format!("list flags={:?} start={}", flags, text(start))
        }
        NodeKind::ListItem { flags, num } => format!("listitem flags={:?} num={}", flags, num),
        NodeKind::Definition { flags } => format!("definition flags={:?}", flags),
        NodeKind::DefinitionTitle => "definition-title".into(),
        NodeKind::DefinitionData => "definition-data".into(),
        NodeKind::Table { columns } => format!("table columns={}", columns),
        NodeKind::TableHeader { columns, .. } => format!("table-header columns={}", columns),
        NodeKind::TableBody => "table-body".into(),
        NodeKind::TableRow => "table-row".into(),
        NodeKind::TableCell { flags, col, columns } => {
            format!("table-cell col={}/{} flags={:?}", col, columns, flags)
        }
        NodeKind::FootnotesBlock => "footnotes-block".into(),
        NodeKind::FootnoteDef { num } => format!("footnote-def num={}", num),
        NodeKind::FootnoteRef { num } => format!("footnote-ref num={}", num),
        NodeKind::Emphasis => "emphasis".into(),
        NodeKind::DoubleEmphasis => "double-emphasis".into(),
        NodeKind::TripleEmphasis => "triple-emphasis".into(),
        NodeKind::Strikethrough => "strikethrough".into(),
        NodeKind::Highlight => "highlight".into(),
        NodeKind::Superscript => "superscript".into(),
        NodeKind::Codespan { text: t } => format!("codespan {}", text(t)),
        NodeKind::Entity { text: t } => format!("entity {}", text(t)),
        NodeKind::RawHtml { text: t } => format!("raw-html {}", text(t)),
        NodeKind::Link { link, title } => {
            format!("link href={} title={}", text(link), text(title))
        }
        NodeKind::LinkAuto { kind, link, .. } => {
            format!("link-auto kind={:?} href={}", kind, text(link))
        }
        NodeKind::Image { link, dims, .. } => {
            format!("image src={} dims={}", text(link), text(dims))
        }
        NodeKind::Linebreak => "linebreak".into(),
        NodeKind::Math { display, text: t } => {
            format!("math display={} {}", display, text(t))
        }
    }
}

fn text(bytes: &[u8]) -> String {
    let s = String::from_utf8_lossy(bytes);
    format!("{:?}", s)
}
