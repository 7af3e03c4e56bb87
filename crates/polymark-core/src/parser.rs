use crate::ast::{AutolinkKind, CellFlags, ListFlags, NodeId, NodeKind, Tree};
use crate::autolink;
use crate::config::{Features, MetaEntry, ParseOptions};
use crate::error::ParseError;
use crate::prepass::{Footnote, LinkRef};

#[derive(Debug)]
pub struct ParseResult {
    pub tree: Tree,
    pub node_count: usize,
}

/// Parse `input` into a document tree. Any byte sequence yields a tree;
/// the only reportable error is exceeding the configured depth.
pub fn parse(input: &[u8], options: &ParseOptions) -> Result<ParseResult, ParseError> {
    Parser::new(options).parse_document(input)
}

/// Inline construct triggered by a byte, via the 256-entry table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Trigger {
    None,
    Emphasis,
    Codespan,
    Linebreak,
    Link,
    Image,
    Langle,
    Escape,
    Entity,
    AutolinkUrl,
    AutolinkEmail,
    AutolinkWww,
    Superscript,
    Math,
}

pub struct Parser {
    pub(crate) features: Features,
    maxdepth: usize,
    meta: Vec<MetaEntry>,
    metaovr: Vec<MetaEntry>,
    active: [Trigger; 256],
    pub(crate) tree: Tree,
    pub(crate) current: Option<NodeId>,
    depth: usize,
    pub(crate) refs: Vec<LinkRef>,
    pub(crate) footnotes: Vec<Footnote>,
    footnote_count: usize,
    /// Effective key/value pairs for `[%key]` lookups, insertion-ordered.
    pub(crate) metadata: Vec<(Vec<u8>, Option<Vec<u8>>)>,
    /// Autolinking is disabled while parsing the body of a link.
    in_link_body: bool,
}

impl Parser {
    pub fn new(options: &ParseOptions) -> Self {
        let features = options.features;
        let mut active = [Trigger::None; 256];
        active[b'*' as usize] = Trigger::Emphasis;
        active[b'_' as usize] = Trigger::Emphasis;
        if features.contains(Features::STRIKE) {
            active[b'~' as usize] = Trigger::Emphasis;
        }
        if features.contains(Features::HILITE) {
            active[b'=' as usize] = Trigger::Emphasis;
        }
        active[b'`' as usize] = Trigger::Codespan;
        active[b'\n' as usize] = Trigger::Linebreak;
        active[b'[' as usize] = Trigger::Link;
        active[b'!' as usize] = Trigger::Image;
        active[b'<' as usize] = Trigger::Langle;
        active[b'\\' as usize] = Trigger::Escape;
        active[b'&' as usize] = Trigger::Entity;
        if features.contains(Features::AUTOLINK) {
            active[b':' as usize] = Trigger::AutolinkUrl;
            active[b'@' as usize] = Trigger::AutolinkEmail;
            active[b'w' as usize] = Trigger::AutolinkWww;
        }
        if features.contains(Features::SUPER) {
            active[b'^' as usize] = Trigger::Superscript;
        }
        if features.contains(Features::MATH) {
            active[b'$' as usize] = Trigger::Math;
        }

        Self {
            features,
            maxdepth: options.maxdepth,
            meta: options.meta.clone(),
            metaovr: options.metaovr.clone(),
            active,
            tree: Tree::new(),
            current: None,
            depth: 0,
            refs: Vec::new(),
            footnotes: Vec::new(),
            footnote_count: 0,
            metadata: Vec::new(),
            in_link_body: false,
        }
    }

    /// Allocate a node of `kind` as the last child of the cursor and move
    /// the cursor onto it.
    pub(crate) fn push(&mut self, kind: NodeKind) -> Result<NodeId, ParseError> {
        if self.depth > self.maxdepth && self.maxdepth != 0 {
            return Err(ParseError::DepthExceeded(self.maxdepth));
        }
        self.depth += 1;
        let id = self.tree.alloc(kind, self.current);
        self.current = Some(id);
        Ok(id)
    }

    /// Move the cursor back to the parent of `n`. Push and pop are always
    /// balanced; `n` must be the cursor.
    pub(crate) fn pop(&mut self, n: NodeId) {
        debug_assert_eq!(self.current, Some(n));
        debug_assert!(self.depth > 0);
        self.depth -= 1;
        self.current = self.tree.parent(n);
    }

    pub fn parse_document(&mut self, input: &[u8]) -> Result<ParseResult, ParseError> {
        self.tree = Tree::new();
        self.current = None;
        self.depth = 0;
        self.in_link_body = false;
        self.refs.clear();
        self.footnotes.clear();
        self.footnote_count = 0;
        self.metadata.clear();

        let size = input.len();
        let root = self.push(NodeKind::Root)?;

        let mut beg = 0;
        if size >= 3 && input[..3] == [0xef, 0xbb, 0xbf] {
            beg += 3;
        }

        // Zeroth pass: metadata, only when the document plausibly starts
        // with a key/value block.
        let header = self.push(NodeKind::DocHeader)?;
        if self.features.contains(Features::METADATA)
            && beg + 1 < size
            && input[beg].is_ascii_alphanumeric()
        {
            let mut end = beg + 1;
            while end < size {
                if input[end] == b'\n' && input[end - 1] == b'\n' {
                    break;
                }
                end += 1;
            }
            let mut meta = std::mem::take(&mut self.meta);
            let mut metaovr = std::mem::take(&mut self.metaovr);
            let matched = self.parse_metadata(&input[beg..end], &mut meta, &mut metaovr)?;
            self.meta = meta;
            self.metaovr = metaovr;
            if matched {
                beg = end + 1;
            }
        }

        // First pass: collect references, stage everything else.
        let mut text = self.first_pass(input, beg);
        self.pop(header);

        // Second pass: the actual block parse.
        if !text.is_empty() {
            if text.last() != Some(&b'\n') {
                text.push(b'\n');
            }
            self.parse_block(&text)?;
        }

        if self.features.contains(Features::FOOTNOTES) {
            self.parse_footnote_list()?;
        }
        let footer = self.push(NodeKind::DocFooter)?;
        self.pop(footer);

        self.pop(root);
        debug_assert_eq!(self.depth, 0);
        debug_assert_eq!(self.current, None);

        self.refs.clear();
        self.footnotes.clear();
        self.metadata.clear();

        let tree = std::mem::take(&mut self.tree);
        let node_count = tree.node_count();
        Ok(ParseResult { tree, node_count })
    }

    /// Emit used footnote definitions in ordinal order.
    fn parse_footnote_list(&mut self) -> Result<(), ParseError> {
        if self.footnotes.is_empty() {
            return Ok(());
        }

        let mut defs: Vec<(usize, Vec<u8>)> = Vec::new();
        for num in 1..=self.footnote_count {
            if let Some(f) = self.footnotes.iter_mut().find(|f| f.used && f.num == num) {
                defs.push((num, std::mem::take(&mut f.contents)));
            }
        }
        if defs.is_empty() {
            return Ok(());
        }

        let n = self.push(NodeKind::FootnotesBlock)?;
        for (num, contents) in defs {
            self.parse_footnote_def(num, &contents)?;
        }
        self.pop(n);
        Ok(())
    }

    fn parse_footnote_def(&mut self, num: usize, data: &[u8]) -> Result<(), ParseError> {
        let n = self.push(NodeKind::FootnoteDef { num })?;
        self.parse_block(data)?;
        self.pop(n);
        Ok(())
    }

    /* Block-level parsing. */

    /// Parse one run of blocks; the input is newline-aligned.
    pub(crate) fn parse_block(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let size = data.len();
        let mut beg = 0;

        while beg < size {
            let txt = &data[beg..];

            if self.is_atxheader(txt) {
                beg += self.parse_atxheader(txt)?;
                continue;
            }

            if data[beg] == b'<' {
                let i = self.parse_htmlblock(txt)?;
                if i != 0 {
                    beg += i;
                    continue;
                }
            }

            let i = is_empty(txt);
            if i != 0 {
                beg += i;
                continue;
            }

            if is_hrule(txt) {
                let n = self.push(NodeKind::Hrule)?;
                while beg < size && data[beg] != b'\n' {
                    beg += 1;
                }
                beg += 1;
                self.pop(n);
                continue;
            }

            if self.features.contains(Features::FENCED) {
                let i = self.parse_fencedcode(txt)?;
                if i != 0 {
                    beg += i;
                    continue;
                }
            }

            if self.features.contains(Features::TABLES) {
                let i = self.parse_table(txt)?;
                if i != 0 {
                    beg += i;
                    continue;
                }
            }

            if prefix_quote(txt) != 0 {
                beg += self.parse_blockquote(txt)?;
                continue;
            }

            if !self.features.contains(Features::NOCODEIND) && prefix_code(txt) != 0 {
                beg += self.parse_blockcode(txt)?;
                continue;
            }

            if prefix_uli(txt) != 0 {
                beg += self.parse_list(txt, None)?;
                continue;
            }

            // A definition list only continues a one-line paragraph.
            if self.prefix_dli(txt) != 0
                && let Some(cur) = self.current
                && let Some(last) = self.tree.last_child(cur)
                && matches!(self.tree.kind(last), NodeKind::Paragraph { lines: 1, .. })
            {
                beg += self.parse_definition(txt)?;
                continue;
            }

            let mut oli_value = Vec::new();
            if self.prefix_oli(txt, Some(&mut oli_value)) != 0 {
                beg += self.parse_list(txt, Some(&oli_value))?;
                continue;
            }

            beg += self.parse_paragraph(txt)?;
        }

        Ok(())
    }

    fn is_atxheader(&self, data: &[u8]) -> bool {
        if data.is_empty() || data[0] != b'#' {
            return false;
        }

        // CommonMark requires a space after the hashes; classic Markdown
        // does not.
        if self.features.contains(Features::COMMONMARK) {
            let mut level = 0;
            while level < data.len() && level < 6 && data[level] == b'#' {
                level += 1;
            }
            if level < data.len() && data[level] != b' ' {
                return false;
            }
        }

        true
    }

    fn parse_atxheader(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let size = data.len();
        let mut level = 0;
        while level < size && level < 6 && data[level] == b'#' {
            level += 1;
        }

        let i = countspaces(data, level, size, 0);
        let mut end = i;
        while end < size && data[end] != b'\n' {
            end += 1;
        }
        let skip = end;

        while end > 0 && data[end - 1] == b'#' {
            end -= 1;
        }
        while end > 0 && data[end - 1] == b' ' {
            end -= 1;
        }

        if end > i {
            let n = self.push(NodeKind::Header {
                level: (level - 1) as u8,
            })?;
            self.parse_inline(&data[i..end])?;
            self.pop(n);
        }

        Ok(skip)
    }

    fn parse_blockquote(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let size = data.len();
        let mut work: Vec<u8> = Vec::new();
        let mut beg = 0;
        let mut end = 0;

        while beg < size {
            end = beg + 1;
            while end < size && data[end - 1] != b'\n' {
                end += 1;
            }

            let pre = prefix_quote(&data[beg..end]);

            // Skip the prefix, or stop at an empty line followed by a
            // non-quote.
            if pre != 0 {
                beg += pre;
            } else if is_empty(&data[beg..end]) != 0
                && (end >= size
                    || (prefix_quote(&data[end..]) == 0 && is_empty(&data[end..]) == 0))
            {
                break;
            }

            if beg < end {
                work.extend_from_slice(&data[beg..end]);
            }
            beg = end;
        }

        let n = self.push(NodeKind::Blockquote)?;
        self.parse_block(&work)?;
        self.pop(n);
        Ok(end)
    }

    /// A paragraph, terminated by blank lines or a stronger construct. A
    /// setext underline turns the last line into a header.
    fn parse_paragraph(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let size = data.len();
        let mut i = 0;
        let mut end = 0;
        let mut lines = 0;
        let mut level = 0;
        let mut beoln = false;

        while i < size {
            end = i + 1;
            while end < size && data[end - 1] != b'\n' {
                end += 1;
            }

            if is_empty(&data[i..]) != 0 {
                beoln = true;
                break;
            }

            level = is_headerline(&data[i..]);
            if level != 0 {
                break;
            }

            if self.is_atxheader(&data[i..])
                || is_hrule(&data[i..])
                || (lines == 1 && self.prefix_dli(&data[i..]) != 0)
                || prefix_quote(&data[i..]) != 0
            {
                end = i;
                break;
            }

            lines += 1;
            i = end;
        }

        let mut work_size = i;
        while work_size > 0 && data[work_size - 1] == b'\n' {
            work_size -= 1;
        }

        if level == 0 {
            let n = self.push(NodeKind::Paragraph { lines, beoln })?;
            self.parse_inline(&data[..work_size])?;
            self.pop(n);
            return Ok(end);
        }

        // Paragraph material prior to the header underline.
        let mut work_start = 0;
        if work_size != 0 {
            i = work_size;
            work_size -= 1;
            while work_size > 0 && data[work_size] != b'\n' {
                work_size -= 1;
            }
            let beg = work_size + 1;
            while work_size > 0 && data[work_size - 1] == b'\n' {
                work_size -= 1;
            }

            if work_size != 0 {
                let n = self.push(NodeKind::Paragraph {
                    lines: lines - 1,
                    beoln,
                })?;
                self.parse_inline(&data[..work_size])?;
                self.pop(n);
                work_start = beg;
                work_size = i - beg;
            } else {
                work_size = i;
            }
        }

        let n = self.push(NodeKind::Header {
            level: (level - 1) as u8,
        })?;
        self.parse_inline(&data[work_start..work_start + work_size])?;
        self.pop(n);
        Ok(end)
    }

    fn parse_fencedcode(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let size = data.len();
        let mut i = 0;
        while i < size && data[i] != b'\n' {
            i += 1;
        }

        let Some((_, lang, width, chr)) = parse_codefence(&data[..i]) else {
            return Ok(0);
        };

        i += 1;
        let text_start = i;
        let mut line_start;
        loop {
            line_start = i;
            if line_start >= size {
                break;
            }
            while i < size && data[i] != b'\n' {
                i += 1;
            }

            // The closing fence is the same character, at least as wide,
            // with nothing but whitespace after it.
            if let Some((w2, width2, chr2)) = is_codefence(&data[line_start..i])
                && chr2 == chr
                && width2 >= width
                && is_empty(&data[line_start + w2..i]) != 0
            {
                break;
            }

            i += 1;
        }

        let n = self.push(NodeKind::Blockcode {
            text: data[text_start..line_start.min(size)].to_vec(),
            lang: data[lang].to_vec(),
        })?;
        self.pop(n);
        Ok(i)
    }

    fn parse_blockcode(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let size = data.len();
        let mut work: Vec<u8> = Vec::new();
        let mut beg = 0;

        while beg < size {
            let mut end = beg + 1;
            while end < size && data[end - 1] != b'\n' {
                end += 1;
            }

            let pre = prefix_code(&data[beg..end]);

            if pre != 0 {
                beg += pre;
            } else if is_empty(&data[beg..end]) == 0 {
                break;
            }

            if beg < end {
                if is_empty(&data[beg..end]) != 0 {
                    work.push(b'\n');
                } else {
                    work.extend_from_slice(&data[beg..end]);
                }
            }
            beg = end;
        }

        while work.last() == Some(&b'\n') {
            work.pop();
        }
        work.push(b'\n');

        let n = self.push(NodeKind::Blockcode {
            text: work,
            lang: Vec::new(),
        })?;
        self.pop(n);
        Ok(beg)
    }

    /// One list item, initial prefix still present. `flags` accumulates
    /// block-mode and end-of-list information across items.
    fn parse_listitem(
        &mut self,
        data: &[u8],
        flags: &mut ListFlags,
        num: usize,
    ) -> Result<usize, ParseError> {
        let size = data.len();

        let orgpre = countspaces(data, 0, size, 3);

        let mut beg = prefix_uli(data);
        if beg == 0 {
            beg = self.prefix_oli(data, None);
        }
        if beg == 0 {
            beg = self.prefix_dli(data);
        }
        if beg == 0 {
            return Ok(0);
        }

        let mut end = beg;
        while end < size && data[end - 1] != b'\n' {
            end += 1;
        }

        let mut work: Vec<u8> = Vec::new();
        work.extend_from_slice(&data[beg..end]);
        beg = end;

        let mut sublist = 0;
        let mut in_empty = false;
        let mut has_inside_empty = false;
        let mut in_fence = false;
        let mut dli_lines = 1usize;

        // The "dli_lines" counter decides whether a `: ` prefix opens a
        // valid definition item here.
        while beg < size {
            end += 1;
            while end < size && data[end - 1] != b'\n' {
                end += 1;
            }

            if is_empty(&data[beg..end]) != 0 {
                in_empty = true;
                beg = end;
                dli_lines = 0;
                continue;
            }

            dli_lines += 1;

            let i = countspaces(data, beg, end, 4) - beg;
            let pre = i;

            if self.features.contains(Features::FENCED)
                && is_codefence(&data[beg + i..end]).is_some()
            {
                in_fence = !in_fence;
            }

            // New item checks are suspended inside a fence.
            let mut has_next_uli = 0;
            let mut has_next_oli = 0;
            let mut has_next_dli = 0;
            if !in_fence {
                has_next_uli = prefix_uli(&data[beg + i..end]);
                has_next_dli = if dli_lines <= 2 {
                    self.prefix_dli(&data[beg + i..end])
                } else {
                    0
                };
                has_next_oli = self.prefix_oli(&data[beg + i..end], None);
                if has_next_uli != 0 || has_next_dli != 0 || has_next_oli != 0 {
                    dli_lines = 0;
                }
            }

            if (has_next_uli != 0 && !is_hrule(&data[beg + i..end]))
                || has_next_oli != 0
                || has_next_dli != 0
            {
                if in_empty {
                    has_inside_empty = true;
                }

                // An item at the original indent either continues or, on a
                // marker-type change after a blank, ends the list.
                if pre <= orgpre {
                    let ff = *flags & ListFlags::KIND_MASK;
                    if in_empty
                        && ((ff == ListFlags::ORDERED
                            && (has_next_uli != 0 || has_next_dli != 0))
                            || (ff == ListFlags::UNORDERED
                                && (has_next_oli != 0 || has_next_dli != 0))
                            || (ff == ListFlags::DEF
                                && (has_next_oli != 0 || has_next_uli != 0)))
                    {
                        *flags |= ListFlags::LI_END;
                    }
                    break;
                }

                if sublist == 0 {
                    sublist = work.len();
                }
            } else if in_empty && pre == 0 {
                // Only indented content may continue an item after a blank
                // line.
                *flags |= ListFlags::LI_END;
                break;
            }

            if in_empty {
                work.push(b'\n');
                has_inside_empty = true;
                in_empty = false;
            }

            work.extend_from_slice(&data[beg + i..end]);
            beg = end;
        }

        if has_inside_empty {
            *flags |= ListFlags::BLOCK;
        }

        let n = self.push(NodeKind::ListItem { flags: *flags, num })?;

        if flags.contains(ListFlags::BLOCK) {
            if sublist != 0 && sublist < work.len() {
                self.parse_block(&work[..sublist])?;
                self.parse_block(&work[sublist..])?;
            } else {
                self.parse_block(&work)?;
            }
        } else if sublist != 0 && sublist < work.len() {
            self.parse_inline(&work[..sublist])?;
            self.parse_block(&work[sublist..])?;
        } else {
            self.parse_inline(&work)?;
        }

        self.pop(n);
        Ok(beg)
    }

    /// An ordered or unordered list. `oli_data` carries the numeric
    /// prefix of an ordered list's first item (possibly empty).
    fn parse_list(&mut self, data: &[u8], oli_data: Option<&[u8]>) -> Result<usize, ParseError> {
        let mut flags = if oli_data.is_some() {
            ListFlags::ORDERED
        } else {
            ListFlags::UNORDERED
        };

        let start = oli_data.unwrap_or_default().to_vec();
        let mut k: usize = std::str::from_utf8(&start)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        let n = self.push(NodeKind::List { flags, start })?;

        let mut i = 0;
        while i < data.len() {
            let j = self.parse_listitem(&data[i..], &mut flags, k)?;
            k += 1;
            i += j;
            if j == 0 || flags.contains(ListFlags::LI_END) {
                break;
            }
        }

        if flags.contains(ListFlags::BLOCK)
            && let NodeKind::List { flags: f, .. } = &mut self.tree.node_mut(n).kind
        {
            *f |= ListFlags::BLOCK;
        }

        self.pop(n);
        Ok(i)
    }

    /// A definition list: the preceding one-line paragraph becomes the
    /// title, and consecutive definitions merge into one node.
    fn parse_definition(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let Some(parent) = self.current else {
            return Ok(0);
        };
        let Some(cur) = self.tree.last_child(parent) else {
            return Ok(0);
        };

        let mut flags = ListFlags::DEF;
        if let NodeKind::Paragraph { beoln: true, .. } = self.tree.kind(cur) {
            flags |= ListFlags::BLOCK;
        }

        let children = self.tree.children(parent);
        let prev = if children.len() >= 2 {
            Some(children[children.len() - 2])
        } else {
            None
        };

        let n = if let Some(p) = prev
            && let NodeKind::Definition { flags: pf } = self.tree.kind(p)
        {
            flags |= *pf;
            self.current = Some(p);
            self.depth += 1;
            p
        } else {
            self.push(NodeKind::Definition { flags })?
        };

        self.tree.detach_child(parent, cur);
        self.tree.append_child(n, cur);
        self.tree.node_mut(cur).kind = NodeKind::DefinitionTitle;

        let mut i = 0;
        let mut k = 1;
        while i < data.len() {
            let nn = self.push(NodeKind::DefinitionData)?;
            let j = self.parse_listitem(&data[i..], &mut flags, k)?;
            k += 1;
            i += j;
            self.pop(nn);
            if j == 0 || flags.contains(ListFlags::LI_END) {
                break;
            }
        }

        if flags.contains(ListFlags::BLOCK)
            && let NodeKind::Definition { flags: f } = &mut self.tree.node_mut(n).kind
        {
            *f |= ListFlags::BLOCK;
        }

        self.pop(n);
        Ok(i)
    }

    fn parse_htmlblock(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let size = data.len();
        if size < 2 || data[0] != b'<' {
            return Ok(0);
        }

        let mut i = 1;
        while i < size && data[i] != b'>' && data[i] != b' ' {
            i += 1;
        }
        let curtag = if i < size {
            html_block_tag(&data[1..i])
        } else {
            None
        };

        let Some(curtag) = curtag else {
            // HTML comment, laxist form.
            if size > 5 && data[1] == b'!' && data[2] == b'-' && data[3] == b'-' {
                let mut i = 5;
                while i < size
                    && !(data[i - 2] == b'-' && data[i - 1] == b'-' && data[i] == b'>')
                {
                    i += 1;
                }
                i += 1;
                if i < size {
                    let j = is_empty(&data[i..]);
                    if j != 0 {
                        let end = (i + j).min(size);
                        let n = self.push(NodeKind::BlockHtml {
                            text: data[..end].to_vec(),
                        })?;
                        self.pop(n);
                        return Ok(i + j);
                    }
                }
            }

            // HR, the only self-closing block tag considered.
            if size > 4 && data[1].eq_ignore_ascii_case(&b'h') && data[2].eq_ignore_ascii_case(&b'r')
            {
                let mut i = 3;
                while i < size && data[i] != b'>' {
                    i += 1;
                }
                if i + 1 < size {
                    i += 1;
                    let j = is_empty(&data[i..]);
                    if j != 0 {
                        let end = (i + j).min(size);
                        let n = self.push(NodeKind::BlockHtml {
                            text: data[..end].to_vec(),
                        })?;
                        self.pop(n);
                        return Ok(i + j);
                    }
                }
            }

            return Ok(0);
        };

        // Strict search first; the lax indented search is not applied to
        // "ins" and "del".
        let mut tag_end = htmlblock_find_end_strict(curtag, data);
        if tag_end == 0 && curtag != b"ins" && curtag != b"del" {
            tag_end = htmlblock_find_end(curtag, data);
        }
        if tag_end == 0 {
            return Ok(0);
        }

        let n = self.push(NodeKind::BlockHtml {
            text: data[..tag_end].to_vec(),
        })?;
        self.pop(n);
        Ok(tag_end)
    }

    fn parse_table_row(
        &mut self,
        data: &[u8],
        columns: usize,
        col_data: &[CellFlags],
        header_flag: CellFlags,
    ) -> Result<(), ParseError> {
        let size = data.len();
        let mut i = 0;

        if i < size && data[i] == b'|' {
            i += 1;
        }

        let n = self.push(NodeKind::TableRow)?;

        let mut col = 0;
        while col < columns && i < size {
            while i < size && xisspace(data[i]) {
                i += 1;
            }

            let cell_start = i;
            let mut len = find_emph_char(&data[i..], b'|');

            // No further pipe: the cell runs to the end of the line. A
            // zero length with a pipe right here is an empty cell.
            if len == 0 && i < size && data[i] != b'|' {
                len = size - i;
            }
            i += len;

            let mut cell_end = i;
            while cell_end > cell_start && xisspace(data[cell_end - 1]) {
                cell_end -= 1;
            }

            let nn = self.push(NodeKind::TableCell {
                flags: col_data[col] | header_flag,
                col,
                columns,
            })?;
            self.parse_inline(&data[cell_start..cell_end])?;
            self.pop(nn);

            i += 1;
            col += 1;
        }

        while col < columns {
            let nn = self.push(NodeKind::TableCell {
                flags: col_data[col] | header_flag,
                col,
                columns,
            })?;
            self.pop(nn);
            col += 1;
        }

        self.pop(n);
        Ok(())
    }

    /// Validate and emit the table header; returns the consumed length,
    /// the open TABLE node, and the per-column alignment.
    fn parse_table_header(
        &mut self,
        data: &[u8],
    ) -> Result<Option<(usize, NodeId, usize, Vec<CellFlags>)>, ParseError> {
        let size = data.len();
        let mut i = 0;
        let mut pipes = 0i64;

        while i < size && data[i] != b'\n' {
            if data[i] == b'|' {
                pipes += 1;
            }
            i += 1;
        }

        if i == size || pipes == 0 {
            return Ok(None);
        }

        let mut header_end = i;
        while header_end > 0 && xisspace(data[header_end - 1]) {
            header_end -= 1;
        }

        if data[0] == b'|' {
            pipes -= 1;
        }
        if header_end != 0 && data[header_end - 1] == b'|' {
            pipes -= 1;
        }
        if pipes < 0 {
            return Ok(None);
        }

        let columns = pipes as usize + 1;
        let mut col_data = vec![CellFlags::empty(); columns];

        // The underline fixes the column count and alignment.
        i += 1;
        if i < size && data[i] == b'|' {
            i += 1;
        }

        let mut under_end = i;
        while under_end < size && data[under_end] != b'\n' {
            under_end += 1;
        }

        let mut col = 0;
        while col < columns && i < under_end {
            let mut dashes = 0;

            i = countspaces(data, i, under_end, 0);

            if i < under_end && data[i] == b':' {
                i += 1;
                col_data[col] |= CellFlags::ALIGN_LEFT;
                dashes += 1;
            }

            while i < under_end && data[i] == b'-' {
                i += 1;
                dashes += 1;
            }

            if i < under_end && data[i] == b':' {
                i += 1;
                col_data[col] |= CellFlags::ALIGN_RIGHT;
                dashes += 1;
            }

            i = countspaces(data, i, under_end, 0);

            if i < under_end && data[i] != b'|' && data[i] != b'+' {
                break;
            }
            if dashes < 3 {
                break;
            }

            i += 1;
            col += 1;
        }

        if col < columns {
            return Ok(None);
        }

        let table = self.push(NodeKind::Table { columns })?;
        let n = self.push(NodeKind::TableHeader {
            columns,
            flags: col_data.clone(),
        })?;
        self.parse_table_row(&data[..header_end], columns, &col_data, CellFlags::HEADER)?;
        self.pop(n);

        Ok(Some((under_end + 1, table, columns, col_data)))
    }

    fn parse_table(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let size = data.len();

        let Some((mut i, table, columns, col_data)) = self.parse_table_header(data)? else {
            return Ok(0);
        };

        let nn = self.push(NodeKind::TableBody)?;
        while i < size {
            let row_start = i;
            let mut pipes = 0;

            while i < size && data[i] != b'\n' {
                if data[i] == b'|' {
                    pipes += 1;
                }
                i += 1;
            }

            if pipes == 0 || i == size {
                i = row_start;
                break;
            }

            self.parse_table_row(&data[row_start..i], columns, &col_data, CellFlags::empty())?;
            i += 1;
        }
        self.pop(nn);
        self.pop(table);

        Ok(i)
    }

    fn prefix_dli(&self, data: &[u8]) -> usize {
        if !self.features.contains(Features::DEFLIST) {
            return 0;
        }

        let size = data.len();
        let i = countspaces(data, 0, size, 3);

        if i + 1 >= size || data[i] != b':' || data[i + 1] != b' ' {
            return 0;
        }
        if is_next_headerline(&data[i..]) {
            return 0;
        }

        i + 2
    }

    /// Ordered-list prefix. On a match with `value` given, `value`
    /// receives the numeric string in CommonMark mode and is cleared
    /// otherwise.
    fn prefix_oli(&self, data: &[u8], value: Option<&mut Vec<u8>>) -> usize {
        let size = data.len();
        let mut i = countspaces(data, 0, size, 3);

        if i >= size || !data[i].is_ascii_digit() {
            return 0;
        }

        let st = i;
        while i < size && data[i].is_ascii_digit() {
            i += 1;
        }

        // CommonMark limits the ordinal to nine digits and also accepts a
        // closing paren.
        let commonmark = self.features.contains(Features::COMMONMARK);
        let vsize = i - st;
        if commonmark && vsize > 9 {
            return 0;
        }

        if commonmark {
            if i + 1 >= size || (data[i] != b'.' && data[i] != b')') || data[i + 1] != b' ' {
                return 0;
            }
        } else if i + 1 >= size || data[i] != b'.' || data[i + 1] != b' ' {
            return 0;
        }

        if is_next_headerline(&data[i..]) {
            return 0;
        }

        if let Some(v) = value {
            v.clear();
            if commonmark {
                v.extend_from_slice(&data[st..i]);
            }
        }

        i + 2
    }

    /* Inline-level parsing. */

    /// The inline loop: copy plain text up to the next active byte, then
    /// dispatch. A handler returning zero demotes its byte to plain text.
    pub(crate) fn parse_inline(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let size = data.len();
        let mut i = 0;
        let mut end = 0;
        let mut consumed = 0;

        while i < size {
            while end < size && self.active[data[end] as usize] == Trigger::None {
                end += 1;
            }

            if end > i {
                let n = self.push(NodeKind::NormalText {
                    text: data[i..end].to_vec(),
                })?;
                self.pop(n);
            }

            if end >= size {
                break;
            }

            i = end;
            let trigger = self.active[data[i] as usize];
            end = self.dispatch(trigger, data, i, i - consumed)?;

            if end == 0 {
                end = i + 1;
                continue;
            }

            i += end;
            end = i;
            consumed = i;

            if self.features.contains(Features::IMG_EXT)
                && i < size
                && data[i] == b'{'
                && let Some(cur) = self.current
                && let Some(last) = self.tree.last_child(cur)
                && matches!(self.tree.kind(last), NodeKind::Image { .. })
            {
                let w = parse_image_attrs(&mut self.tree.node_mut(last).kind, &data[i..]);
                if w == 0 {
                    end = i + 1;
                    continue;
                }
                i += w;
                end = i;
                consumed = i;
            }
        }

        Ok(())
    }

    fn dispatch(
        &mut self,
        trigger: Trigger,
        data: &[u8],
        pos: usize,
        offset: usize,
    ) -> Result<usize, ParseError> {
        match trigger {
            Trigger::None => Ok(0),
            Trigger::Emphasis => self.char_emphasis(data, pos, offset),
            Trigger::Codespan => self.char_codespan(data, pos),
            Trigger::Linebreak => self.char_linebreak(data, pos, offset),
            Trigger::Link => self.char_link(data, pos, offset),
            Trigger::Image => self.char_image(data, pos, offset),
            Trigger::Langle => self.char_langle_tag(data, pos),
            Trigger::Escape => self.char_escape(data, pos),
            Trigger::Entity => self.char_entity(data, pos),
            Trigger::AutolinkUrl => self.char_autolink_url(data, pos, offset),
            Trigger::AutolinkEmail => self.char_autolink_email(data, pos, offset),
            Trigger::AutolinkWww => self.char_autolink_www(data, pos, offset),
            Trigger::Superscript => self.char_superscript(data, pos),
            Trigger::Math => self.char_math(data, pos),
        }
    }

    /// Reclaim `rewind` bytes from the trailing text node; an emptied
    /// node is removed rather than left as a zero-length sibling.
    fn trim_last_text(&mut self, rewind: usize) {
        if rewind == 0 {
            return;
        }
        let Some(cur) = self.current else {
            return;
        };
        let Some(last) = self.tree.last_child(cur) else {
            return;
        };
        if let NodeKind::NormalText { text } = &mut self.tree.node_mut(last).kind {
            let len = text.len().saturating_sub(rewind);
            text.truncate(len);
            if len == 0 {
                if let Some(id) = self.tree.detach_last_child(cur) {
                    self.tree.discard_tail(id);
                }
            }
        }
    }

    fn char_emphasis(
        &mut self,
        data: &[u8],
        pos: usize,
        offset: usize,
    ) -> Result<usize, ParseError> {
        let c = data[pos];
        let size = data.len() - pos;

        if self.features.contains(Features::NOINTEM) && offset > 0 {
            let prev = data[pos - 1];
            if !xisspace(prev) && prev != b'>' && prev != b'(' {
                return Ok(0);
            }
        }

        if size > 2 && data[pos + 1] != c {
            // Spacing cannot follow an opening emphasis; strikethrough
            // and highlight only take the doubled form.
            if c == b'~' || c == b'=' || xisspace(data[pos + 1]) {
                return Ok(0);
            }
            let ret = self.parse_emph1(data, pos + 1, c)?;
            return Ok(if ret == 0 { 0 } else { ret + 1 });
        }

        if size > 3 && data[pos + 1] == c && data[pos + 2] != c {
            if xisspace(data[pos + 2]) {
                return Ok(0);
            }
            let ret = self.parse_emph2(data, pos + 2, c)?;
            return Ok(if ret == 0 { 0 } else { ret + 2 });
        }

        if size > 4 && data[pos + 1] == c && data[pos + 2] == c && data[pos + 3] != c {
            if c == b'~' || c == b'=' || xisspace(data[pos + 3]) {
                return Ok(0);
            }
            let ret = self.parse_emph3(data, pos + 3, c)?;
            return Ok(if ret == 0 { 0 } else { ret + 3 });
        }

        Ok(0)
    }

    /// Single emphasis, closed by a symbol not preceded by spacing.
    fn parse_emph1(&mut self, data: &[u8], start: usize, c: u8) -> Result<usize, ParseError> {
        let span = &data[start..];
        let mut i = 0;

        // Skip one symbol when delegated from the triple parser.
        if span.len() > 1 && span[0] == c && span[1] == c {
            i = 1;
        }

        while i < span.len() {
            let len = find_emph_char(&span[i..], c);
            if len == 0 {
                return Ok(0);
            }
            i += len;
            if i >= span.len() {
                return Ok(0);
            }

            if span[i] == c && !xisspace(span[i - 1]) {
                if self.features.contains(Features::NOINTEM)
                    && i + 1 < span.len()
                    && span[i + 1].is_ascii_alphanumeric()
                {
                    continue;
                }

                let n = self.push(NodeKind::Emphasis)?;
                self.parse_inline(&span[..i])?;
                self.pop(n);
                return Ok(i + 1);
            }
        }

        Ok(0)
    }

    fn parse_emph2(&mut self, data: &[u8], start: usize, c: u8) -> Result<usize, ParseError> {
        let span = &data[start..];
        let mut i = 0;

        while i < span.len() {
            let len = find_emph_char(&span[i..], c);
            if len == 0 {
                return Ok(0);
            }
            i += len;

            if i + 1 < span.len()
                && span[i] == c
                && span[i + 1] == c
                && i != 0
                && !xisspace(span[i - 1])
            {
                let kind = if c == b'~' {
                    NodeKind::Strikethrough
                } else if c == b'=' {
                    NodeKind::Highlight
                } else {
                    NodeKind::DoubleEmphasis
                };
                let n = self.push(kind)?;
                self.parse_inline(&span[..i])?;
                self.pop(n);
                return Ok(i + 2);
            }
            i += 1;
        }

        Ok(0)
    }

    /// Triple emphasis: find the first closer, then emit directly or
    /// delegate to the single/double parsers over a widened span.
    fn parse_emph3(&mut self, data: &[u8], start: usize, c: u8) -> Result<usize, ParseError> {
        let span_len = data.len() - start;
        let mut i = 0;

        while i < span_len {
            let len = find_emph_char(&data[start + i..], c);
            if len == 0 {
                return Ok(0);
            }
            i += len;

            if data[start + i] != c || xisspace(data[start + i - 1]) {
                continue;
            }

            if i + 2 < span_len && data[start + i + 1] == c && data[start + i + 2] == c {
                let n = self.push(NodeKind::TripleEmphasis)?;
                self.parse_inline(&data[start..start + i])?;
                self.pop(n);
                return Ok(i + 3);
            } else if i + 1 < span_len && data[start + i + 1] == c {
                let len = self.parse_emph1(data, start - 2, c)?;
                return Ok(if len == 0 { 0 } else { len - 2 });
            } else {
                let len = self.parse_emph2(data, start - 1, c)?;
                return Ok(if len == 0 { 0 } else { len - 1 });
            }
        }

        Ok(0)
    }

    /// Hard break: a newline preceded by at least two spaces.
    fn char_linebreak(
        &mut self,
        data: &[u8],
        pos: usize,
        offset: usize,
    ) -> Result<usize, ParseError> {
        if offset < 2 || data[pos - 1] != b' ' || data[pos - 2] != b' ' {
            return Ok(0);
        }

        // Remove the trailing spaces from the preceding text node.
        if let Some(cur) = self.current
            && let Some(last) = self.tree.last_child(cur)
            && let NodeKind::NormalText { text } = &mut self.tree.node_mut(last).kind
        {
            while text.last() == Some(&b' ') {
                text.pop();
            }
        }

        // Swallow leading white-space of the next line.
        let mut w = 1;
        while pos + w < data.len() && data[pos + w] == b' ' {
            w += 1;
        }

        let n = self.push(NodeKind::Linebreak)?;
        self.pop(n);
        Ok(w)
    }

    fn char_codespan(&mut self, data: &[u8], pos: usize) -> Result<usize, ParseError> {
        let d = &data[pos..];
        let size = d.len();

        let mut nb = 0;
        while nb < size && d[nb] == b'`' {
            nb += 1;
        }

        // Find a closing run of the same width.
        let mut i = 0;
        let mut end = nb;
        while end < size && i < nb {
            if d[end] == b'`' {
                i += 1;
            } else {
                i = 0;
            }
            end += 1;
        }

        if i < nb && end >= size {
            return Ok(0);
        }

        let f_begin = countspaces(d, nb, end, 0);
        let mut f_end = end - nb;
        while f_end > nb && d[f_end - 1] == b' ' {
            f_end -= 1;
        }

        let text = if f_begin < f_end {
            d[f_begin..f_end].to_vec()
        } else {
            Vec::new()
        };
        let n = self.push(NodeKind::Codespan { text })?;
        self.pop(n);
        Ok(end)
    }

    fn char_escape(&mut self, data: &[u8], pos: usize) -> Result<usize, ParseError> {
        const ESCAPE_CHARS: &[u8] = b"\\`*_{}[]()#+-.!:|&<>^~=\"$";

        let d = &data[pos..];
        let size = d.len();

        if size > 1 {
            if d[1] == b'\\'
                && self.features.contains(Features::MATH)
                && size > 2
                && (d[2] == b'(' || d[2] == b'[')
            {
                let display = d[2] == b'[';
                let delim: &[u8] = if display { b"\\\\]" } else { b"\\\\)" };
                let w = self.parse_math(data, pos, delim, 3, display)?;
                if w != 0 {
                    return Ok(w);
                }
            }

            if self.features.contains(Features::COMMONMARK) && d[1] == b'\n' {
                // Backslash at line end is a CommonMark hard break.
                let mut w = 2;
                while w < size && d[w] == b' ' {
                    w += 1;
                }
                let n = self.push(NodeKind::Linebreak)?;
                self.pop(n);
                return Ok(w);
            }

            if !ESCAPE_CHARS.contains(&d[1]) {
                return Ok(0);
            }

            let n = self.push(NodeKind::NormalText {
                text: vec![d[1]],
            })?;
            self.pop(n);
        } else if size == 1 {
            let n = self.push(NodeKind::NormalText {
                text: vec![d[0]],
            })?;
            self.pop(n);
        }

        Ok(2)
    }

    /// `&` stays literal unless it opens something matching
    /// `&#?[A-Za-z0-9]+;`.
    fn char_entity(&mut self, data: &[u8], pos: usize) -> Result<usize, ParseError> {
        let d = &data[pos..];
        let mut end = 1;

        if end < d.len() && d[end] == b'#' {
            end += 1;
        }
        while end < d.len() && d[end].is_ascii_alphanumeric() {
            end += 1;
        }
        if end < d.len() && d[end] == b';' {
            end += 1;
        } else {
            return Ok(0);
        }

        let n = self.push(NodeKind::Entity {
            text: d[..end].to_vec(),
        })?;
        self.pop(n);
        Ok(end)
    }

    /// `<`: a raw HTML span or an angle-bracketed autolink.
    fn char_langle_tag(&mut self, data: &[u8], pos: usize) -> Result<usize, ParseError> {
        let d = &data[pos..];
        let (end, kind) = tag_length(d);

        if end <= 2 {
            return Ok(0);
        }

        if kind != AutolinkKind::None {
            let u_link = unescape_text(&d[1..end - 1]);
            let n = self.push(NodeKind::LinkAuto {
                kind,
                link: u_link.clone(),
                text: u_link,
            })?;
            self.pop(n);
        } else {
            let n = self.push(NodeKind::RawHtml {
                text: d[..end].to_vec(),
            })?;
            self.pop(n);
        }

        Ok(end)
    }

    fn char_autolink_www(
        &mut self,
        data: &[u8],
        pos: usize,
        offset: usize,
    ) -> Result<usize, ParseError> {
        if self.in_link_body {
            return Ok(0);
        }

        let Some(al) = autolink::www(data, pos, offset) else {
            return Ok(0);
        };

        self.trim_last_text(al.rewind);

        let mut url = b"http://".to_vec();
        url.extend_from_slice(&al.link);

        let n = self.push(NodeKind::Link {
            link: url,
            title: Vec::new(),
        })?;
        let nn = self.push(NodeKind::NormalText { text: al.link })?;
        self.pop(nn);
        self.pop(n);
        Ok(al.len)
    }

    fn char_autolink_email(
        &mut self,
        data: &[u8],
        pos: usize,
        offset: usize,
    ) -> Result<usize, ParseError> {
        if self.in_link_body {
            return Ok(0);
        }

        let Some(al) = autolink::email(data, pos, offset) else {
            return Ok(0);
        };

        self.trim_last_text(al.rewind);

        let n = self.push(NodeKind::LinkAuto {
            kind: AutolinkKind::Email,
            link: al.link,
            text: Vec::new(),
        })?;
        self.pop(n);
        Ok(al.len)
    }

    fn char_autolink_url(
        &mut self,
        data: &[u8],
        pos: usize,
        offset: usize,
    ) -> Result<usize, ParseError> {
        if self.in_link_body {
            return Ok(0);
        }

        let Some(al) = autolink::url(data, pos, offset) else {
            return Ok(0);
        };

        self.trim_last_text(al.rewind);

        let n = self.push(NodeKind::LinkAuto {
            kind: AutolinkKind::Normal,
            link: al.link,
            text: Vec::new(),
        })?;
        self.pop(n);
        Ok(al.len)
    }

    fn char_image(&mut self, data: &[u8], pos: usize, offset: usize) -> Result<usize, ParseError> {
        if data.len() - pos < 2 || data[pos + 1] != b'[' {
            return Ok(0);
        }

        let ret = self.char_link(data, pos + 1, offset + 1)?;
        Ok(if ret == 0 { 0 } else { ret + 1 })
    }

    /// `[`: a link, footnote reference, metadata reference, or (via the
    /// `!` handler) an image.
    fn char_link(&mut self, data: &[u8], pos: usize, offset: usize) -> Result<usize, ParseError> {
        let d = &data[pos..];
        let size = d.len();

        let is_img = offset > 0
            && data[pos - 1] == b'!'
            && !is_escaped(&data[pos - offset..], offset - 1);
        let is_footnote = self.features.contains(Features::FOOTNOTES) && size > 1 && d[1] == b'^';
        let is_metadata = self.features.contains(Features::METADATA) && size > 1 && d[1] == b'%';

        let mut i = 1;
        i += find_emph_char(&d[1..], b']');
        let txt_e = i;

        if i < size && d[i] == b']' {
            i += 1;
        } else {
            return Ok(0);
        }

        if is_footnote {
            if txt_e < 3 {
                return Ok(0);
            }
            let id = &d[2..txt_e];

            // Each definition supports only a single reference: later
            // references emit the literal text.
            let idx = self.footnotes.iter().position(|f| f.matches(id));
            let n = match idx {
                Some(fi) if !self.footnotes[fi].used => {
                    self.footnote_count += 1;
                    self.footnotes[fi].used = true;
                    self.footnotes[fi].num = self.footnote_count;
                    self.push(NodeKind::FootnoteRef {
                        num: self.footnote_count,
                    })?
                }
                _ => self.push(NodeKind::NormalText {
                    text: d[..txt_e + 1].to_vec(),
                })?,
            };
            self.pop(n);
            return Ok(i);
        }

        if is_metadata {
            if txt_e < 3 {
                return Ok(0);
            }
            let id = &d[2..txt_e];

            let value = self
                .metadata
                .iter()
                .find(|(k, _)| k.as_slice() == id)
                .and_then(|(_, v)| v.clone());
            if let Some(value) = value {
                let n = self.push(NodeKind::NormalText { text: value })?;
                self.pop(n);
            }
            return Ok(i);
        }

        while i < size && xisspace(d[i]) {
            i += 1;
        }

        let mut link: Option<Vec<u8>> = None;
        let mut title: Option<Vec<u8>> = None;
        let mut dims: Option<Vec<u8>> = None;

        if i < size && d[i] == b'(' {
            // Inline-style link.
            i += 1;
            while i < size && xisspace(d[i]) {
                i += 1;
            }

            let link_b = i;
            let mut nb_p = 0;

            // The link ends at a space-led quote, a `=`, or the matching
            // close paren.
            while i < size {
                if d[i] == b'\\' {
                    i += 2;
                } else if d[i] == b'(' {
                    nb_p += 1;
                    i += 1;
                } else if d[i] == b')' {
                    if nb_p == 0 {
                        break;
                    }
                    nb_p -= 1;
                    i += 1;
                } else if i >= 1
                    && xisspace(d[i - 1])
                    && (d[i] == b'\'' || d[i] == b'=' || d[i] == b'"')
                {
                    break;
                } else {
                    i += 1;
                }
            }

            if i >= size {
                return Ok(0);
            }

            let mut link_e = i;
            let mut title_b = 0;
            let mut title_e = 0;
            let mut dims_b = 0;
            let mut dims_e = 0;

            // Title and dimensions may trail in either order.
            loop {
                if d[i] == b'\'' || d[i] == b'"' {
                    let qtype = d[i];
                    let mut in_title = true;
                    i += 1;
                    title_b = i;

                    while i < size {
                        if d[i] == b'\\' {
                            i += 2;
                        } else if d[i] == qtype {
                            in_title = false;
                            i += 1;
                        } else if d[i] == b'=' && !in_title {
                            break;
                        } else if d[i] == b')' && !in_title {
                            break;
                        } else {
                            i += 1;
                        }
                    }

                    if i >= size {
                        return Ok(0);
                    }

                    let mut te = i - 1;
                    while te > title_b && xisspace(d[te]) {
                        te -= 1;
                    }

                    if d[te] != b'\'' && d[te] != b'"' {
                        title_b = 0;
                        title_e = 0;
                        link_e = i;
                    } else {
                        title_e = te;
                    }

                    if d[i] == b'=' {
                        continue;
                    }
                    break;
                } else if d[i] == b'=' {
                    i += 1;
                    dims_b = i;

                    while i < size {
                        if d[i] == b'\\' {
                            i += 2;
                        } else if d[i] == b'\'' || d[i] == b'"' || d[i] == b')' {
                            break;
                        } else {
                            i += 1;
                        }
                    }

                    if i >= size {
                        return Ok(0);
                    }

                    let mut de = i;
                    while de > dims_b && xisspace(d[de]) {
                        de -= 1;
                    }
                    dims_e = de;

                    if d[i] == b'"' || d[i] == b'\'' {
                        continue;
                    }
                    break;
                } else {
                    break;
                }
            }

            let mut link_b = link_b;
            while link_e > link_b && xisspace(d[link_e - 1]) {
                link_e -= 1;
            }

            // Remove optional angle brackets around the link.
            if link_e > link_b && d[link_b] == b'<' && d[link_e - 1] == b'>' {
                link_b += 1;
                link_e -= 1;
            }

            if link_e > link_b {
                link = Some(d[link_b..link_e].to_vec());
            }
            if title_e > title_b {
                title = Some(d[title_b..title_e].to_vec());
            }
            if dims_e > dims_b {
                dims = Some(d[dims_b..dims_e].to_vec());
            }
            i += 1;
        } else if i < size && d[i] == b'[' {
            // Reference-style link.
            i += 1;
            let link_b = i;
            while i < size && d[i] != b']' {
                i += 1;
            }
            if i >= size {
                return Ok(0);
            }
            let link_e = i;

            let id = if link_b == link_e {
                replace_spacing(&d[1..txt_e])
            } else {
                d[link_b..link_e].to_vec()
            };

            let Some(lr) = find_link_ref(&self.refs, &id) else {
                return Ok(0);
            };
            link = Some(lr.link.clone());
            title = lr.title.clone();
            i += 1;
        } else {
            // Shortcut reference: the bracketed text, spacing collapsed,
            // is the key.
            let id = replace_spacing(&d[1..txt_e]);

            let Some(lr) = find_link_ref(&self.refs, &id) else {
                return Ok(0);
            };
            link = Some(lr.link.clone());
            title = lr.title.clone();
            i = txt_e + 1;
        }

        self.finish_link(d, i, txt_e, is_img, link, title, dims)
    }

    /// Emit the LINK or IMAGE node once destination, title, and
    /// dimensions are known. Link content is parsed inline with
    /// autolinking off; image content becomes the alt text verbatim.
    #[allow(clippy::too_many_arguments)]
    fn finish_link(
        &mut self,
        d: &[u8],
        consumed: usize,
        txt_e: usize,
        is_img: bool,
        link: Option<Vec<u8>>,
        title: Option<Vec<u8>>,
        dims: Option<Vec<u8>>,
    ) -> Result<usize, ParseError> {
        let n = self.push(if is_img {
            NodeKind::Image {
                link: Vec::new(),
                title: Vec::new(),
                dims: Vec::new(),
                alt: Vec::new(),
                attr_width: Vec::new(),
                attr_height: Vec::new(),
            }
        } else {
            NodeKind::Link {
                link: Vec::new(),
                title: Vec::new(),
            }
        })?;

        let mut content: Option<Vec<u8>> = None;
        if txt_e > 1 {
            if is_img {
                content = Some(d[1..txt_e].to_vec());
            } else {
                self.in_link_body = true;
                self.parse_inline(&d[1..txt_e])?;
                self.in_link_body = false;
            }
        }

        let u_link = link.as_deref().map(unescape_text);

        match &mut self.tree.node_mut(n).kind {
            NodeKind::Image {
                link: l,
                title: t,
                dims: dm,
                alt,
                ..
            } => {
                if let Some(u) = u_link {
                    *l = u;
                }
                if let Some(tt) = title {
                    *t = tt;
                }
                if let Some(dd) = dims {
                    *dm = dd;
                }
                if let Some(c) = content {
                    *alt = c;
                }
            }
            NodeKind::Link { link: l, title: t } => {
                if let Some(u) = u_link {
                    *l = u;
                }
                if let Some(tt) = title {
                    *t = tt;
                }
            }
            _ => {}
        }

        self.pop(n);
        Ok(consumed)
    }

    fn char_superscript(&mut self, data: &[u8], pos: usize) -> Result<usize, ParseError> {
        let d = &data[pos..];
        let size = d.len();

        if size < 2 {
            return Ok(0);
        }

        let sup_start;
        let mut sup_len;
        if d[1] == b'(' {
            sup_start = 2;
            sup_len = find_emph_char(&d[2..], b')') + 2;
            if sup_len == size {
                return Ok(0);
            }
        } else {
            sup_start = 1;
            sup_len = 1;
            while sup_len < size && !xisspace(d[sup_len]) {
                sup_len += 1;
            }
        }

        if sup_len - sup_start == 0 {
            return Ok(if sup_start == 2 { 3 } else { 0 });
        }

        let n = self.push(NodeKind::Superscript)?;
        self.parse_inline(&d[sup_start..sup_len])?;
        self.pop(n);
        Ok(if sup_start == 2 { sup_len + 1 } else { sup_len })
    }

    /// A math span up to the given closing delimiter; the contents are
    /// opaque.
    fn parse_math(
        &mut self,
        data: &[u8],
        pos: usize,
        delim: &[u8],
        delimsz: usize,
        display: bool,
    ) -> Result<usize, ParseError> {
        let d = &data[pos..];
        let size = d.len();
        let mut i = delimsz;

        loop {
            while i < size && d[i] != delim[0] {
                i += 1;
            }
            if i >= size {
                return Ok(0);
            }
            if !is_escaped(d, i) && i + delimsz <= size && &d[i..i + delimsz] == delim {
                break;
            }
            i += 1;
        }

        i += delimsz;

        let n = self.push(NodeKind::Math {
            text: d[delimsz..i - delimsz].to_vec(),
            display,
        })?;
        self.pop(n);
        Ok(i)
    }

    fn char_math(&mut self, data: &[u8], pos: usize) -> Result<usize, ParseError> {
        let d = &data[pos..];
        if d.len() > 1 && d[1] == b'$' {
            self.parse_math(data, pos, b"$$", 2, true)
        } else {
            self.parse_math(data, pos, b"$", 1, false)
        }
    }
}

/* Shared byte-scanning helpers. */

pub(crate) fn xisspace(c: u8) -> bool {
    // Only the literal space and newline count; tabs and carriage
    // returns are gone after preprocessing.
    c == b' ' || c == b'\n'
}

/// Leading-space count from `offset`, bounded by `maxlen` unless zero.
pub(crate) fn countspaces(data: &[u8], offset: usize, size: usize, maxlen: usize) -> usize {
    let mut i = offset;
    while i < size {
        if maxlen > 0 && i - offset == maxlen {
            break;
        }
        if data[i] != b' ' {
            break;
        }
        i += 1;
    }
    i
}

/// The line length when the line is blank, zero otherwise.
pub(crate) fn is_empty(data: &[u8]) -> usize {
    let mut i = 0;
    while i < data.len() && data[i] != b'\n' {
        if data[i] != b' ' {
            return 0;
        }
        i += 1;
    }
    i + 1
}

fn is_hrule(data: &[u8]) -> bool {
    let size = data.len();
    if size < 3 {
        return false;
    }

    let mut i = countspaces(data, 0, size, 3);
    if i + 2 >= size || (data[i] != b'*' && data[i] != b'-' && data[i] != b'_') {
        return false;
    }
    let c = data[i];

    let mut n = 0;
    while i < size && data[i] != b'\n' {
        if data[i] == c {
            n += 1;
        } else if data[i] != b' ' {
            return false;
        }
        i += 1;
    }

    n >= 3
}

/// Setext underline level: 1 for `=`, 2 for `-`, 0 for neither.
fn is_headerline(data: &[u8]) -> usize {
    if data.is_empty() {
        return 0;
    }
    let (hchr, level) = match data[0] {
        b'=' => (b'=', 1),
        b'-' => (b'-', 2),
        _ => return 0,
    };

    let mut i = 1;
    while i < data.len() && data[i] == hchr {
        i += 1;
    }
    i = countspaces(data, i, data.len(), 0);

    if i >= data.len() || data[i] == b'\n' {
        level
    } else {
        0
    }
}

fn is_next_headerline(data: &[u8]) -> bool {
    let mut i = 0;
    while i < data.len() && data[i] != b'\n' {
        i += 1;
    }
    i += 1;
    if i >= data.len() {
        return false;
    }
    is_headerline(&data[i..]) != 0
}

fn prefix_quote(data: &[u8]) -> usize {
    let size = data.len();
    let i = countspaces(data, 0, size, 3);

    if i < size && data[i] == b'>' {
        countspaces(data, i + 1, size, 1)
    } else {
        0
    }
}

fn prefix_code(data: &[u8]) -> usize {
    if countspaces(data, 0, data.len(), 4) == 4 {
        4
    } else {
        0
    }
}

fn prefix_uli(data: &[u8]) -> usize {
    let size = data.len();
    let i = countspaces(data, 0, size, 3);

    if i + 1 >= size
        || (data[i] != b'*' && data[i] != b'+' && data[i] != b'-')
        || data[i + 1] != b' '
    {
        return 0;
    }
    if is_next_headerline(&data[i..]) {
        return 0;
    }

    i + 2
}

/// Fence-line check; returns the index after the run, the run width, and
/// the fence character.
fn is_codefence(data: &[u8]) -> Option<(usize, usize, u8)> {
    let size = data.len();
    if size < 3 {
        return None;
    }

    let mut i = countspaces(data, 0, size, 3);
    if i + 2 >= size {
        return None;
    }
    let c = data[i];
    if c != b'~' && c != b'`' {
        return None;
    }

    let mut n = 1;
    i += 1;
    while i < size && data[i] == c {
        i += 1;
        n += 1;
    }

    if n < 3 {
        return None;
    }
    Some((i, n, c))
}

/// A whole fence opening line, extracting the language word.
fn parse_codefence(data: &[u8]) -> Option<(usize, std::ops::Range<usize>, usize, u8)> {
    let size = data.len();
    let (w, width, chr) = is_codefence(data)?;

    let mut i = w;
    while i < size && xisspace(data[i]) {
        i += 1;
    }
    let lang_start = i;
    while i < size && !xisspace(data[i]) {
        i += 1;
    }
    let lang = lang_start..i;

    // Reject a codespan posing as a fence.
    let mut i = lang_start + 2;
    while i < size && !(data[i] == chr && data[i - 1] == chr && data[i - 2] == chr) {
        i += 1;
    }
    if i < size {
        return None;
    }

    Some((w, lang, width, chr))
}

/// Whether `data[loc]` is escaped by an odd number of backslashes.
fn is_escaped(data: &[u8], loc: usize) -> bool {
    let mut i = loc;
    while i >= 1 && data[i - 1] == b'\\' {
        i -= 1;
    }
    (loc - i) % 2 == 1
}

/// Next unescaped `c`, skipping codespans and bracketed links. Zero
/// means not found.
fn find_emph_char(data: &[u8], c: u8) -> usize {
    let size = data.len();
    let mut i = 0;

    while i < size {
        while i < size && data[i] != c && data[i] != b'[' && data[i] != b'`' {
            i += 1;
        }

        if i == size {
            return 0;
        }

        if is_escaped(data, i) {
            i += 1;
            continue;
        }

        if data[i] == c {
            return i;
        }

        if data[i] == b'`' {
            let mut span_nb = 0;
            let mut tmp_i = 0;

            while i < size && data[i] == b'`' {
                i += 1;
                span_nb += 1;
            }
            if i >= size {
                return 0;
            }

            let mut bt = 0;
            while i < size && bt < span_nb {
                if tmp_i == 0 && data[i] == c {
                    tmp_i = i;
                }
                if data[i] == b'`' {
                    bt += 1;
                } else {
                    bt = 0;
                }
                i += 1;
            }

            // Unterminated codespan: fall back on any emph char found
            // inside it.
            if bt < span_nb && i >= size {
                return tmp_i;
            }
        } else if data[i] == b'[' {
            let mut tmp_i = 0;

            i += 1;
            while i < size && data[i] != b']' {
                if tmp_i == 0 && data[i] == c {
                    tmp_i = i;
                }
                i += 1;
            }

            i += 1;
            while i < size && xisspace(data[i]) {
                i += 1;
            }

            if i >= size {
                return tmp_i;
            }

            let cc = match data[i] {
                b'[' => b']',
                b'(' => b')',
                _ => {
                    if tmp_i != 0 {
                        return tmp_i;
                    }
                    continue;
                }
            };

            i += 1;
            while i < size && data[i] != cc {
                if tmp_i == 0 && data[i] == c {
                    tmp_i = i;
                }
                i += 1;
            }

            if i >= size {
                return tmp_i;
            }
            i += 1;
        }
    }

    0
}

/// Address part of a mail autolink up to `>`; lax about the local part.
fn is_mail_autolink(data: &[u8]) -> usize {
    let mut nb = 0;

    for (i, &b) in data.iter().enumerate() {
        if b.is_ascii_alphanumeric() {
            continue;
        }
        match b {
            b'@' => nb += 1,
            b'-' | b'.' | b'_' => {}
            b'>' => return if nb == 1 { i + 1 } else { 0 },
            _ => return 0,
        }
    }

    0
}

/// Length of a `<...>` construct, distinguishing autolinks from tags.
fn tag_length(data: &[u8]) -> (usize, AutolinkKind) {
    let size = data.len();

    if size < 3 || data[0] != b'<' {
        return (0, AutolinkKind::None);
    }

    // HTML comment, laxist form.
    if size > 5 && data[1] == b'!' && data[2] == b'-' && data[3] == b'-' {
        let mut i = 5;
        while i < size && !(data[i - 2] == b'-' && data[i - 1] == b'-' && data[i] == b'>') {
            i += 1;
        }
        i += 1;
        if i <= size {
            return (i, AutolinkKind::None);
        }
    }

    let mut i = if data[1] == b'/' { 2 } else { 1 };
    if !data[i].is_ascii_alphanumeric() {
        return (0, AutolinkKind::None);
    }

    // Scheme test: try to find the beginning of an URI.
    let mut ltype = AutolinkKind::None;
    while i < size
        && (data[i].is_ascii_alphanumeric() || data[i] == b'.' || data[i] == b'+' || data[i] == b'-')
    {
        i += 1;
    }

    if i > 1 && i < size && data[i] == b'@' {
        let j = is_mail_autolink(&data[i..]);
        if j != 0 {
            return (i + j, AutolinkKind::Email);
        }
    }

    if i > 2 && i < size && data[i] == b':' {
        ltype = AutolinkKind::Normal;
        i += 1;
    }

    if i >= size {
        ltype = AutolinkKind::None;
    } else if ltype != AutolinkKind::None {
        // No spacing or quotes may appear in the autolink.
        let j = i;
        while i < size {
            if data[i] == b'\\' {
                i += 2;
            } else if data[i] == b'>'
                || data[i] == b'\''
                || data[i] == b'"'
                || data[i] == b' '
                || data[i] == b'\n'
            {
                break;
            } else {
                i += 1;
            }
        }

        if i >= size {
            return (0, AutolinkKind::None);
        }
        if i > j && data[i] == b'>' {
            return (i + 1, AutolinkKind::Normal);
        }

        ltype = AutolinkKind::None;
    }

    // Otherwise require something looking like a tag end.
    while i < size && data[i] != b'>' {
        i += 1;
    }
    if i >= size {
        return (0, AutolinkKind::None);
    }
    (i + 1, ltype)
}

/// Canonical block-level element for a candidate tag name; candidates
/// match by prefix, first entry wins.
fn html_block_tag(name: &[u8]) -> Option<&'static [u8]> {
    const TAGS: [&[u8]; 39] = [
        b"address",
        b"article",
        b"aside",
        b"blockquote",
        b"del",
        b"details",
        b"dialog",
        b"dd",
        b"div",
        b"dl",
        b"dt",
        b"fieldset",
        b"figcaption",
        b"figure",
        b"footer",
        b"form",
        b"h1",
        b"h2",
        b"h3",
        b"h4",
        b"h5",
        b"h6",
        b"header",
        b"hgroup",
        b"iframe",
        b"ins",
        b"li",
        b"main",
        b"math",
        b"nav",
        b"noscript",
        b"ol",
        b"p",
        b"pre",
        b"section",
        b"script",
        b"style",
        b"table",
        b"ul",
    ];

    TAGS.iter()
        .find(|t| t.len() >= name.len() && t[..name.len()].eq_ignore_ascii_case(name))
        .copied()
}

/// `</tag>` followed by a blank line (or EOF); `data` starts at `<`.
fn htmlblock_is_end(tag: &[u8], data: &[u8]) -> usize {
    let size = data.len();
    let i = tag.len() + 3;

    if i > size
        || data[1] != b'/'
        || !data[2..2 + tag.len()].eq_ignore_ascii_case(tag)
        || data[tag.len() + 2] != b'>'
    {
        return 0;
    }

    let w = if i < size { is_empty(&data[i..]) } else { 0 };
    if w == 0 && i < size {
        return 0;
    }

    i + w
}

fn htmlblock_find_end(tag: &[u8], data: &[u8]) -> usize {
    let size = data.len();
    let mut i = 0;

    loop {
        while i < size && data[i] != b'<' {
            i += 1;
        }
        if i >= size {
            return 0;
        }

        let w = htmlblock_is_end(tag, &data[i..]);
        if w != 0 {
            return i + w;
        }
        i += 1;
    }
}

/// Strict variant: the end tag must sit unindented with a blank line
/// after it.
fn htmlblock_find_end_strict(tag: &[u8], data: &[u8]) -> usize {
    let size = data.len();
    let mut i = 0;

    loop {
        let mark = i;
        while i < size && data[i] != b'\n' {
            i += 1;
        }
        if i < size {
            i += 1;
        }
        if i == mark {
            return 0;
        }

        if data[mark] == b' ' && mark > 0 {
            continue;
        }
        let end = mark + htmlblock_find_end(tag, &data[mark..i]);
        if end == i && (i >= size || is_empty(&data[i..]) != 0) {
            break;
        }
    }

    i
}

/// Replace spacing runs with single spaces, collapsing newlines into a
/// preceding space.
fn replace_spacing(data: &[u8]) -> Vec<u8> {
    let mut ob = Vec::with_capacity(data.len());
    let mut i = 0;

    loop {
        let mark = i;
        while i < data.len() && data[i] != b'\n' {
            i += 1;
        }
        ob.extend_from_slice(&data[mark..i]);

        if i >= data.len() {
            break;
        }
        if !(i > 0 && data[i - 1] == b' ') {
            ob.push(b' ');
        }
        i += 1;
    }

    ob
}

/// Strip one level of backslash escapes.
fn unescape_text(src: &[u8]) -> Vec<u8> {
    let mut ob = Vec::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        let org = i;
        while i < src.len() && src[i] != b'\\' {
            i += 1;
        }
        if i > org {
            ob.extend_from_slice(&src[org..i]);
        }
        if i + 1 >= src.len() {
            break;
        }
        ob.push(src[i + 1]);
        i += 2;
    }

    ob
}

fn find_link_ref<'a>(refs: &'a [LinkRef], name: &[u8]) -> Option<&'a LinkRef> {
    refs.iter().find(|r| match &r.name {
        None => name.is_empty(),
        Some(n) => n.as_slice() == name,
    })
}

/// `{width=... height=...}` attributes trailing an image.
fn parse_image_attrs(kind: &mut NodeKind, data: &[u8]) -> usize {
    let NodeKind::Image {
        attr_width,
        attr_height,
        ..
    } = kind
    else {
        return 0;
    };

    let size = data.len();
    debug_assert_eq!(data[0], b'{');

    let mut stack = 1;
    let mut end = 1;
    while end < size {
        if data[end] == b'{' {
            stack += 1;
        } else if data[end] == b'}' {
            stack -= 1;
            if stack == 0 {
                break;
            }
        }
        end += 1;
    }

    // Never reached the closing brace.
    if end == size {
        return 0;
    }

    let mut offs = 1;
    while offs < end {
        while offs < end && xisspace(data[offs]) {
            offs += 1;
        }
        if offs == end {
            break;
        }

        // Require a breaking equal sign.
        let key_start = offs;
        while offs < end && data[offs] != b'=' {
            offs += 1;
        }
        if offs == end {
            return 0;
        }
        let key = &data[key_start..offs];

        offs += 1;
        let val_start = offs;
        while offs < end && !xisspace(data[offs]) {
            offs += 1;
        }

        if offs > val_start {
            if key.eq_ignore_ascii_case(b"width") {
                *attr_width = data[val_start..offs].to_vec();
            } else if key.eq_ignore_ascii_case(b"height") {
                *attr_height = data[val_start..offs].to_vec();
            }
        }
    }

    end + 1
}
