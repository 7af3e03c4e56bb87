//! First pass over the raw input: link references and footnote
//! definitions are collected and elided, everything else is tab-expanded
//! and newline-normalised into the staging buffer the block parser runs
//! on.

use memchr::memchr2;

use crate::config::Features;
use crate::parser::{Parser, countspaces, is_empty};

/// A collected `[id]: link "title"` reference.
pub(crate) struct LinkRef {
    pub name: Option<Vec<u8>>,
    pub link: Vec<u8>,
    pub title: Option<Vec<u8>>,
}

/// A collected `[^id]: ...` footnote definition. `num` is assigned on
/// first reference.
pub(crate) struct Footnote {
    pub name: Option<Vec<u8>>,
    pub contents: Vec<u8>,
    pub used: bool,
    pub num: usize,
}

impl Footnote {
    pub(crate) fn matches(&self, name: &[u8]) -> bool {
        match &self.name {
            None => name.is_empty(),
            Some(n) => n.as_slice() == name,
        }
    }
}

impl Parser {
    pub(crate) fn first_pass(&mut self, data: &[u8], mut beg: usize) -> Vec<u8> {
        let size = data.len();
        let mut text = Vec::with_capacity(size.saturating_sub(beg));
        let footnotes_enabled = self.features.contains(Features::FOOTNOTES);

        while beg < size {
            if footnotes_enabled && let Some(end) = self.scan_footnote(data, beg) {
                beg = end;
            } else if let Some(end) = self.scan_ref(data, beg) {
                beg = end;
            } else {
                let mut end = match memchr2(b'\n', b'\r', &data[beg..size]) {
                    Some(off) => beg + off,
                    None => size,
                };

                if end > beg {
                    expand_tabs(&mut text, &data[beg..end]);
                }

                while end < size && (data[end] == b'\n' || data[end] == b'\r') {
                    // One newline per \n, \r\n pair, or lone \r.
                    if data[end] == b'\n' || (end + 1 < size && data[end + 1] != b'\n') {
                        text.push(b'\n');
                    }
                    end += 1;
                }

                beg = end;
            }
        }

        text
    }

    /// Try a link-reference line at `beg`; on a match the reference is
    /// recorded and the consumed end offset returned.
    pub(crate) fn scan_ref(&mut self, data: &[u8], beg: usize) -> Option<usize> {
        let end = data.len();

        // Up to three optional leading spaces.
        if beg + 3 >= end {
            return None;
        }
        let mut i = countspaces(data, beg, end, 3);

        // Id part: anything but a newline between brackets.
        if data[i] != b'[' {
            return None;
        }
        i += 1;
        let id_offset = i;
        while i < end && data[i] != b'\n' && data[i] != b'\r' && data[i] != b']' {
            i += 1;
        }
        if i >= end || data[i] != b']' {
            return None;
        }
        let id_end = i;

        // Spacer: colon, spaces, at most one newline, spaces.
        i += 1;
        if i >= end || data[i] != b':' {
            return None;
        }
        i += 1;
        i = countspaces(data, i, end, 0);
        if i < end && (data[i] == b'\n' || data[i] == b'\r') {
            i += 1;
            if i < end && data[i] == b'\r' && data[i - 1] == b'\n' {
                i += 1;
            }
        }
        i = countspaces(data, i, end, 0);
        if i >= end {
            return None;
        }

        // Link: a spacing-free sequence, optionally between angle
        // brackets.
        if data[i] == b'<' {
            i += 1;
        }
        let link_offset = i;
        while i < end && data[i] != b' ' && data[i] != b'\n' && data[i] != b'\r' {
            i += 1;
        }
        let link_end = if data[i - 1] == b'>' { i - 1 } else { i };

        i = countspaces(data, i, end, 0);
        if i < end
            && data[i] != b'\n'
            && data[i] != b'\r'
            && data[i] != b'\''
            && data[i] != b'"'
            && data[i] != b'('
        {
            return None;
        }

        let mut line_end = 0;
        if i >= end || data[i] == b'\r' || data[i] == b'\n' {
            line_end = i;
        }
        if i + 1 < end && data[i] == b'\n' && data[i + 1] == b'\r' {
            line_end = i + 1;
        }
        if line_end != 0 {
            i = countspaces(data, line_end + 1, end, 0);
        }

        // Optional title, quoted, alone on its line.
        let mut title_offset = 0;
        let mut title_end = 0;
        if i + 1 < end && (data[i] == b'\'' || data[i] == b'"' || data[i] == b'(') {
            i += 1;
            title_offset = i;

            while i < end && data[i] != b'\n' && data[i] != b'\r' {
                i += 1;
            }
            title_end = if i + 1 < end && data[i] == b'\n' && data[i + 1] == b'\r' {
                i + 1
            } else {
                i
            };

            i -= 1;
            while i > title_offset && data[i] == b' ' {
                i -= 1;
            }
            if i > title_offset && (data[i] == b'\'' || data[i] == b'"' || data[i] == b')') {
                line_end = title_end;
                title_end = i;
            }
        }

        // Garbage after the link, or an empty link.
        if line_end == 0 || link_end == link_offset {
            return None;
        }

        let name = if id_end > id_offset {
            Some(data[id_offset..id_end].to_vec())
        } else {
            None
        };
        let title = if title_end > title_offset {
            Some(data[title_offset..title_end].to_vec())
        } else {
            None
        };
        self.refs.push(LinkRef {
            name,
            link: data[link_offset..link_end].to_vec(),
            title,
        });

        Some(line_end)
    }

    /// Try a footnote-definition line at `beg`; continuation lines are
    /// those indented after an optional blank line, joined with the
    /// newlines kept.
    pub(crate) fn scan_footnote(&mut self, data: &[u8], beg: usize) -> Option<usize> {
        let end = data.len();

        if beg + 3 >= end {
            return None;
        }
        let mut i = countspaces(data, beg, end, 3);

        // Id part: a caret, then anything between brackets.
        if data[i] != b'[' {
            return None;
        }
        i += 1;
        if i >= end || data[i] != b'^' {
            return None;
        }
        i += 1;
        let id_offset = i;
        while i < end && data[i] != b'\n' && data[i] != b'\r' && data[i] != b']' {
            i += 1;
        }
        if i >= end || data[i] != b']' {
            return None;
        }
        let id_end = i;

        i += 1;
        if i >= end || data[i] != b':' {
            return None;
        }
        i += 1;

        let mut contents: Vec<u8> = Vec::new();
        let mut start = i;
        let mut in_empty = false;

        // Lines accumulate like a list item's body.
        while i < end {
            while i < end && data[i] != b'\n' && data[i] != b'\r' {
                i += 1;
            }

            if is_empty(&data[start..i]) != 0 {
                in_empty = true;
                if i < end && (data[i] == b'\n' || data[i] == b'\r') {
                    i += 1;
                    if i < end && data[i] == b'\n' && data[i - 1] == b'\r' {
                        i += 1;
                    }
                }
                start = i;
                continue;
            }

            let mut ind = countspaces(data, start, end, 4) - start;

            // A single tab counts as the continuation indent, the same
            // as spaces.
            if ind == 0 && data[start] == b'\t' {
                ind = 1;
            }
            if ind == 0 {
                break;
            }

            if in_empty {
                contents.push(b'\n');
            }
            in_empty = false;

            contents.extend_from_slice(&data[start + ind..i]);

            if i < end {
                contents.push(b'\n');
                if data[i] == b'\n' || data[i] == b'\r' {
                    i += 1;
                    if i < end && data[i] == b'\n' && data[i - 1] == b'\r' {
                        i += 1;
                    }
                }
            }
            start = i;
        }

        let name = if id_end > id_offset {
            Some(data[id_offset..id_end].to_vec())
        } else {
            None
        };
        self.footnotes.push(Footnote {
            name,
            contents,
            used: false,
            num: 0,
        });

        Some(start)
    }
}

/// Expand tabs to the next multiple-of-four column. UTF-8 continuation
/// bytes do not advance the column.
fn expand_tabs(out: &mut Vec<u8>, line: &[u8]) {
    let mut i = 0;
    let mut tab = 0;

    while i < line.len() {
        let org = i;
        while i < line.len() && line[i] != b'\t' {
            if line[i] & 0xc0 != 0x80 {
                tab += 1;
            }
            i += 1;
        }

        if i > org {
            out.extend_from_slice(&line[org..i]);
        }

        if i >= line.len() {
            break;
        }

        loop {
            out.push(b' ');
            tab += 1;
            if tab % 4 == 0 {
                break;
            }
        }
        i += 1;
    }
}
