//! MultiMarkdown-style metadata: a leading block of `key: value` pairs
//! with multi-line continuations, ending at the first blank line.

use crate::ast::NodeKind;
use crate::config::MetaEntry;
use crate::error::ParseError;
use crate::parser::Parser;

impl Parser {
    /// Parse the metadata block in `data`. `meta` holds defaults the
    /// document overrides; `metaovr` holds overrides that replace
    /// document values. Remaining entries of both are appended after the
    /// document's own. Returns false when `data` is not metadata at all.
    pub(crate) fn parse_metadata(
        &mut self,
        data: &[u8],
        meta: &mut Vec<MetaEntry>,
        metaovr: &mut Vec<MetaEntry>,
    ) -> Result<bool, ParseError> {
        let sz = data.len();
        if sz == 0 || data[sz - 1] != b'\n' {
            return Ok(false);
        }

        // The first line must carry a colon, so that ordinary leading
        // lines are not sucked into metadata.
        let mut probe = 0;
        while probe < sz {
            if data[probe] == b'\n' || data[probe] == b':' {
                break;
            }
            probe += 1;
        }
        if probe == sz || data[probe] == b'\n' {
            return Ok(false);
        }

        let mut pos = 0;
        while pos < sz {
            let n = self.push(NodeKind::Meta { key: Vec::new() })?;

            let mut i = pos;
            while i < sz && data[i] != b':' {
                i += 1;
            }

            // Normalise the key: lowercase alphanumerics, dash, and
            // underscore; whitespace is dropped, anything else becomes a
            // question mark.
            let mut key = Vec::with_capacity(i - pos);
            for &b in &data[pos..i] {
                if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                    key.push(b.to_ascii_lowercase());
                } else if !b.is_ascii_whitespace() {
                    key.push(b'?');
                }
            }

            if let NodeKind::Meta { key: k } = &mut self.tree.node_mut(n).kind {
                *k = key.clone();
            }

            // A document key suppresses the same default.
            if let Some(p) = meta.iter().position(|m| m.key.as_bytes() == key.as_slice()) {
                meta.remove(p);
            }

            // Canonical order: title comes first.
            if key == b"title"
                && let Some(parent) = self.tree.parent(n)
            {
                self.tree.promote_last_child(parent);
            }

            let meta_index = self.metadata.len();
            self.metadata.push((key.clone(), None));

            if i == sz {
                self.pop(n);
                break;
            }

            i += 1;
            while i < sz && data[i].is_ascii_whitespace() {
                i += 1;
            }
            if i == sz {
                self.pop(n);
                break;
            }

            let valsz = parse_metadata_val(&data[i..]);

            let nn = self.push(NodeKind::NormalText { text: Vec::new() })?;
            let value = if let Some(p) = metaovr
                .iter()
                .position(|m| m.key.as_bytes() == key.as_slice())
            {
                metaovr.remove(p).value.into_bytes()
            } else {
                data[i..i + valsz].to_vec()
            };
            if let NodeKind::NormalText { text } = &mut self.tree.node_mut(nn).kind {
                *text = value.clone();
            }
            self.metadata[meta_index].1 = Some(value);
            self.pop(nn);

            self.pop(n);
            pos = i + valsz + 1;
        }

        for m in meta.drain(..).chain(metaovr.drain(..)) {
            let key = m.key.into_bytes();
            let value = m.value.into_bytes();

            let n = self.push(NodeKind::Meta { key: key.clone() })?;
            let nn = self.push(NodeKind::NormalText {
                text: value.clone(),
            })?;
            self.pop(nn);
            self.pop(n);

            self.metadata.push((key, Some(value)));
        }

        Ok(true)
    }
}

/// Length of a metadata value starting at `data[0]`. A single-line value
/// loses its trailing spaces; continuation lines are kept as-is and end
/// at a blank line or at a line whose colon has no leading whitespace.
fn parse_metadata_val(data: &[u8]) -> usize {
    let sz = data.len();

    let mut nspaces = 0;
    let mut i = 0;
    while i < sz && data[i] != b'\n' {
        if data[i] == b' ' {
            nspaces += 1;
        } else {
            nspaces = 0;
        }
        i += 1;
    }
    let mut len = i;

    let mut nlines = 0;
    let mut peek = 0;
    let mut startws = i + 1 < sz && (data[i + 1] == b' ' || data[i + 1] == b'\t');

    i += 1;
    while i < sz {
        // A colon on a line with no leading whitespace starts the next
        // key.
        if !startws && data[i] == b':' {
            break;
        }

        peek += 1;
        if data[i] != b'\n' {
            i += 1;
            continue;
        }

        nlines += 1;
        len += peek;
        peek = 0;
        startws = i + 1 < sz && (data[i + 1] == b' ' || data[i + 1] == b'\t');
        i += 1;
    }

    // Last value in the block.
    if i == sz && peek != 0 {
        len += peek + 1;
    }

    if nlines == 0 {
        len -= nspaces;
    }

    len
}
