//! Bare autolink detection: URLs at `:`, addresses at `@`, hosts at `w`.
//!
//! Each detector reports the forward match length and a `rewind` count of
//! already-emitted plain-text bytes that belong to the link (the scheme
//! before `://`, the local part before `@`). The inline loop reclaims those
//! bytes from the trailing text node.

pub(crate) struct Autolink {
    pub link: Vec<u8>,
    pub len: usize,
    pub rewind: usize,
}

const SAFE_PREFIXES: [&[u8]; 6] = [b"http://", b"https://", b"ftp://", b"mailto:", b"/", b"#"];

fn is_safe(data: &[u8]) -> bool {
    SAFE_PREFIXES.iter().any(|p| data.starts_with(p))
}

/// Trim trailing punctuation and an unbalanced closing bracket from a
/// candidate link, and cut at a `<`.
fn autolink_delim(data: &[u8], mut link_end: usize) -> usize {
    for i in 0..link_end {
        if data[i] == b'<' {
            link_end = i;
            break;
        }
    }

    while link_end > 0 {
        let c = data[link_end - 1];
        if b"?!.,:".contains(&c) {
            link_end -= 1;
        } else if c == b';' {
            // An entity like "&gt;" is not part of the link.
            let mut new_end = link_end.saturating_sub(2);
            while new_end > 0 && data[new_end].is_ascii_alphabetic() {
                new_end -= 1;
            }
            if link_end >= 2 && new_end < link_end - 2 && data[new_end] == b'&' {
                link_end = new_end;
            } else {
                link_end -= 1;
            }
        } else {
            break;
        }
    }

    if link_end == 0 {
        return 0;
    }

    let cclose = data[link_end - 1];
    let copen = match cclose {
        b'"' => b'"',
        b'\'' => b'\'',
        b')' => b'(',
        b']' => b'[',
        b'}' => b'{',
        _ => 0,
    };

    if copen != 0 {
        let mut opening = 0usize;
        let mut closing = 0usize;
        for &b in &data[..link_end] {
            if b == copen {
                opening += 1;
            } else if b == cclose {
                closing += 1;
            }
        }
        if closing != opening {
            link_end -= 1;
        }
    }

    link_end
}

fn check_domain(data: &[u8], allow_short: bool) -> usize {
    if data.is_empty() || !data[0].is_ascii_alphanumeric() {
        return 0;
    }

    let mut np = 0;
    let mut i = 1;
    while i + 1 < data.len() {
        if data[i] == b'.' || data[i] == b':' {
            np += 1;
        } else if !data[i].is_ascii_alphanumeric() && data[i] != b'-' {
            break;
        }
        i += 1;
    }

    if allow_short || np > 0 { i } else { 0 }
}

/// `www.`-prefixed host starting at `data[pos]`.
pub(crate) fn www(data: &[u8], pos: usize, max_rewind: usize) -> Option<Autolink> {
    let d = &data[pos..];

    if max_rewind > 0 {
        let prev = data[pos - 1];
        if !prev.is_ascii_punctuation() && !prev.is_ascii_whitespace() {
            return None;
        }
    }

    if d.len() < 4 || &d[..4] != b"www." {
        return None;
    }

    let mut link_end = check_domain(d, false);
    if link_end == 0 {
        return None;
    }

    while link_end < d.len() && !d[link_end].is_ascii_whitespace() {
        link_end += 1;
    }

    let link_end = autolink_delim(d, link_end);
    if link_end == 0 {
        return None;
    }

    Some(Autolink {
        link: d[..link_end].to_vec(),
        len: link_end,
        rewind: 0,
    })
}

/// E-mail address around the `@` at `data[pos]`.
pub(crate) fn email(data: &[u8], pos: usize, max_rewind: usize) -> Option<Autolink> {
    let d = &data[pos..];

    let mut rewind = 0;
    while rewind < max_rewind {
        let c = data[pos - 1 - rewind];
        if c.is_ascii_alphanumeric() || b".+-_".contains(&c) {
            rewind += 1;
            continue;
        }
        break;
    }
    if rewind == 0 {
        return None;
    }

    let mut nb = 0;
    let mut np = 0;
    let mut link_end = 0;
    while link_end < d.len() {
        let c = d[link_end];
        if c.is_ascii_alphanumeric() {
            link_end += 1;
            continue;
        }
        if c == b'@' {
            nb += 1;
        } else if c == b'.' && link_end + 1 < d.len() {
            np += 1;
        } else if c != b'-' && c != b'_' {
            break;
        }
        link_end += 1;
    }

    if link_end < 2 || nb != 1 || np == 0 || !d[link_end - 1].is_ascii_alphabetic() {
        return None;
    }

    let link_end = autolink_delim(d, link_end);
    if link_end == 0 {
        return None;
    }

    let mut link = data[pos - rewind..pos].to_vec();
    link.extend_from_slice(&d[..link_end]);
    Some(Autolink {
        link,
        len: link_end,
        rewind,
    })
}

/// `scheme://host` URL around the `:` at `data[pos]`.
pub(crate) fn url(data: &[u8], pos: usize, max_rewind: usize) -> Option<Autolink> {
    let d = &data[pos..];

    if d.len() < 4 || d[1] != b'/' || d[2] != b'/' {
        return None;
    }

    let mut rewind = 0;
    while rewind < max_rewind && data[pos - 1 - rewind].is_ascii_alphabetic() {
        rewind += 1;
    }

    if !is_safe(&data[pos - rewind..]) {
        return None;
    }

    let mut link_end = 3;
    let domain_len = check_domain(&d[link_end..], false);
    if domain_len == 0 {
        return None;
    }
    link_end += domain_len;

    while link_end < d.len() && !d[link_end].is_ascii_whitespace() {
        link_end += 1;
    }

    let link_end = autolink_delim(d, link_end);
    if link_end == 0 {
        return None;
    }

    let mut link = data[pos - rewind..pos].to_vec();
    link.extend_from_slice(&d[..link_end]);
    Some(Autolink {
        link,
        len: link_end,
        rewind,
    })
}
