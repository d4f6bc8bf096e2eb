//! Path decoding for `diff --git`, `---` and `+++` lines.

const DEV_NULL: &str = "/dev/null";
pub(super) const OLD_PREFIX: &str = "a/";
pub(super) const NEW_PREFIX: &str = "b/";

/// Splits the remainder of a `diff --git ` line into old and new paths.
///
/// Unquoted paths containing spaces are ambiguous; the symmetric
/// `a/<p> b/<p>` form is tried first, then the first ` b/` separator.
pub(super) fn parse_header_paths(rest: &str) -> (Option<String>, Option<String>) {
    let (old, new) = if rest.starts_with('"') {
        match split_quoted(rest) {
            Some((old, tail)) => (old, unquote(tail.trim_start())),
            None => return (None, None),
        }
    } else if let Some(idx) = rest.rfind(" \"") {
        (rest[..idx].to_string(), unquote(&rest[idx + 1..]))
    } else if let Some(name) = symmetric_name(rest) {
        (format!("{OLD_PREFIX}{name}"), format!("{NEW_PREFIX}{name}"))
    } else if let Some(idx) = rest.find(" b/") {
        (rest[..idx].to_string(), rest[idx + 1..].to_string())
    } else {
        return (None, None);
    };

    (Some(strip_prefix(&old, OLD_PREFIX)), Some(strip_prefix(&new, NEW_PREFIX)))
}

/// Decodes the path on a `---` / `+++` line. `/dev/null` means "no file".
pub(super) fn parse_marker_path(raw: &str, prefix: &str) -> Option<String> {
    let raw = raw.split('\t').next().unwrap_or(raw).trim_end();
    if raw == DEV_NULL {
        return None;
    }

    Some(strip_prefix(&unquote(raw), prefix))
}

/// Decodes the path on a `rename from` / `copy to` style line.
pub(super) fn parse_plain_path(raw: &str) -> String {
    unquote(raw.trim_end())
}

fn strip_prefix(path: &str, prefix: &str) -> String {
    path.strip_prefix(prefix).unwrap_or(path).to_string()
}

fn symmetric_name(rest: &str) -> Option<&str> {
    let body = rest.strip_prefix(OLD_PREFIX)?;
    // body is "<name> b/<name>"
    let name_len = body.len().checked_sub(3)? / 2;
    let name = body.get(..name_len)?;
    let tail = body.get(name_len..)?;

    (tail.strip_prefix(" b/")? == name).then_some(name)
}

/// Splits a leading C-quoted token off `s`, returning it decoded along with
/// the remainder.
fn split_quoted(s: &str) -> Option<(String, &str)> {
    let bytes = s.as_bytes();
    let mut i = 1;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some((unquote(&s[..=i]), &s[i + 1..])),
            _ => i += 1,
        }
    }

    None
}

/// Reverses git's C-style path quoting. Unquoted input is returned as-is.
pub(super) fn unquote(s: &str) -> String {
    let Some(inner) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return s.to_string();
    };

    let mut out = Vec::with_capacity(inner.len());
    let mut bytes = inner.bytes().peekable();

    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }

        match bytes.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b't') => out.push(b'\t'),
            Some(b'r') => out.push(b'\r'),
            Some(b'a') => out.push(0x07),
            Some(b'b') => out.push(0x08),
            Some(b'f') => out.push(0x0c),
            Some(b'v') => out.push(0x0b),
            Some(d @ b'0'..=b'7') => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match bytes.peek() {
                        Some(&o @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(o - b'0');
                            bytes.next();
                        }
                        _ => break,
                    }
                }
                out.push(u8::try_from(value).unwrap_or(b'?'));
            }
            Some(other) => out.push(other),
            None => out.push(b'\\'),
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}
