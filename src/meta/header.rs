use super::keys::{self, KEY_ID};
use super::Meta;
use crate::id::Zid;

const YAML_SEP: &str = "---";

/// Parses a metadata header and returns the metadata together with the byte
/// offset where the content starts.
///
/// The header is either delimited by `---` lines (YAML style) or terminated by
/// the first blank line. A header that runs to the end of input is accepted,
/// which is how separate metadata files are read. An `id:` line is tolerated
/// but ignored: the caller's `zid` is authoritative.
pub fn parse_header(zid: Zid, input: &[u8]) -> (Meta, usize) {
    let mut meta = Meta::new(zid);
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut pos = 0;

    if let Some((line, next)) = next_line(input, pos) {
        if line.trim_end() == YAML_SEP {
            meta.yaml_sep = true;
            pos = next;
        }
    }

    while let Some((line, next)) = next_line(input, pos) {
        pos = next;
        let trimmed = line.trim_end();
        if meta.yaml_sep {
            if trimmed == YAML_SEP {
                break;
            }
            if trimmed.trim_start().is_empty() {
                continue;
            }
        } else if trimmed.trim_start().is_empty() {
            break;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = pairs.last_mut() {
                value.push(' ');
                value.push_str(trimmed.trim_start());
            }
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if keys::is_valid_key(&key) {
            pairs.push((key, value.trim().to_string()));
        }
    }

    for (key, value) in pairs {
        if key != KEY_ID {
            meta.set(&key, &value);
        }
    }
    (meta, pos)
}

fn next_line(input: &[u8], pos: usize) -> Option<(String, usize)> {
    if pos >= input.len() {
        return None;
    }
    let rest = &input[pos..];
    let (raw, next) = match rest.iter().position(|b| *b == b'\n') {
        Some(idx) => (&rest[..idx], pos + idx + 1),
        None => (rest, input.len()),
    };
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    Some((String::from_utf8_lossy(raw).into_owned(), next))
}

/// Writes `id:` first, then every stored (non computed) pair.
pub fn write_header(meta: &Meta, out: &mut Vec<u8>) {
    out.extend_from_slice(format!("{}: {}\n", KEY_ID, meta.zid).as_bytes());
    for (key, value) in meta.user_pairs() {
        out.extend_from_slice(format!("{key}: {value}\n").as_bytes());
    }
}

/// Renders a `.zettel` file: header, separator, content.
pub fn write_zettel_file(meta: &Meta, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 128);
    if meta.yaml_sep {
        out.extend_from_slice(b"---\n");
        write_header(meta, &mut out);
        out.extend_from_slice(b"---\n");
    } else {
        write_header(meta, &mut out);
        out.push(b'\n');
    }
    out.extend_from_slice(content);
    out
}
