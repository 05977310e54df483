//! Directory entries and the rules that decide which file plays which role.

use crate::id::{Zid, ZID_LENGTH};
use crate::meta::{keys::KEY_SYNTAX, Meta, DEFAULT_SYNTAX, SYNTAX_NONE};

pub const EXT_ZETTEL: &str = "zettel";
pub const EXT_META: &str = "meta";
pub const EXT_BIN: &str = "bin";
pub const EXT_TXT: &str = "txt";

/// On-disk representation of one zettel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub zid: Zid,
    /// Separate metadata file; empty when metadata lives in the content file.
    pub meta_name: String,
    pub content_name: String,
    pub content_ext: String,
    /// Candidates that lost the selection contest, kept so deletion removes them too.
    pub useless_files: Vec<String>,
}

impl DirEntry {
    pub fn new(zid: Zid) -> Self {
        Self {
            zid,
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.zid.is_valid()
    }

    pub fn has_meta_in_content(&self) -> bool {
        self.content_ext == EXT_ZETTEL
    }

    pub fn is_live(&self) -> bool {
        !(self.meta_name.is_empty() && self.content_name.is_empty())
    }

    /// Every file that belongs to this entry, in deletion order.
    pub fn all_files(&self) -> Vec<&str> {
        let mut files = Vec::with_capacity(2 + self.useless_files.len());
        if !self.content_name.is_empty() {
            files.push(self.content_name.as_str());
        }
        if !self.meta_name.is_empty() {
            files.push(self.meta_name.as_str());
        }
        files.extend(self.useless_files.iter().map(String::as_str));
        files
    }

    /// Decides file names for a zettel about to be written.
    ///
    /// An entry that already has a content file keeps it (gaining a metadata
    /// file if needed). Otherwise the layout follows the zettel's syntax: a
    /// single `.zettel` file for markup that carries its own header, or a
    /// content file named after the syntax plus an extension-less metadata file.
    pub fn setup_from_meta(&mut self, meta: &Meta, zettel_file_syntax: &[String]) {
        if !self.content_name.is_empty() {
            if !self.has_meta_in_content() && self.meta_name.is_empty() {
                self.meta_name = base_name(&self.content_name, &self.content_ext).to_string();
            }
            return;
        }

        let syntax = meta.get_default(KEY_SYNTAX, DEFAULT_SYNTAX);
        let ext = calc_content_ext(syntax, meta.yaml_sep, zettel_file_syntax);
        if ext == EXT_ZETTEL {
            if !self.meta_name.is_empty() {
                let meta_name = std::mem::take(&mut self.meta_name);
                add_useless_file(self, meta_name);
            }
        } else if self.meta_name.is_empty() {
            self.meta_name = self.zid.to_string();
        }
        self.content_name = format!("{}.{}", self.zid, ext);
        self.content_ext = ext;
    }

    /// Entry for `new_zid` whose file names carry the new prefix. Useless files
    /// stay behind with the old entry so that they get deleted.
    pub fn renamed(&self, new_zid: Zid) -> DirEntry {
        DirEntry {
            zid: new_zid,
            meta_name: rename_file(&self.meta_name, self.zid, new_zid),
            content_name: rename_file(&self.content_name, self.zid, new_zid),
            content_ext: self.content_ext.clone(),
            useless_files: Vec::new(),
        }
    }
}

fn rename_file(name: &str, cur: Zid, new: Zid) -> String {
    let cur = cur.to_string();
    match name.strip_prefix(cur.as_str()) {
        Some(rest) => format!("{new}{rest}"),
        None => name.to_string(),
    }
}

fn calc_content_ext(syntax: &str, yaml_sep: bool, zettel_file_syntax: &[String]) -> String {
    if yaml_sep
        || syntax == DEFAULT_SYNTAX
        || syntax == SYNTAX_NONE
        || zettel_file_syntax.iter().any(|candidate| candidate == syntax)
    {
        return EXT_ZETTEL.to_string();
    }
    if syntax.is_empty() || !syntax.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return EXT_BIN.to_string();
    }
    syntax.to_ascii_lowercase()
}

/// Syntax name implied by a content file extension.
pub fn syntax_from_ext(ext: &str) -> &str {
    match ext {
        "" | EXT_ZETTEL => DEFAULT_SYNTAX,
        EXT_TXT => "plain",
        "jpeg" => "jpg",
        EXT_BIN => SYNTAX_NONE,
        other => other,
    }
}

/// Lower-cased extension after the zid prefix, or empty.
pub fn only_ext(name: &str) -> String {
    let tail = name.get(ZID_LENGTH..).unwrap_or("");
    match tail.rfind('.') {
        Some(pos) => tail[pos + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}

fn base_name<'a>(name: &'a str, ext: &str) -> &'a str {
    if ext.is_empty() {
        return name;
    }
    let cut = name.len().saturating_sub(ext.len() + 1);
    if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(&format!(".{ext}")) {
        &name[..cut]
    } else {
        name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SyntaxInfo {
    ast_parser: bool,
    text_format: bool,
    image_format: bool,
}

const fn info(ast_parser: bool, text_format: bool, image_format: bool) -> SyntaxInfo {
    SyntaxInfo {
        ast_parser,
        text_format,
        image_format,
    }
}

const SYNTAXES: &[(&str, SyntaxInfo)] = &[
    ("zmk", info(true, true, false)),
    ("md", info(true, true, false)),
    ("markdown", info(true, true, false)),
    ("draw", info(true, true, false)),
    ("sxn", info(true, true, false)),
    ("txt", info(false, true, false)),
    ("plain", info(false, true, false)),
    ("text", info(false, true, false)),
    ("html", info(false, true, false)),
    ("css", info(false, true, false)),
    ("svg", info(false, true, true)),
    ("gif", info(false, false, true)),
    ("jpeg", info(false, false, true)),
    ("jpg", info(false, false, true)),
    ("png", info(false, false, true)),
    ("webp", info(false, false, true)),
    ("none", info(false, false, false)),
    ("bin", info(false, false, false)),
];

fn syntax_info(ext: &str) -> Option<SyntaxInfo> {
    SYNTAXES
        .iter()
        .find(|(name, _)| *name == ext)
        .map(|(_, info)| *info)
}

/// Lower tier wins: AST parsers, text formats, images, other known, zmk,
/// unknown.
fn syntax_tier(ext: &str) -> u8 {
    if ext == DEFAULT_SYNTAX {
        return 4;
    }
    match syntax_info(ext) {
        Some(info) if info.ast_parser => 0,
        Some(info) if info.text_format => 1,
        Some(info) if info.image_format => 2,
        Some(_) => 3,
        None => 5,
    }
}

fn new_ext_is_better(old_ext: &str, new_ext: &str) -> bool {
    let (old_tier, new_tier) = (syntax_tier(old_ext), syntax_tier(new_ext));
    if old_tier != new_tier {
        return new_tier < old_tier;
    }
    if old_ext.len() != new_ext.len() {
        return new_ext.len() < old_ext.len();
    }
    new_ext < old_ext
}

/// Shorter names win; equal lengths fall back to lexicographic order.
fn new_name_is_better(old_name: &str, new_name: &str) -> bool {
    if new_name.len() != old_name.len() {
        return new_name.len() < old_name.len();
    }
    new_name < old_name
}

fn add_useless_file(entry: &mut DirEntry, name: String) -> Option<String> {
    if entry.useless_files.contains(&name) {
        return None;
    }
    entry.useless_files.push(name.clone());
    Some(name)
}

/// Folds a newly observed file into `entry`. Returns the names that were
/// passed over, which callers report as duplicates.
pub fn update_entry(entry: &mut DirEntry, name: &str) -> Vec<String> {
    let ext = only_ext(name);
    if !entry.has_meta_in_content() && (ext.is_empty() || ext == EXT_META) {
        return update_entry_meta(entry, name).into_iter().collect();
    }
    update_entry_content(entry, name, ext)
}

fn update_entry_meta(entry: &mut DirEntry, name: &str) -> Option<String> {
    if entry.meta_name.is_empty() {
        entry.meta_name = name.to_string();
        return None;
    }
    if entry.meta_name == name {
        return None;
    }
    if new_name_is_better(&entry.meta_name, name) {
        let previous = std::mem::replace(&mut entry.meta_name, name.to_string());
        return add_useless_file(entry, previous);
    }
    add_useless_file(entry, name.to_string())
}

fn update_entry_content(entry: &mut DirEntry, name: &str, ext: String) -> Vec<String> {
    if entry.content_name.is_empty() {
        entry.content_name = name.to_string();
        let embeds_meta = ext == EXT_ZETTEL;
        entry.content_ext = ext;
        if embeds_meta && !entry.meta_name.is_empty() {
            let meta_name = std::mem::take(&mut entry.meta_name);
            return add_useless_file(entry, meta_name).into_iter().collect();
        }
        return Vec::new();
    }
    if entry.content_name == name {
        return Vec::new();
    }

    if entry.content_ext == ext {
        if new_name_is_better(&entry.content_name, name) {
            let previous = std::mem::replace(&mut entry.content_name, name.to_string());
            return add_useless_file(entry, previous).into_iter().collect();
        }
        return add_useless_file(entry, name.to_string()).into_iter().collect();
    }

    if entry.has_meta_in_content() {
        return add_useless_file(entry, name.to_string()).into_iter().collect();
    }

    if ext == EXT_ZETTEL {
        let previous = std::mem::replace(&mut entry.content_name, name.to_string());
        entry.content_ext = ext;
        let mut displaced: Vec<String> = add_useless_file(entry, previous).into_iter().collect();
        if !entry.meta_name.is_empty() {
            let meta_name = std::mem::take(&mut entry.meta_name);
            displaced.extend(add_useless_file(entry, meta_name));
        }
        return displaced;
    }

    if new_ext_is_better(&entry.content_ext, &ext) {
        let previous = std::mem::replace(&mut entry.content_name, name.to_string());
        entry.content_ext = ext;
        return add_useless_file(entry, previous).into_iter().collect();
    }
    add_useless_file(entry, name.to_string()).into_iter().collect()
}

/// Removes a vanished file from `entry`. When the content or metadata file
/// disappears the passed-over candidates are folded in again. Returns the
/// names of candidates that became useful.
pub fn delete_from_entry(entry: &mut DirEntry, name: &str) -> Vec<String> {
    if let Some(pos) = entry.useless_files.iter().position(|useless| useless == name) {
        entry.useless_files.remove(pos);
        return Vec::new();
    }
    if name == entry.content_name {
        entry.content_name.clear();
        entry.content_ext.clear();
        return replay_useless_files(entry);
    }
    if name == entry.meta_name {
        entry.meta_name.clear();
        return replay_useless_files(entry);
    }
    Vec::new()
}

fn replay_useless_files(entry: &mut DirEntry) -> Vec<String> {
    let previous = std::mem::take(&mut entry.useless_files);
    for name in &previous {
        update_entry(entry, name);
    }
    previous
        .into_iter()
        .filter(|name| !entry.useless_files.contains(name))
        .collect()
}
