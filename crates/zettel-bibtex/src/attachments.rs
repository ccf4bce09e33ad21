//! File attachments referenced from BibTeX entries
//!
//! Two encodings are understood:
//! - the `file` field written by JabRef and Zotero (Better BibTeX):
//!   `description:path:type` records separated by `;`, with `\:` and `\;`
//!   escapes;
//! - BibDesk `Bdsk-File-N` fields: base64-encoded binary plists carrying a
//!   `relativePath` entry.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use plist::Value;

use crate::entry::BibTeXEntry;

/// Attachment paths per cite key, PDFs first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentIndex {
    by_key: HashMap<String, Vec<String>>,
}

impl AttachmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attachments for `cite_key`, or `None` if the entry has none
    pub fn get(&self, cite_key: &str) -> Option<&[String]> {
        self.by_key.get(cite_key).map(Vec::as_slice)
    }

    pub fn insert(&mut self, cite_key: impl Into<String>, paths: Vec<String>) {
        if !paths.is_empty() {
            self.by_key.insert(cite_key.into(), paths);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }
}

/// Collect attachments for every entry.
///
/// Relative paths that exist next to the library (`base_dir`) are resolved
/// against it; everything else is kept exactly as written. Undecodable
/// fields are logged and skipped.
pub fn extract_attachments(entries: &[BibTeXEntry], base_dir: Option<&Path>) -> AttachmentIndex {
    let mut index = AttachmentIndex::new();

    for entry in entries {
        let mut files: Vec<AttachedFile> = Vec::new();

        if let Some(value) = entry.get_field("file") {
            files.extend(parse_file_field(value));
        }

        let mut bdsk: Vec<(u32, &str)> = entry
            .fields_with_prefix("bdsk-file-")
            .map(|f| {
                let n = f.key[10..].parse().unwrap_or(u32::MAX);
                (n, f.value.as_str())
            })
            .collect();
        bdsk.sort_by_key(|(n, _)| *n);
        for (_, value) in bdsk {
            match bdsk_file_decode(value) {
                Some(path) => files.push(AttachedFile::new(path, None)),
                None => tracing::warn!(
                    cite_key = %entry.cite_key,
                    "Could not decode Bdsk-File field, skipping"
                ),
            }
        }

        // Stable sort keeps the file order within each group
        files.sort_by_key(|f| !f.is_pdf());

        let paths = files
            .into_iter()
            .map(|f| resolve_path(&f.path, base_dir))
            .collect();
        index.insert(entry.cite_key.clone(), paths);
    }

    index
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttachedFile {
    path: String,
    file_type: Option<String>,
}

impl AttachedFile {
    fn new(path: String, file_type: Option<String>) -> Self {
        Self { path, file_type }
    }

    fn is_pdf(&self) -> bool {
        self.file_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("pdf") || t == "application/pdf")
            || self.path.to_lowercase().ends_with(".pdf")
    }
}

/// Parse a JabRef/Zotero `file` field into its records
fn parse_file_field(value: &str) -> Vec<AttachedFile> {
    split_unescaped(value, ';')
        .into_iter()
        .filter_map(|record| {
            let mut parts: Vec<String> = split_unescaped(&record, ':')
                .iter()
                .map(|p| unescape(p))
                .collect();
            if starts_with_drive(&parts) {
                let rest = parts.remove(1);
                parts[0] = format!("{}:{}", parts[0], rest);
            }

            let (path, file_type) = match parts.len() {
                0 => return None,
                1 => (parts[0].clone(), None),
                2 if parts[0].is_empty() => (parts[1].clone(), None),
                2 => (parts[0].clone(), Some(parts[1].clone())),
                // `description:path:type`; an unescaped drive letter splits the
                // path itself, so rejoin everything between the outer parts
                n => (parts[1..n - 1].join(":"), Some(parts[n - 1].clone())),
            };

            let path = path.trim().to_string();
            if path.is_empty() {
                None
            } else {
                Some(AttachedFile::new(path, file_type))
            }
        })
        .collect()
}

/// A record such as `C:\docs\a.pdf` whose first colon belongs to the path
fn starts_with_drive(parts: &[String]) -> bool {
    let [drive, rest, ..] = parts else {
        return false;
    };
    let mut letters = drive.chars();
    matches!((letters.next(), letters.next()), (Some(c), None) if c.is_ascii_alphabetic())
        && (rest.starts_with('\\') || rest.starts_with('/'))
}

/// Split on `sep` where it is not preceded by a backslash escape
fn split_unescaped(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn unescape(input: &str) -> String {
    input
        .replace("\\:", ":")
        .replace("\\;", ";")
        .replace("\\\\", "\\")
}

fn resolve_path(path: &str, base_dir: Option<&Path>) -> String {
    let candidate = Path::new(path);
    match base_dir {
        Some(dir) if candidate.is_relative() => {
            let joined = dir.join(candidate);
            if joined.exists() {
                joined.to_string_lossy().into_owned()
            } else {
                path.to_string()
            }
        }
        _ => path.to_string(),
    }
}

/// Decode a `Bdsk-File-N` value to the relative path it stores
fn bdsk_file_decode(value: &str) -> Option<String> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let data = STANDARD.decode(compact).ok()?;
    let plist = Value::from_reader(Cursor::new(data)).ok()?;

    match plist {
        Value::Dictionary(dict) => match dict.get("relativePath") {
            Some(Value::String(path)) => Some(path.clone()),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::BibTeXEntryType;
    use plist::Dictionary;

    fn entry_with(fields: &[(&str, &str)]) -> BibTeXEntry {
        let mut entry = BibTeXEntry::new("key".to_string(), BibTeXEntryType::Article);
        for (k, v) in fields {
            entry.add_field(*k, *v);
        }
        entry
    }

    fn bdsk_encode(relative_path: &str) -> String {
        let mut dict = Dictionary::new();
        dict.insert(
            "relativePath".to_string(),
            Value::String(relative_path.to_string()),
        );
        let mut buffer = Vec::new();
        plist::to_writer_binary(&mut buffer, &Value::Dictionary(dict)).unwrap();
        STANDARD.encode(&buffer)
    }

    #[test]
    fn test_zotero_style_file_field() {
        let index = extract_attachments(&[entry_with(&[("file", ":path/to/a.pdf:PDF")])], None);
        assert_eq!(index.get("key"), Some(&["path/to/a.pdf".to_string()][..]));
    }

    #[test]
    fn test_pdfs_sorted_first() {
        let entry = entry_with(&[(
            "file",
            "Notes:notes.docx:Word;Snapshot:page.html:text/html;Full Text:paper.pdf:PDF",
        )]);
        let index = extract_attachments(&[entry], None);
        assert_eq!(
            index.get("key").unwrap(),
            &["paper.pdf", "notes.docx", "page.html"]
        );
    }

    #[test]
    fn test_escaped_windows_path() {
        let entry = entry_with(&[("file", r"Paper:C\:\\Users\\me\\paper.pdf:PDF")]);
        let index = extract_attachments(&[entry], None);
        assert_eq!(index.get("key").unwrap(), &[r"C:\Users\me\paper.pdf"]);
    }

    #[test]
    fn test_unescaped_drive_letter_is_rejoined() {
        let entry = entry_with(&[("file", r"Paper:C:\papers\x.pdf:PDF")]);
        let index = extract_attachments(&[entry], None);
        assert_eq!(index.get("key").unwrap(), &[r"C:\papers\x.pdf"]);
    }

    #[test]
    fn test_bare_drive_letter_paths() {
        let entry = entry_with(&[("file", r"C:\docs\a.pdf;D:/notes/b.html:text/html")]);
        let index = extract_attachments(&[entry], None);
        assert_eq!(
            index.get("key").unwrap(),
            &[r"C:\docs\a.pdf", "D:/notes/b.html"]
        );

        let files = parse_file_field(r"C:\docs\a.pdf");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, r"C:\docs\a.pdf");
        assert_eq!(files[0].file_type, None);
        assert!(files[0].is_pdf());
    }

    #[test]
    fn test_bare_paths() {
        let entry = entry_with(&[("file", "a.html;b.pdf")]);
        let index = extract_attachments(&[entry], None);
        assert_eq!(index.get("key").unwrap(), &["b.pdf", "a.html"]);
    }

    #[test]
    fn test_bdsk_file_fields() {
        let entry = entry_with(&[
            ("Bdsk-File-2", bdsk_encode("second.pdf").as_str()),
            ("Bdsk-File-1", bdsk_encode("first.pdf").as_str()),
            ("Bdsk-File-3", "not base64 !!"),
        ]);
        let index = extract_attachments(&[entry], None);
        assert_eq!(index.get("key").unwrap(), &["first.pdf", "second.pdf"]);
    }

    #[test]
    fn test_existing_relative_path_is_resolved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("here.pdf"), b"%PDF").unwrap();

        let entry = entry_with(&[("file", ":here.pdf:PDF;:missing.pdf:PDF")]);
        let index = extract_attachments(&[entry], Some(dir.path()));
        let paths = index.get("key").unwrap();
        assert_eq!(paths[0], dir.path().join("here.pdf").to_string_lossy());
        assert_eq!(paths[1], "missing.pdf");
    }

    #[test]
    fn test_entries_without_files_are_absent() {
        let index = extract_attachments(&[entry_with(&[("title", "No files")])], None);
        assert!(index.is_empty());
        assert_eq!(index.get("key"), None);
    }
}
