//! Named extension groups and the per-manager allow-list.
//!
//! Groups are plain slices of lower-case extensions without the dot. A
//! manager's allow-list is built from any combination of group names and
//! literal extensions in its `extensions` config key:
//!
//! ```toml
//! extensions = ["IMAGES", "pdf"]
//! ```

use std::collections::BTreeSet;

pub const TEXT: &[&str] = &["txt"];

pub const DOCUMENTS: &[&str] = &[
    "rtf", "odf", "ods", "gnumeric", "abw", "doc", "docx", "xls", "xlsx",
];

pub const IMAGES: &[&str] = &["jpg", "jpe", "jpeg", "png", "gif", "svg", "bmp", "webp"];

pub const AUDIO: &[&str] = &["wav", "mp3", "aac", "ogg", "oga", "flac"];

pub const DATA: &[&str] = &["csv", "ini", "json", "plist", "xml", "yaml", "yml"];

pub const SCRIPTS: &[&str] = &["js", "php", "pl", "py", "rb", "sh"];

pub const ARCHIVES: &[&str] = &["gz", "bz2", "zip", "tar", "tgz", "txz", "7z"];

pub const EXECUTABLES: &[&str] = &["so", "exe", "dll"];

/// Look up a group by its upper-case name. `DEFAULTS` is TEXT + DOCUMENTS +
/// IMAGES + DATA.
pub fn group(name: &str) -> Option<Vec<&'static str>> {
    let single: &[&str] = match name {
        "TEXT" => TEXT,
        "DOCUMENTS" => DOCUMENTS,
        "IMAGES" => IMAGES,
        "AUDIO" => AUDIO,
        "DATA" => DATA,
        "SCRIPTS" => SCRIPTS,
        "ARCHIVES" => ARCHIVES,
        "EXECUTABLES" => EXECUTABLES,
        "DEFAULTS" => {
            return Some([TEXT, DOCUMENTS, IMAGES, DATA].concat());
        }
        _ => return None,
    };
    Some(single.to_vec())
}

/// Which extensions a manager accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AllowedExtensions {
    /// No allow-list configured.
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl AllowedExtensions {
    /// Build an allow-list from group names and literal extensions. An empty
    /// list means "allow everything".
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Self {
        if entries.is_empty() {
            return Self::All;
        }
        let mut set = BTreeSet::new();
        for entry in entries {
            let entry = entry.as_ref();
            match group(entry) {
                Some(exts) => set.extend(exts.into_iter().map(str::to_string)),
                None => {
                    set.insert(entry.trim_start_matches('.').to_ascii_lowercase());
                }
            }
        }
        Self::Only(set)
    }

    /// `ext` is the extension without the dot; comparison is case-insensitive.
    pub fn allows(&self, ext: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(&ext.to_ascii_lowercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_entries_allow_everything() {
        let allowed = AllowedExtensions::from_entries::<&str>(&[]);
        assert_eq!(allowed, AllowedExtensions::All);
        assert!(allowed.allows("exe"));
        assert!(allowed.allows(""));
    }

    #[test]
    fn groups_expand() {
        let allowed = AllowedExtensions::from_entries(&["IMAGES"]);
        assert!(allowed.allows("jpg"));
        assert!(allowed.allows("PNG"));
        assert!(!allowed.allows("txt"));
    }

    #[test]
    fn literals_are_normalised() {
        let allowed = AllowedExtensions::from_entries(&[".PDF", "txt"]);
        assert!(allowed.allows("pdf"));
        assert!(allowed.allows("txt"));
        assert!(!allowed.allows("doc"));
    }

    #[test]
    fn defaults_group_combines_four_groups() {
        let defaults = group("DEFAULTS").unwrap();
        assert!(defaults.contains(&"txt"));
        assert!(defaults.contains(&"docx"));
        assert!(defaults.contains(&"png"));
        assert!(defaults.contains(&"yaml"));
        assert!(!defaults.contains(&"exe"));
    }

    #[test]
    fn unknown_group_is_none() {
        assert!(group("VIDEOS").is_none());
    }
}
