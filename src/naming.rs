//! Storage name derivation.
//!
//! Every stored asset has a name derived from a base filename. Companion
//! renditions are never indexed anywhere; they are found again by applying
//! the same derivation to the main name:
//!
//! - `photo.jpg` → `photo_thumb.jpg` (thumbnail)
//! - `photo.jpg` → `photo_wm.jpg` (watermarked copy)
//!
//! Generated names are `<uuid>_sep_<original>`, with a time-ordered UUID, so
//! the user's original filename can be recovered by splitting on the separator.

use uuid::Uuid;

const THUMB_SUFFIX: &str = "_thumb";
const WATERMARK_SUFFIX: &str = "_wm";

/// Produces unique storage names and the names of their companions.
pub trait NameGenerator: Send + Sync {
    /// A unique storage name derived from `filename`.
    fn generate_name(&self, filename: &str) -> String;

    /// The original filename embedded in a generated name, if there is one.
    fn original_name<'a>(&self, name: &'a str) -> Option<&'a str>;

    fn thumbnail_name(&self, name: &str) -> String {
        with_suffix(name, THUMB_SUFFIX)
    }

    fn watermark_name(&self, name: &str) -> String {
        with_suffix(name, WATERMARK_SUFFIX)
    }
}

/// `<uuid v7><separator><filename>` names.
#[derive(Debug, Clone)]
pub struct UuidNameGen {
    separator: String,
}

impl UuidNameGen {
    pub const DEFAULT_SEPARATOR: &'static str = "_sep_";

    pub fn new() -> Self {
        Self::with_separator(Self::DEFAULT_SEPARATOR)
    }

    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl Default for UuidNameGen {
    fn default() -> Self {
        Self::new()
    }
}

impl NameGenerator for UuidNameGen {
    fn generate_name(&self, filename: &str) -> String {
        format!("{}{}{}", Uuid::now_v7(), self.separator, filename)
    }

    fn original_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.rfind(&self.separator)
            .map(|pos| &name[pos + self.separator.len()..])
    }
}

/// Split a name into `(stem, extension)` the way most path libraries do:
/// the extension starts at the last dot of the final path segment and keeps
/// the dot. Leading dots (`.bashrc`) are not an extension.
///
/// - `"a/photo.tar.gz"` → `("a/photo.tar", ".gz")`
/// - `"README"` → `("README", "")`
/// - `".hidden"` → `(".hidden", "")`
pub fn split_extension(name: &str) -> (&str, &str) {
    let segment_start = name.rfind('/').map(|p| p + 1).unwrap_or(0);
    let segment = &name[segment_start..];
    let leading_dots = segment.len() - segment.trim_start_matches('.').len();

    match segment.rfind('.') {
        Some(dot) if dot >= leading_dots && dot > 0 => {
            let split = segment_start + dot;
            (&name[..split], &name[split..])
        }
        _ => (name, ""),
    }
}

/// Extension without the dot, lower-cased. Empty when there is none.
pub fn extension(name: &str) -> String {
    split_extension(name)
        .1
        .trim_start_matches('.')
        .to_ascii_lowercase()
}

/// Lower-case the extension, leaving the stem untouched.
pub fn lower_extension(name: &str) -> String {
    let (stem, ext) = split_extension(name);
    format!("{}{}", stem, ext.to_ascii_lowercase())
}

/// Replace the extension (`ext` without the dot).
pub fn replace_extension(name: &str, ext: &str) -> String {
    let (stem, _) = split_extension(name);
    format!("{stem}.{ext}")
}

fn with_suffix(name: &str, suffix: &str) -> String {
    let (stem, ext) = split_extension(name);
    format!("{stem}{suffix}{ext}")
}

/// Reduce an uploaded filename to a flat, ASCII-only name safe to use as a
/// storage key.
///
/// Path separators become spaces, whitespace runs collapse into `_`, only
/// `[A-Za-z0-9._-]` survive, and leading/trailing dots and underscores are
/// stripped. The result can be empty, which callers treat as "no filename".
pub fn secure_filename(filename: &str) -> String {
    let flattened: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_simple_extension() {
        assert_eq!(split_extension("photo.jpg"), ("photo", ".jpg"));
    }

    #[test]
    fn split_keeps_directory_prefix() {
        assert_eq!(split_extension("a/b/photo.tar.gz"), ("a/b/photo.tar", ".gz"));
    }

    #[test]
    fn split_dot_in_directory_only() {
        assert_eq!(split_extension("v1.2/README"), ("v1.2/README", ""));
    }

    #[test]
    fn split_hidden_file_has_no_extension() {
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("dir/.hidden"), ("dir/.hidden", ""));
    }

    #[test]
    fn thumbnail_and_watermark_names() {
        let namegen = UuidNameGen::new();
        assert_eq!(namegen.thumbnail_name("photo.jpg"), "photo_thumb.jpg");
        assert_eq!(namegen.watermark_name("a/photo.png"), "a/photo_wm.png");
        assert_eq!(namegen.thumbnail_name("noext"), "noext_thumb");
    }

    #[test]
    fn generated_name_recovers_original() {
        let namegen = UuidNameGen::new();
        let name = namegen.generate_name("flask.jpg");
        assert!(name.ends_with("_sep_flask.jpg"));
        assert_eq!(namegen.original_name(&name), Some("flask.jpg"));
    }

    #[test]
    fn generated_names_are_unique() {
        let namegen = UuidNameGen::new();
        assert_ne!(namegen.generate_name("a.txt"), namegen.generate_name("a.txt"));
    }

    #[test]
    fn original_name_without_separator() {
        assert_eq!(UuidNameGen::new().original_name("plain.txt"), None);
    }

    #[test]
    fn lower_extension_only_touches_extension() {
        assert_eq!(lower_extension("My.Photo.JPG"), "My.Photo.jpg");
        assert_eq!(extension("My.Photo.JPG"), "jpg");
        assert_eq!(extension("README"), "");
    }

    #[test]
    fn replace_extension_rewrites_last_one() {
        assert_eq!(replace_extension("scan.tiff", "jpg"), "scan.jpg");
        assert_eq!(replace_extension("noext", "jpg"), "noext.jpg");
    }

    #[test]
    fn secure_filename_strips_paths_and_unsafe_chars() {
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("i contain cool \u{fc}ml\u{e4}uts.txt"), "i_contain_cool_mluts.txt");
        assert_eq!(secure_filename("..."), "");
    }
}
