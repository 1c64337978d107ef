//! CLI output formatting.
//!
//! Every command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.
//!
//! # Output Format
//!
//! ## List
//!
//! ```text
//! photos (3 assets)
//!     001 cat.png
//!     002 cat_thumb.png
//!     003 dog.jpg
//! ```
//!
//! ## Meta
//!
//! ```text
//! cat.png
//!     Size: 12.4 KiB (12699 bytes)
//!     Type: image/png
//!     Checksum: sha1:0a1b...
//!     Modified: 2024-05-01T10:00:00+00:00
//! ```

use crate::storage::Metadata;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human readable byte count with binary units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

pub fn format_saved(manager: &str, name: &str, url: Option<&str>) -> Vec<String> {
    let mut lines = vec![format!("Saved {name} to {manager}")];
    if let Some(url) = url {
        lines.push(format!("{}URL: {url}", indent(1)));
    }
    lines
}

pub fn print_saved(manager: &str, name: &str, url: Option<&str>) {
    for line in format_saved(manager, name, url) {
        println!("{}", line);
    }
}

pub fn format_listing(manager: &str, names: &[String]) -> Vec<String> {
    let noun = if names.len() == 1 { "asset" } else { "assets" };
    let mut lines = vec![format!("{manager} ({} {noun})", names.len())];
    lines.extend(
        names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{}{} {name}", indent(1), format_index(i + 1))),
    );
    lines
}

pub fn print_listing(manager: &str, names: &[String]) {
    for line in format_listing(manager, names) {
        println!("{}", line);
    }
}

pub fn format_metadata(name: &str, meta: &Metadata) -> Vec<String> {
    vec![
        name.to_string(),
        format!(
            "{}Size: {} ({} bytes)",
            indent(1),
            format_size(meta.size),
            meta.size
        ),
        format!("{}Type: {}", indent(1), meta.mime),
        format!("{}Checksum: {}", indent(1), meta.checksum),
        format!("{}Modified: {}", indent(1), meta.modified.to_rfc3339()),
    ]
}

pub fn print_metadata(name: &str, meta: &Metadata) {
    for line in format_metadata(name, meta) {
        println!("{}", line);
    }
}

pub fn format_deleted(manager: &str, name: &str, thumbnail: Option<&str>) -> Vec<String> {
    let mut lines = vec![format!("Deleted {name} from {manager}")];
    if let Some(thumb) = thumbnail {
        lines.push(format!("{}Thumbnail: {thumb}", indent(1)));
    }
    lines
}

pub fn print_deleted(manager: &str, name: &str, thumbnail: Option<&str>) {
    for line in format_deleted(manager, name, thumbnail) {
        println!("{}", line);
    }
}

pub fn format_archived(manager: &str, name: &str, members: &[String]) -> Vec<String> {
    let mut lines = vec![format!(
        "Archived {} files into {name} on {manager}",
        members.len()
    )];
    lines.extend(members.iter().map(|m| format!("{}{m}", indent(1))));
    lines
}

pub fn print_archived(manager: &str, name: &str, members: &[String]) {
    for line in format_archived(manager, name, members) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(1234), "1234");
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KiB");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn listing_numbers_entries() {
        let names = vec!["a.png".to_string(), "b.png".to_string()];
        assert_eq!(
            format_listing("photos", &names),
            vec!["photos (2 assets)", "    001 a.png", "    002 b.png"]
        );
    }

    #[test]
    fn listing_singular() {
        assert_eq!(format_listing("docs", &["x".to_string()])[0], "docs (1 asset)");
    }

    #[test]
    fn saved_with_url() {
        assert_eq!(
            format_saved("photos", "a.png", Some("/media/photos/a.png")),
            vec!["Saved a.png to photos", "    URL: /media/photos/a.png"]
        );
        assert_eq!(format_saved("docs", "a.txt", None).len(), 1);
    }

    #[test]
    fn metadata_lines() {
        let meta = Metadata {
            checksum: "sha1:abc".into(),
            size: 2048,
            mime: "image/png".into(),
            modified: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        };
        let lines = format_metadata("cat.png", &meta);
        assert_eq!(lines[0], "cat.png");
        assert_eq!(lines[1], "    Size: 2.0 KiB (2048 bytes)");
        assert_eq!(lines[2], "    Type: image/png");
        assert_eq!(lines[3], "    Checksum: sha1:abc");
        assert_eq!(lines[4], "    Modified: 2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn deleted_mentions_thumbnail() {
        let lines = format_deleted("photos", "a.png", Some("a_thumb.png"));
        assert_eq!(lines, vec!["Deleted a.png from photos", "    Thumbnail: a_thumb.png"]);
    }

    #[test]
    fn archived_lists_members() {
        let lines = format_archived("docs", "all.zip", &["a.txt".into(), "b.txt".into()]);
        assert_eq!(
            lines,
            vec!["Archived 2 files into all.zip on docs", "    a.txt", "    b.txt"]
        );
    }
}
