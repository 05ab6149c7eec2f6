//! File category detection from the filename extension.

/// Category used when no table entry matches.
pub const DEFAULT_CATEGORY: &str = "other";

/// Extension table, checked in declared order. The first category listing
/// an extension wins when several do.
pub const CATEGORY_TABLE: &[(&str, &[&str])] = &[
    ("iso", &["iso", "img", "bin", "cue"]),
    ("archive", &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "tgz"]),
    ("video", &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm"]),
    ("audio", &["mp3", "wav", "flac", "aac", "ogg", "m4a"]),
    ("image", &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp"]),
    ("document", &["pdf", "doc", "docx", "txt", "xls", "xlsx", "ppt", "pptx"]),
    ("executable", &["exe", "msi", "dmg", "apk", "deb", "rpm", "appimage"]),
];

/// Returns the category tag for `file_name`.
///
/// The extension is the text after the last `.`, compared case-insensitively.
/// Names without an extension (or ending in `.`) fall back to [`DEFAULT_CATEGORY`].
pub fn detect_category(file_name: &str) -> &'static str {
    let Some((stem, ext)) = file_name.rsplit_once('.') else {
        return DEFAULT_CATEGORY;
    };
    // ".bashrc" is a hidden file, not an extension.
    if stem.is_empty() || ext.is_empty() {
        return DEFAULT_CATEGORY;
    }
    let ext = ext.to_ascii_lowercase();

    CATEGORY_TABLE
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(category, _)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}
