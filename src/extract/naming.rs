use std::sync::LazyLock;

use regex::Regex;

use crate::page_range::PageSelection;

static PDF_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.pdf$").expect("valid suffix regex"));

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\x00-\x1f\x7f"*:<>?|]"#).expect("valid charset regex"));

/// The user-facing base name of an upload, without directories or `.pdf`
pub fn file_stem(original: &str) -> String {
    // browsers on Windows sometimes send the full client path
    let base = original
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    let stem = PDF_SUFFIX.replace(base.trim(), "");
    let cleaned = UNSAFE_CHARS.replace_all(stem.trim(), "_");

    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.into_owned()
    }
}

/// Download name for the output of one selection
pub fn selection_file_name(stem: &str, selection: &PageSelection) -> String {
    match selection {
        PageSelection::Range(range) if range.from() == range.to() => {
            format!("{}_page_{}.pdf", stem, range.from())
        }
        PageSelection::Range(range) => {
            format!("{}_pages_{}-{}.pdf", stem, range.from(), range.to())
        }
        PageSelection::Pages(_) => format!("{}_extracted.pdf", stem),
    }
}

pub fn bundle_file_name(stem: &str) -> String {
    format!("{}_extracted.zip", stem)
}
