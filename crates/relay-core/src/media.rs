//! Separates media references (URLs, local file paths) from prose in agent
//! output text.
//!
//! Grammar (resolves the source specification's open question): absolute
//! `http(s)://` URLs, and absolute filesystem paths ending in a known media
//! extension. Nothing wider — no relative paths, no bare filenames.

use once_cell::sync::Lazy;
use regex::Regex;

const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "mp4", "mov", "ogg", "oga", "mp3", "wav", "pdf",
];

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s]+").expect("static URL_RE is a valid pattern"));

static PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:/[^\s/]+)+\.[A-Za-z0-9]+").expect("static PATH_RE is a valid pattern")
});

/// Result of splitting agent text into prose and media references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitResult {
    pub text: String,
    pub media_urls: Vec<String>,
}

/// Scans `text` for media URLs/paths and removes them from the prose.
pub fn split(text: &str) -> SplitResult {
    let mut media_urls = Vec::new();
    let mut remaining = text.to_string();

    let urls: Vec<String> = URL_RE.find_iter(&remaining).map(|m| m.as_str().to_string()).collect();
    for url in &urls {
        remaining = remaining.replacen(url.as_str(), "", 1);
    }
    media_urls.extend(urls);

    let paths: Vec<String> = PATH_RE
        .find_iter(&remaining)
        .map(|m| m.as_str().to_string())
        .filter(|p| is_media_path(p))
        .collect();
    for path in &paths {
        remaining = remaining.replacen(path.as_str(), "", 1);
    }
    media_urls.extend(paths);

    SplitResult {
        text: collapse_whitespace(&remaining),
        media_urls,
    }
}

fn is_media_path(path: &str) -> bool {
    path.rsplit('.')
        .next()
        .map(|ext| MEDIA_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Filters local media paths whose size on disk exceeds `media_max_mb`.
/// `http(s)` URLs always pass through unconditionally; their size can't be
/// probed without a network round trip this component doesn't make.
pub fn filter_by_size(media_urls: Vec<String>, media_max_mb: Option<u64>) -> Vec<String> {
    let Some(max_mb) = media_max_mb else {
        return media_urls;
    };
    let max_bytes = max_mb * 1024 * 1024;
    media_urls
        .into_iter()
        .filter(|m| {
            if m.starts_with("http://") || m.starts_with("https://") {
                return true;
            }
            match std::fs::metadata(m) {
                Ok(meta) => meta.len() <= max_bytes,
                Err(_) => true,
            }
        })
        .collect()
}
