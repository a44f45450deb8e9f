//! Names for fetched sources and output archives.

use std::collections::HashSet;

use chrono::Utc;
use reqwest::Url;

/// Fallback entry name when a URL has no usable path segment.
pub const FALLBACK_NAME: &str = "image";

/// Default archive base name.
pub const DEFAULT_ARCHIVE_NAME: &str = "images";

/// Derive a file name from the last segment of a URL's path.
///
/// `https://host/a/b.png?x=1` becomes `b.png`. A path ending in `/` or an
/// empty path yields `image`; a URL that does not parse yields
/// `image_<unix-millis>`.
pub fn file_name_from_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| FALLBACK_NAME.to_string()),
        Err(_) => format!("{}_{}", FALLBACK_NAME, Utc::now().timestamp_millis()),
    }
}

/// Split `name` into stem and extension (extension includes the dot).
///
/// A leading dot is part of the stem, so `.hidden` has no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

/// `photo.png` with `n = 2` becomes `photo (2).png`.
pub fn numbered(name: &str, n: usize) -> String {
    let (stem, ext) = split_extension(name);
    format!("{} ({}){}", stem, n, ext)
}

/// Hands out unique names, numbering repeats.
///
/// The first `a.png` is kept as is, later ones become `a (1).png`,
/// `a (2).png`, and so on.
#[derive(Debug, Default)]
pub struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name`, or the first free numbered variant of it.
    pub fn allocate(&mut self, name: &str) -> String {
        if self.used.insert(name.to_string()) {
            return name.to_string();
        }

        let mut n = 1;
        loop {
            let candidate = numbered(name, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Number of names handed out.
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// Whether no names were handed out.
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

/// Make a user-supplied archive base name safe for a file system.
///
/// Path separators and control characters become `_`, a trailing `.zip`
/// is dropped, and blank input falls back to `images`.
pub fn sanitize_archive_name(name: &str) -> String {
    let trimmed = name.trim();
    let trimmed = trimmed
        .strip_suffix(".zip")
        .or_else(|| trimmed.strip_suffix(".ZIP"))
        .unwrap_or(trimmed);

    let cleaned: String = trimmed
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        DEFAULT_ARCHIVE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// File name for an archive with the given base name.
pub fn archive_file_name(base: &str) -> String {
    format!("{}.zip", sanitize_archive_name(base))
}
