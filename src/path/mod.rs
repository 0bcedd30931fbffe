#[cfg(test)]
mod tests;

use once_cell::sync::Lazy;
use regex::Regex;

pub const SEPARATOR: char = '/';

static ENCODED_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)%2F").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9._/-]").unwrap());

/// Normalizes a user- or archive-supplied relative path into one the remote
/// tree API accepts.
///
/// Traversal segments are deleted, never resolved, so the result can't
/// escape whatever prefix it is later joined onto. Returns an empty string
/// when nothing valid is left.
pub fn sanitize(raw: &str) -> String {
    let clean = raw.replace('\\', "/");
    let clean = ENCODED_SEPARATOR.replace_all(&clean, "_");
    let clean = WHITESPACE.replace_all(&clean, "_");
    let clean = DISALLOWED.replace_all(&clean, "_");

    clean
        .split(SEPARATOR)
        .filter(|segment| !is_skipped_segment(segment))
        .collect::<Vec<_>>()
        .join("/")
}

/// Joins `relative` under `prefix` and sanitizes the result.
pub fn join(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        sanitize(relative)
    } else {
        sanitize(&format!("{prefix}/{relative}"))
    }
}

/// Sanitized paths that name nothing are dropped rather than uploaded.
pub fn is_skippable(sanitized: &str) -> bool {
    sanitized.is_empty() || sanitized == "." || sanitized == ".."
}

pub fn is_legal_tree_path(path: &str) -> bool {
    !path.is_empty()
        && !path.contains('\0')
        && !path.starts_with(SEPARATOR)
        && !path.ends_with(SEPARATOR)
        && !path.split(SEPARATOR).any(is_skipped_segment)
}

pub fn file_name(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}

/// Whether `path` sits inside a `.git` directory at any depth.
pub fn is_git_internal(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    normalized.starts_with(".git/") || normalized.contains("/.git/")
}

fn is_skipped_segment(segment: &str) -> bool {
    segment.is_empty() || segment == "." || segment == ".."
}
