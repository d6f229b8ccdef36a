use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::{Path, PathBuf};

pub const PUBLIC_URL_BASE: &str = "https://storage.googleapis.com";

/// Characters left alone in the path part of a public object URL.
const OBJECT_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Checks a bucket name against Cloud Storage naming rules.
///
/// Returns the reason the name is rejected, if any.
pub fn validate_bucket_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Bucket name cannot be empty".to_string());
    }
    if name.len() < 3 {
        return Err("Bucket name must be at least 3 characters".to_string());
    }
    if name.len() > 63 {
        return Err("Bucket name cannot exceed 63 characters".to_string());
    }

    let is_edge = |c: u8| c.is_ascii_lowercase() || c.is_ascii_digit();
    let bytes = name.as_bytes();
    if !is_edge(bytes[0]) {
        return Err("Bucket name must start with a lowercase letter or number".to_string());
    }
    if !is_edge(bytes[bytes.len() - 1]) {
        return Err("Bucket name must end with a lowercase letter or number".to_string());
    }
    if !bytes
        .iter()
        .all(|&c| is_edge(c) || c == b'-' || c == b'_' || c == b'.')
    {
        return Err(
            "Bucket name can only contain lowercase letters, numbers, hyphens, underscores, and dots"
                .to_string(),
        );
    }
    if name.contains("..") {
        return Err("Bucket name cannot contain consecutive dots".to_string());
    }
    if looks_like_ipv4(name) {
        return Err("Bucket name cannot be an IP address".to_string());
    }
    Ok(())
}

fn looks_like_ipv4(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| (1..=3).contains(&p.len()) && p.bytes().all(|c| c.is_ascii_digit()))
}

/// Canonical public URL of an object. Nested keys keep their slashes.
pub fn public_url(bucket: &str, object: &str) -> String {
    format!(
        "{}/{}/{}",
        PUBLIC_URL_BASE,
        bucket,
        utf8_percent_encode(object, OBJECT_PATH)
    )
}

/// Expands `~` and `$VAR` / `${VAR}` and makes the path absolute.
pub fn expand_path(path: &str) -> PathBuf {
    expand_path_with(path, |key| std::env::var(key).ok(), home::home_dir())
}

fn expand_path_with<F>(path: &str, lookup: F, home: Option<PathBuf>) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = expand_vars(path, &lookup);

    let expanded = match (expanded.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(expanded),
    };

    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    }
}

fn expand_vars<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        // Unknown or malformed references are kept verbatim.
        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

/// Object key used when the caller gives no destination name.
pub fn default_object_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

/// MIME type from the file extension, `application/octet-stream` when unknown.
pub fn content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

pub fn format_file_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} PB", size)
}
