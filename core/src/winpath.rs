//! Windows path preparation helpers
//!
//! Win32 provides no single call that both canonicalizes a path and lifts
//! the legacy `MAX_PATH` limit, so the spawner prepares working-directory
//! and long paths itself: `~` expansion, separator normalization, explicit
//! `.`/`..` segment collapsing, and the `\\?\` extended-length prefix for
//! paths past the legacy limit. The extended-length form requires a
//! pre-canonicalized path, which is why collapsing is done here rather than
//! left to the kernel.
//!
//! Everything in this module is pure string logic so it stays testable on
//! every platform; only the spawner's use of it is Windows-specific.

/// Legacy Win32 path length limit, including the terminating NUL
pub const LEGACY_MAX_PATH: usize = 260;

/// Expand a leading `~` to the given home directory.
///
/// Only `~` alone or `~/`-style prefixes are expanded; `~user` forms are
/// left untouched. With no home directory available the path is returned
/// unchanged.
pub fn expand_home(path: &str, home: Option<&str>) -> String {
    let Some(home) = home else {
        return path.to_string();
    };
    if path == "~" {
        return home.to_string();
    }
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        let mut out = home.to_string();
        if !out.ends_with('/') && !out.ends_with('\\') {
            out.push('\\');
        }
        out.push_str(rest);
        return out;
    }
    path.to_string()
}

/// Collapse `.` and `..` segments in a backslash-separated path.
///
/// Absolute paths never climb above their root; relative paths keep leading
/// `..` segments that cannot be resolved textually.
pub fn collapse_dots(path: &str) -> String {
    let (prefix, rest) = split_root(path);
    let absolute = !prefix.is_empty();

    let mut stack: Vec<&str> = Vec::new();
    for segment in rest.split('\\').filter(|s| !s.is_empty()) {
        match segment {
            "." => {}
            ".." => {
                if matches!(stack.last(), Some(&last) if last != "..") {
                    stack.pop();
                } else if !absolute {
                    stack.push("..");
                }
                // at an absolute root, ".." is dropped
            }
            other => stack.push(other),
        }
    }

    let body = stack.join("\\");
    if absolute {
        format!("{}{}", prefix, body)
    } else if body.is_empty() {
        ".".to_string()
    } else {
        body
    }
}

/// Prepare a path for Win32 calls: expand `~`, normalize separators,
/// collapse dot segments, and apply the `\\?\` extended-length prefix when
/// the result exceeds the legacy limit.
pub fn to_extended(path: &str, home: Option<&str>) -> String {
    let normalized = expand_home(path, home).replace('/', "\\");
    let collapsed = collapse_dots(&normalized);

    if collapsed.len() < LEGACY_MAX_PATH || collapsed.starts_with(r"\\?\") {
        return collapsed;
    }
    if let Some(unc) = collapsed.strip_prefix(r"\\") {
        return format!(r"\\?\UNC\{}", unc);
    }
    if is_drive_absolute(&collapsed) {
        return format!(r"\\?\{}", collapsed);
    }
    // relative long paths cannot take the prefix; pass through unchanged
    collapsed
}

/// Encode as a NUL-terminated UTF-16 buffer for wide Win32 calls.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Split off the root of a backslash-separated path.
///
/// Returns `(prefix, rest)` where `prefix` is `C:\`, `\\server\share\`,
/// `\` or empty for relative paths. The prefix always ends with the
/// separator when non-empty.
fn split_root(path: &str) -> (String, &str) {
    if let Some(unc) = path.strip_prefix(r"\\") {
        // \\server\share\rest
        let mut it = unc.splitn(3, '\\');
        let server = it.next().unwrap_or("");
        let share = it.next().unwrap_or("");
        let rest = it.next().unwrap_or("");
        return (format!(r"\\{}\{}\", server, share), rest);
    }
    if is_drive_absolute(path) {
        return (path[..3].to_string(), &path[3..]);
    }
    if let Some(rest) = path.strip_prefix('\\') {
        return ("\\".to_string(), rest);
    }
    (String::new(), path)
}

fn is_drive_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && bytes[2] == b'\\'
}
