//! Helpers for the URI strings the editor host hands us.
//!
//! Document identity is a URI string throughout the backend; only a few
//! places need to look inside one (scheme checks, mapping `file://` URIs to
//! local paths for validation, workspace-relative paths for exclude
//! patterns).

use percent_encoding::percent_decode_str;
use std::path::PathBuf;

/// Returns the scheme of `uri`, e.g., `file` for `file:///tmp/notes.md`.
pub fn scheme(uri: &str) -> Option<&str> {
    let (scheme, _rest) = uri.split_once(':')?;
    if !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        Some(scheme)
    } else {
        None
    }
}

pub fn is_untitled(uri: &str) -> bool {
    scheme(uri) == Some("untitled")
}

/// Maps a `file://` URI to a local path, percent-decoded.
///
/// Returns `None` for any other scheme, untitled documents included.
pub fn to_file_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    // Non-empty authority components (remote hosts) are not local files.
    if !rest.starts_with('/') {
        return None;
    }
    let decoded = percent_decode_str(rest).decode_utf8().ok()?;
    Some(PathBuf::from(decoded.into_owned()))
}

/// Path of `uri` relative to the workspace folder `scope_uri`, with a
/// trailing separator stripped, or `None` if `uri` lives outside that folder.
pub fn workspace_relative(uri: &str, scope_uri: &str) -> Option<String> {
    let path = to_file_path(uri)?;
    let scope = to_file_path(scope_uri)?;
    let relative = path.strip_prefix(&scope).ok()?;
    Some(relative.to_string_lossy().into_owned())
}

/// Whether the URI path looks like a markdown file, used when only a tab
/// input (no language id) is available.
pub fn has_markdown_extension(uri: &str) -> bool {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    matches!(
        path.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()),
        Some(ext) if matches!(ext.as_str(), "md" | "markdown" | "mdown" | "mkd")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme() {
        assert_eq!(scheme("file:///tmp/a.md"), Some("file"));
        assert_eq!(scheme("untitled:Untitled-1"), Some("untitled"));
        assert_eq!(scheme("git:/repo/a.md?ref=HEAD"), Some("git"));
        assert_eq!(scheme("no-colon-here"), None);
    }

    #[test]
    fn test_to_file_path() {
        assert_eq!(
            to_file_path("file:///tmp/My%20Notes/a.md"),
            Some(PathBuf::from("/tmp/My Notes/a.md"))
        );
        assert_eq!(to_file_path("untitled:Untitled-1"), None);
        assert_eq!(to_file_path("file://remotehost/tmp/a.md"), None);
    }

    #[test]
    fn test_workspace_relative() {
        assert_eq!(
            workspace_relative("file:///workspace/docs/readme.md", "file:///workspace").as_deref(),
            Some("docs/readme.md")
        );
        assert_eq!(
            workspace_relative("file:///elsewhere/readme.md", "file:///workspace"),
            None
        );
    }

    #[test]
    fn test_has_markdown_extension() {
        assert!(has_markdown_extension("file:///a/b/README.md"));
        assert!(has_markdown_extension("file:///a/b/notes.MARKDOWN"));
        assert!(!has_markdown_extension("file:///a/b/main.rs"));
        assert!(!has_markdown_extension("file:///a/b/Makefile"));
    }
}
