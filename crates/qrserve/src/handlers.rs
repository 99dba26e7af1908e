use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use tokio::fs;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::RequestError;

/// A single row in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Name as shown to the user (lossy for non-UTF-8 names)
    pub name: String,
    /// Percent-encoded raw name, so the link resolves back to the same file
    pub href: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

// ============================================================================
// Path helpers
// ============================================================================

#[cfg(unix)]
fn name_bytes(name: &OsStr) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(name.as_bytes())
}

#[cfg(not(unix))]
fn name_bytes(name: &OsStr) -> Cow<'_, [u8]> {
    match name.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

#[cfg(unix)]
fn segment_name(segment: &[u8]) -> Option<OsString> {
    use std::os::unix::ffi::OsStrExt;
    Some(OsStr::from_bytes(segment).to_os_string())
}

#[cfg(not(unix))]
fn segment_name(segment: &[u8]) -> Option<OsString> {
    std::str::from_utf8(segment).ok().map(OsString::from)
}

/// Split a decoded URL path into file names below the root.
///
/// `.` and empty segments are skipped and `..` drops the previous segment,
/// never climbing above the root. Segments that are not a single plain
/// file name on this platform are ignored.
fn path_segments(decoded: &[u8]) -> Result<Vec<OsString>, RequestError> {
    let mut segments: Vec<OsString> = Vec::new();

    for segment in decoded.split(|b| *b == b'/') {
        match segment {
            b"" | b"." => continue,
            b".." => {
                segments.pop();
                continue;
            }
            _ => {}
        }

        if segment.contains(&0) {
            warn!("Path segment contains null byte");
            return Err(RequestError::InvalidPath(
                String::from_utf8_lossy(decoded).replace('\0', "\\0"),
            ));
        }

        let Some(name) = segment_name(segment) else {
            return Err(RequestError::InvalidPath(
                String::from_utf8_lossy(decoded).into_owned(),
            ));
        };

        let mut components = Path::new(&name).components();
        if let (Some(Component::Normal(_)), None) = (components.next(), components.next()) {
            segments.push(name);
        }
    }

    Ok(segments)
}

/// Map a raw (percent-encoded) URL path to a filesystem path under `root`.
fn resolve_path(root: &Path, url_path: &str) -> Result<PathBuf, RequestError> {
    let decoded = urlencoding::decode_binary(url_path.as_bytes());

    let mut result = root.to_path_buf();
    result.extend(path_segments(&decoded)?);
    Ok(result)
}

/// Follow symlinks of an existing path and refuse targets outside the root.
fn confine_to_root(root: &Path, path: PathBuf) -> Result<PathBuf, RequestError> {
    if !path.exists() {
        return Ok(path);
    }

    let canonical_root = root.canonicalize()?;
    let canonical_path = path.canonicalize()?;

    if !canonical_path.starts_with(&canonical_root) {
        warn!(
            "Symlink escape attempt: {:?} resolved to {:?} which is outside {:?}",
            path, canonical_path, canonical_root
        );
        return Err(RequestError::PathTraversal);
    }

    Ok(canonical_path)
}

/// Minimal HTML escaping for text and attribute values.
pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Directory listing
// ============================================================================

/// Read a directory's entries, sorted case-insensitively by name.
async fn read_listing(dir: &Path) -> Result<Vec<ListingEntry>, RequestError> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;

    while let Some(entry) = read_dir.next_entry().await? {
        let file_name = entry.file_name();
        let is_symlink = entry
            .file_type()
            .await
            .map(|t| t.is_symlink())
            .unwrap_or(false);
        // Follow symlinks so links to directories get a trailing slash.
        let is_dir = fs::metadata(entry.path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        entries.push(ListingEntry {
            name: file_name.to_string_lossy().into_owned(),
            href: urlencoding::encode_binary(&name_bytes(&file_name)).into_owned(),
            is_dir,
            is_symlink,
        });
    }

    entries.sort_by_key(|e| e.name.to_lowercase());
    Ok(entries)
}

/// Render the HTML page for a directory listing.
pub fn render_listing(display_path: &str, entries: &[ListingEntry]) -> String {
    let title = format!("Directory listing for {}", escape_html(display_path));

    let mut html = String::new();
    html.push_str("<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n</head>\n<body>\n", title));
    html.push_str(&format!("<h1>{}</h1>\n<hr>\n<ul>\n", title));

    for entry in entries {
        let mut href = entry.href.clone();
        if entry.is_dir {
            href.push('/');
        }
        let label = if entry.is_symlink {
            format!("{}@", entry.name)
        } else if entry.is_dir {
            format!("{}/", entry.name)
        } else {
            entry.name.clone()
        };
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            escape_html(&href),
            escape_html(&label)
        ));
    }

    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    html
}

// ============================================================================
// Handlers
// ============================================================================

/// Fallback handler for every path.
///
/// Directories get a redirect to the slashed URL, their `index.html`, or a
/// generated listing. Files are streamed by `ServeFile`, which handles
/// content types, ranges and conditional requests.
pub async fn serve_path(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, RequestError> {
    let method = request.method();
    if method != Method::GET && method != Method::HEAD {
        return Ok((StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "GET, HEAD")]).into_response());
    }

    let url_path = request.uri().path().to_string();
    let path = confine_to_root(&state.root_dir, resolve_path(&state.root_dir, &url_path)?)?;

    if path.is_dir() {
        if !url_path.ends_with('/') {
            return Ok(redirect_to_directory(request.uri()));
        }

        let index = path.join("index.html");
        if index.is_file() {
            return Ok(serve_file(&index, request).await);
        }

        debug!("Listing directory: {}", path.display());
        let entries = read_listing(&path).await?;
        let display_path = String::from_utf8_lossy(&urlencoding::decode_binary(url_path.as_bytes()))
            .into_owned();
        return Ok((
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            render_listing(&display_path, &entries),
        )
            .into_response());
    }

    if !path.is_file() || url_path.ends_with('/') {
        return Err(RequestError::NotFound);
    }

    Ok(serve_file(&path, request).await)
}

fn redirect_to_directory(uri: &Uri) -> Response {
    let location = match uri.query() {
        Some(query) => format!("{}/?{}", uri.path(), query),
        None => format!("{}/", uri.path()),
    };
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

async fn serve_file(path: &Path, request: Request) -> Response {
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str, is_dir: bool) -> ListingEntry {
        ListingEntry {
            name: name.to_string(),
            href: urlencoding::encode(name).into_owned(),
            is_dir,
            is_symlink: false,
        }
    }

    // ========================================================================
    // Path Resolution Tests
    // ========================================================================

    #[test]
    fn test_resolve_path_normal() {
        let root = PathBuf::from("/tmp/testroot");

        let result = resolve_path(&root, "/subdir/file.txt");
        assert_eq!(result.unwrap(), root.join("subdir/file.txt"));
    }

    #[test]
    fn test_resolve_path_root() {
        let root = PathBuf::from("/tmp/testroot");

        for path in ["", "/", "/.", "//", "/./."] {
            assert_eq!(resolve_path(&root, path).unwrap(), root, "{path}");
        }
    }

    #[test]
    fn test_resolve_path_normalizes_parent_dir() {
        let root = PathBuf::from("/tmp/testroot");

        assert_eq!(resolve_path(&root, "/a/../b").unwrap(), root.join("b"));
        assert_eq!(resolve_path(&root, "/a/b/../../c").unwrap(), root.join("c"));
        assert_eq!(
            resolve_path(&root, "/a//./b/").unwrap(),
            root.join("a/b")
        );
    }

    #[test]
    fn test_resolve_path_never_climbs_above_root() {
        let root = PathBuf::from("/tmp/testroot");

        assert_eq!(resolve_path(&root, "/..").unwrap(), root);
        assert_eq!(
            resolve_path(&root, "/../../etc/passwd").unwrap(),
            root.join("etc/passwd")
        );
        assert_eq!(
            resolve_path(&root, "/%2E%2E/%2e%2e/etc/passwd").unwrap(),
            root.join("etc/passwd")
        );
    }

    #[test]
    fn test_resolve_path_decodes_percent_escapes() {
        let root = PathBuf::from("/tmp/testroot");

        let result = resolve_path(&root, "/my%20video.mp4");
        assert_eq!(result.unwrap(), root.join("my video.mp4"));
    }

    #[test]
    fn test_resolve_path_rejects_null_bytes() {
        let root = PathBuf::from("/tmp/testroot");

        let result = resolve_path(&root, "/file%00.txt");
        assert!(matches!(result, Err(RequestError::InvalidPath(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_path_keeps_non_utf8_bytes() {
        use std::os::unix::ffi::OsStrExt;

        let root = PathBuf::from("/tmp/testroot");

        let result = resolve_path(&root, "/caf%E9.txt").unwrap();
        assert_eq!(result, root.join(OsStr::from_bytes(b"caf\xe9.txt")));
    }

    #[test]
    fn test_confine_to_root_with_real_fs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();

        std::fs::create_dir_all(root.join("subdir")).unwrap();
        std::fs::write(root.join("subdir/test.txt"), "test").unwrap();

        assert!(confine_to_root(&root, root.join("subdir/test.txt")).is_ok());
        assert!(confine_to_root(&root, root.join("subdir/missing.txt")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_confine_to_root_detects_symlink_escape() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();

        let outside_dir = TempDir::new().unwrap();
        std::fs::write(outside_dir.path().join("secret.txt"), "secret data").unwrap();
        std::os::unix::fs::symlink(outside_dir.path(), root.join("escape")).unwrap();

        let result = confine_to_root(&root, root.join("escape/secret.txt"));
        assert!(matches!(result, Err(RequestError::PathTraversal)));
    }

    // ========================================================================
    // Listing Tests
    // ========================================================================

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">Tom & 'Jerry'</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_render_listing() {
        let html = render_listing(
            "/media/",
            &[entry("clips", true), entry("my video.mp4", false)],
        );

        assert!(html.contains("<title>Directory listing for /media/</title>"));
        assert!(html.contains("<li><a href=\"clips/\">clips/</a></li>"));
        assert!(html.contains("<li><a href=\"my%20video.mp4\">my video.mp4</a></li>"));
    }

    #[test]
    fn test_render_listing_escapes_names() {
        let html = render_listing("/", &[entry("<script>.txt", false)]);

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;.txt"));
    }

    #[test]
    fn test_render_listing_marks_symlinks() {
        let link = ListingEntry {
            is_symlink: true,
            ..entry("latest", true)
        };
        let html = render_listing("/", &[link]);

        assert!(html.contains("<a href=\"latest/\">latest@</a>"));
    }

    #[tokio::test]
    async fn test_read_listing_sorts_case_insensitively() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("beta.txt"), "b").unwrap();
        std::fs::write(root.join("Alpha.txt"), "a").unwrap();
        std::fs::create_dir(root.join("gamma")).unwrap();

        let entries = read_listing(root).await.unwrap();
        assert_eq!(
            entries,
            vec![
                entry("Alpha.txt", false),
                entry("beta.txt", false),
                entry("gamma", true),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_listing_encodes_raw_name_bytes() {
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let name = OsStr::from_bytes(b"caf\xe9.txt");
        if std::fs::write(temp_dir.path().join(name), "x").is_err() {
            // Filesystem only accepts UTF-8 names.
            return;
        }

        let entries = read_listing(temp_dir.path()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].href, "caf%E9.txt");
        assert_eq!(entries[0].name, "caf\u{FFFD}.txt");
    }
}
