//! Utility functions and helpers

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Check if a path is inside a base directory, after resolving symlinks
pub fn is_subpath(path: &Path, base: &Path) -> bool {
    path.canonicalize()
        .ok()
        .and_then(|p| base.canonicalize().ok().map(|b| p.starts_with(&b)))
        .unwrap_or(false)
}

/// Get relative path from base to target
pub fn relative_path(from: &Path, to: &Path) -> Option<String> {
    pathdiff::diff_paths(to, from).map(|p| p.display().to_string())
}

/// Convert a file under `root` to the URL path a browser requests it by
pub fn path_to_module_id(root: &Path, path: &Path) -> String {
    let relative = relative_path(root, path).unwrap_or_else(|| path.display().to_string());
    let normalized = clean_path(&relative.replace('\\', "/"));
    format!("/{}", normalized.trim_start_matches('/'))
}

/// Clean a path by removing . and .. components
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if path.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining_secs = secs - (mins as f64 * 60.0);
        format!("{}m {:.2}s", mins, remaining_secs)
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("./foo/bar"), "foo/bar");
        assert_eq!(clean_path("foo/../bar"), "bar");
        assert_eq!(clean_path("/foo/./bar/../baz"), "/foo/baz");
    }

    #[test]
    fn test_is_subpath() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("a.txt");
        std::fs::write(&inner, "a").unwrap();
        assert!(is_subpath(&inner, dir.path()));

        let other = tempfile::tempdir().unwrap();
        let outer = other.path().join("b.txt");
        std::fs::write(&outer, "b").unwrap();
        assert!(!is_subpath(&outer, dir.path()));
        assert!(!is_subpath(&dir.path().join("missing"), dir.path()));
    }

    #[test]
    fn test_path_to_module_id() {
        let root = Path::new("/srv/site");
        assert_eq!(
            path_to_module_id(root, Path::new("/srv/site/css/app.css")),
            "/css/app.css"
        );
        assert_eq!(
            path_to_module_id(root, Path::new("/srv/site/index.html")),
            "/index.html"
        );
    }

    #[test]
    fn test_format_duration() {
        use std::time::Duration;

        assert_eq!(format_duration(Duration::from_millis(80)), "80ms");
        assert_eq!(format_duration(Duration::from_secs_f64(1.5)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5.00s");
    }
}
