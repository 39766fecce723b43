//! Cache-path expansion and validation.

use std::path::{Component, Path, PathBuf};

use wh_domain::error::{Error, Result};

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Validate a filesystem path: rejects empty paths, NUL bytes,
/// post-normalization `..` segments, and paths escaping `base` when one is
/// given.
pub fn validate_path(path: &Path, base: Option<&Path>) -> Result<()> {
    let raw = path.as_os_str();
    if raw.is_empty() {
        return Err(Error::validation("path is empty"));
    }
    if path.to_string_lossy().contains('\0') {
        return Err(Error::validation("path contains a NUL byte"));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::validation(format!(
            "path '{}' contains a parent-directory segment",
            path.display()
        )));
    }
    if let Some(base) = base {
        if !path.starts_with(base) {
            return Err(Error::validation(format!(
                "path '{}' escapes base directory '{}'",
                path.display(),
                base.display()
            )));
        }
    }
    Ok(())
}

/// The default cache file location.
pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wormhole")
        .join("models.json")
}

/// Resolve the configured cache path, falling back to the safe default
/// when the configured value fails validation.
pub fn resolve_cache_path(configured: Option<&str>) -> PathBuf {
    match configured {
        Some(raw) => {
            let expanded = expand_home(raw);
            match validate_path(&expanded, None) {
                Ok(()) => expanded,
                Err(e) => {
                    tracing::warn!(
                        path = %raw,
                        error = %e,
                        "configured cache path rejected, using default"
                    );
                    default_cache_path()
                }
            }
        }
        None => default_cache_path(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_is_rejected() {
        assert!(validate_path(Path::new(""), None).is_err());
    }

    #[test]
    fn parent_segments_are_rejected() {
        assert!(validate_path(Path::new("/tmp/../etc/passwd"), None).is_err());
        assert!(validate_path(Path::new("cache/../../x"), None).is_err());
    }

    #[test]
    fn nul_byte_is_rejected() {
        let raw = String::from("/tmp/bad\0name");
        assert!(validate_path(Path::new(&raw), None).is_err());
    }

    #[test]
    fn plain_path_passes() {
        assert!(validate_path(Path::new("/tmp/wormhole/models.json"), None).is_ok());
    }

    #[test]
    fn base_escape_is_rejected() {
        let base = Path::new("/var/cache/wormhole");
        assert!(validate_path(Path::new("/var/cache/wormhole/models.json"), Some(base)).is_ok());
        assert!(validate_path(Path::new("/etc/passwd"), Some(base)).is_err());
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x/y.json"), home.join("x/y.json"));
        }
    }

    #[test]
    fn invalid_configured_path_falls_back_to_default() {
        let resolved = resolve_cache_path(Some("/tmp/../../etc/passwd"));
        assert_eq!(resolved, default_cache_path());
    }
}
