//! YAML manifest templates shipped alongside the operator.

use crate::error::ImageError;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Loads and parses a YAML manifest.
///
/// Returns `Ok(None)` when the file does not exist so callers can fall back
/// to built-in defaults.
pub async fn load_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ImageError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Template {} not present", path.display());
            return Ok(None);
        }
        Err(e) => return Err(ImageError::Io(e)),
    };
    parse(&raw, path).map(Some)
}

/// Parses a YAML manifest, naming `path` in errors.
pub fn parse<T: DeserializeOwned>(raw: &str, path: &Path) -> Result<T, ImageError> {
    serde_yaml::from_str(raw).map_err(|e| ImageError::Template {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
