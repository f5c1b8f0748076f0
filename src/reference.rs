//! Address reference dataset.
//!
//! A static JSON document listing the valid districts, villages and hamlets
//! of the clinic's catchment area (`alamat.json`). It is loaded once before
//! any processing, validated, and handed to the model as compact JSON text
//! alongside the base extraction and the address-correction pass.

use crate::error::ExtractError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// The loaded, read-only reference dataset.
#[derive(Debug, Clone)]
pub struct AddressReference {
    path: PathBuf,
    text: String,
    entries: usize,
}

impl AddressReference {
    /// Load and validate the dataset from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ExtractError::ReferenceNotFound {
                path: path.to_path_buf(),
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|e| ExtractError::ReferenceInvalid {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

        let mut reference =
            Self::from_json_str(&raw).map_err(|detail| ExtractError::ReferenceInvalid {
                path: path.to_path_buf(),
                detail,
            })?;
        reference.path = path.to_path_buf();

        info!(
            "Loaded address reference {} ({} top-level entries)",
            path.display(),
            reference.entries
        );
        Ok(reference)
    }

    /// Build a dataset from JSON text.
    ///
    /// The document must be a non-empty array or object.
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let entries = match &value {
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            _ => return Err("expected a JSON array or object".to_string()),
        };
        if entries == 0 {
            return Err("dataset is empty".to_string());
        }

        Ok(Self {
            path: PathBuf::new(),
            text: value.to_string(),
            entries,
        })
    }

    /// Compact JSON text sent to the model.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Where the dataset was loaded from (empty when built in memory).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of top-level entries.
    pub fn entries(&self) -> usize {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn compacts_json() {
        let r = AddressReference::from_json_str(
            r#"{
                "SIDOHARJO": { "JAMBANAN": ["PIJILAN", "GROMPOLAN"] }
            }"#,
        )
        .unwrap();
        assert_eq!(r.text(), r#"{"SIDOHARJO":{"JAMBANAN":["PIJILAN","GROMPOLAN"]}}"#);
        assert_eq!(r.entries(), 1);
    }

    #[test]
    fn rejects_scalars_and_empty_documents() {
        assert!(AddressReference::from_json_str("42").is_err());
        assert!(AddressReference::from_json_str("[]").is_err());
        assert!(AddressReference::from_json_str("{}").is_err());
        assert!(AddressReference::from_json_str("not json").is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = AddressReference::load("/definitely/not/alamat.json").unwrap_err();
        assert!(matches!(err, ExtractError::ReferenceNotFound { .. }));
    }

    #[test]
    fn loads_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"[{{"kecamatan": "SIDOHARJO", "desa": ["JAMBANAN", "TARAMAN"]}}]"#).unwrap();
        let r = AddressReference::load(f.path()).unwrap();
        assert_eq!(r.entries(), 1);
        assert_eq!(r.path(), f.path());
    }

    #[test]
    fn invalid_file_is_reported() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "kecamatan,desa").unwrap();
        let err = AddressReference::load(f.path()).unwrap_err();
        assert!(matches!(err, ExtractError::ReferenceInvalid { .. }));
    }
}
