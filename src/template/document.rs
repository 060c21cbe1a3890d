use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::coord::BlockPos;
use crate::template::island::TemplateIsland;

/// Highest document version this reader understands. Newer documents are
/// refused outright rather than read with fields silently dropped.
pub const FORMAT_VERSION: f64 = 1.0;

/// Placeholder entry written for a region with no weighted entries, so a
/// saved document can tell "region with empty table" apart from "no
/// regions at all".
pub const EMPTY_TABLE_KEY: &str = "blockid:meta";
pub const EMPTY_TABLE_VALUE: &str = "chance";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("malformed template document: {0}")]
    Malformed(String),

    #[error("template version is missing, unreadable or newer than supported")]
    UnsupportedVersion,

    #[error("template document has no name")]
    MissingIdentity,
}

/// The portable wire form of a template: a UTF-8 JSON mapping. Every field
/// except `version` and `name` is optional on read, so older documents and
/// bounding-box-only shells stay loadable.
///
/// Map keys are colon-joined integer tuples as literal strings:
/// `random_blocks` is keyed by absolute `"x:y:z"`, `structure` by relative
/// `"bx:by:bz"` with the normalized min corner as origin. A structure cell
/// is `"0:<kind>[:<variant>]"` for a literal block (variant omitted when
/// zero) or `"1:<localId>"` for a reference into the compacted `randoms`
/// table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TemplateDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startcoord: Option<BlockPos>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endcoord: Option<BlockPos>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub random_blocks: BTreeMap<String, u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub symbolic: BTreeMap<u32, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub randoms: BTreeMap<u32, BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub structure: BTreeMap<String, String>,
}

impl TemplateDocument {
    pub fn to_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        serde_json::to_vec(self).map_err(|e| DocumentError::Malformed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        serde_json::from_slice(bytes).map_err(|e| DocumentError::Malformed(e.to_string()))
    }

    /// The version guard: absent, non-numeric or negative versions are
    /// invalid, and versions newer than [`FORMAT_VERSION`] are refused.
    pub fn checked_version(&self) -> Result<f64, DocumentError> {
        let version = self
            .version
            .as_ref()
            .and_then(Value::as_f64)
            .ok_or(DocumentError::UnsupportedVersion)?;
        if version < 0.0 || version > FORMAT_VERSION {
            return Err(DocumentError::UnsupportedVersion);
        }
        Ok(version)
    }
}

/// Decodes a serialized document into a fresh island. No partial island is
/// ever produced: validation failures return before construction starts.
pub fn decode(bytes: &[u8]) -> Result<TemplateIsland, DocumentError> {
    let doc = TemplateDocument::from_bytes(bytes)?;
    TemplateIsland::from_document(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_newer_version() {
        let data = br#"{"version":2.0,"name":"a"}"#;
        assert_eq!(decode(data), Err(DocumentError::UnsupportedVersion));
    }

    #[test]
    fn test_rejects_missing_version() {
        let data = br#"{"name":"a"}"#;
        assert_eq!(decode(data), Err(DocumentError::UnsupportedVersion));
    }

    #[test]
    fn test_rejects_unparseable_or_negative_version() {
        assert_eq!(
            decode(br#"{"version":"new","name":"a"}"#),
            Err(DocumentError::UnsupportedVersion)
        );
        assert_eq!(
            decode(br#"{"version":-1,"name":"a"}"#),
            Err(DocumentError::UnsupportedVersion)
        );
    }

    #[test]
    fn test_rejects_missing_name() {
        let data = br#"{"version":1.0}"#;
        assert_eq!(decode(data), Err(DocumentError::MissingIdentity));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            decode(b"{not json"),
            Err(DocumentError::Malformed(_))
        ));
        assert!(matches!(decode(b"[1,2,3]"), Err(DocumentError::Malformed(_))));
    }

    #[test]
    fn test_shell_document_decodes() {
        let data = br#"{"version":1.0,"name":"shell","level":"overworld"}"#;
        let island = decode(data).unwrap();
        assert_eq!(island.name(), "shell");
        assert_eq!(island.world(), Some("overworld"));
        assert!(island.randoms().next().is_none());
        assert!(!island.has_changes());
    }
}
