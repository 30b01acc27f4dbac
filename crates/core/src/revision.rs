use serde_json::Value;

use crate::{Attachment, CoreError, DocNumericId, RevId, Sequence};

/// Body stored for tombstones and stub revisions.
pub const EMPTY_BODY: &[u8] = b"{}";

/// A snapshot of one stored revision.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRevision {
    pub doc_id: String,
    pub doc_numeric_id: DocNumericId,
    pub rev_id: RevId,
    pub sequence: Sequence,
    pub parent_sequence: Option<Sequence>,
    pub deleted: bool,
    pub current: bool,
    pub available: bool,
    pub body: Vec<u8>,
    pub attachments: Vec<Attachment>,
}

impl DocumentRevision {
    pub fn generation(&self) -> u64 {
        self.rev_id.generation()
    }

    pub fn body_json(&self) -> Result<Value, CoreError> {
        serde_json::from_slice(&self.body).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.name == name)
    }
}

/// Reject anything that is not a JSON object.
pub fn validate_body(body: &[u8]) -> Result<(), CoreError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| CoreError::InvalidBody(e.to_string()))?;
    if !value.is_object() {
        return Err(CoreError::InvalidBody("document body must be a JSON object".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_objects_only() {
        assert!(validate_body(br#"{"x":1}"#).is_ok());
        assert!(validate_body(EMPTY_BODY).is_ok());
        assert!(validate_body(b"[1,2]").is_err());
        assert!(validate_body(b"42").is_err());
        assert!(validate_body(b"{not json").is_err());
    }
}
