use serde::{Deserialize, Serialize};

use crate::{BlobHash, CoreError};

/// How the stored attachment bytes are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Plain,
    Gzip,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Gzip => "gzip",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "plain" => Ok(Self::Plain),
            "gzip" => Ok(Self::Gzip),
            _ => Err(CoreError::InvalidData(format!("unknown attachment encoding: {s}"))),
        }
    }
}

/// An attachment associated with a stored revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub encoding: Encoding,
    /// Decoded length in bytes.
    pub length: u64,
    /// Length of the bytes held by the blob store.
    pub encoded_length: u64,
    pub digest: BlobHash,
    /// Generation of the revision that first introduced these bytes.
    pub revpos: u64,
}

/// Attachment bytes supplied by a caller, not yet written to the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsavedAttachment {
    pub name: String,
    pub content_type: String,
    pub encoding: Encoding,
    pub length: u64,
    pub data: Vec<u8>,
}

impl UnsavedAttachment {
    pub fn plain(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            encoding: Encoding::Plain,
            length: data.len() as u64,
            data,
        }
    }

    /// Already-encoded bytes; `length` is the decoded size reported by the sender.
    pub fn encoded(
        name: impl Into<String>,
        content_type: impl Into<String>,
        encoding: Encoding,
        length: u64,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            encoding,
            length,
            data,
        }
    }

    pub fn digest(&self) -> BlobHash {
        BlobHash::of(&self.data)
    }
}

/// Attachment edits carried by an update. Anything not named here is
/// copied forward from the parent revision.
#[derive(Debug, Clone, Default)]
pub struct AttachmentChanges {
    pub put: Vec<UnsavedAttachment>,
    pub remove: Vec<String>,
}

impl AttachmentChanges {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn put(mut self, attachment: UnsavedAttachment) -> Self {
        self.put.push(attachment);
        self
    }

    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.remove.push(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.put.is_empty() && self.remove.is_empty()
    }
}
