//! Blog records and the CRUD messages that carry them
//!
//! Records live in an external storage service. Identity is assigned by
//! storage on creation and never changes afterwards; every other field can be
//! replaced through an update.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, RpcShieldError};

/// Length of a storage-assigned identifier in hex characters.
pub const BLOG_ID_LEN: usize = 32;

/// Opaque identifier assigned by storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlogId(String);

impl BlogId {
    /// Parse an identifier received over the wire.
    ///
    /// # Errors
    /// Returns `RpcShieldError::InvalidInput` unless the input is exactly
    /// [`BLOG_ID_LEN`] hexadecimal characters.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != BLOG_ID_LEN || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RpcShieldError::InvalidInput(format!("Cannot parse ID: {raw:?}")));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    /// The identifier as lowercase hex.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlogDraft {
    /// Owner of the record.
    pub author_id: String,
    /// Headline.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Free-form labels, empty when absent on the wire.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blog {
    /// Storage-assigned identity.
    pub id: BlogId,
    /// Owner of the record.
    pub author_id: String,
    /// Headline.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Free-form labels.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Blog {
    /// Attach the identity storage assigned to `draft`.
    pub fn from_draft(id: BlogId, draft: BlogDraft) -> Self {
        Self {
            id,
            author_id: draft.author_id,
            title: draft.title,
            content: draft.content,
            tags: draft.tags,
        }
    }

    /// Copy of this record reduced to the fields returned by page listings.
    pub fn summary(&self) -> Self {
        Self {
            id: self.id.clone(),
            author_id: self.author_id.clone(),
            title: self.title.clone(),
            content: String::new(),
            tags: Vec::new(),
        }
    }
}

/// Create a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBlogRequest {
    /// Fields of the new record.
    pub blog: BlogDraft,
}

/// The record as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBlogResponse {
    /// The record.
    pub blog: Blog,
}

/// Fetch one record by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadBlogRequest {
    /// Raw identifier, validated by the peer.
    pub blog_id: String,
}

/// The fetched record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadBlogResponse {
    /// The record.
    pub blog: Blog,
}

/// Replace every field of an existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBlogRequest {
    /// The record.
    pub blog: Blog,
}

/// The record after the update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBlogResponse {
    /// The record.
    pub blog: Blog,
}

/// Remove a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBlogRequest {
    /// Raw identifier, validated by the peer.
    pub blog_id: String,
}

/// Identifier of the removed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBlogResponse {
    /// Raw identifier, validated by the peer.
    pub blog_id: String,
}

/// Stream every stored record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListBlogRequest {}

/// One item of the listing stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBlogResponse {
    /// The record.
    pub blog: Blog,
}

/// Page request; a `limit` of zero means "no limit".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListBlogPageRequest {
    /// Records to skip from the start.
    pub skip: u64,
    /// Page size.
    pub limit: u64,
}

/// One page of record summaries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListBlogPageResponse {
    /// Summaries in storage order.
    pub blogs: Vec<Blog>,
}
