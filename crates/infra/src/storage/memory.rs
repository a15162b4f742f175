//! In-memory record store
//!
//! Records keep their insertion order, which is the order `list` returns.
//! Identifiers are random 128-bit values rendered as 32 hex characters.

use async_trait::async_trait;
use parking_lot::RwLock;
use rpcshield_core::EntityStore;
use rpcshield_domain::{Blog, BlogDraft, BlogId, Result, RpcShieldError};
use tracing::debug;
use uuid::Uuid;

/// Record store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    records: RwLock<Vec<Blog>>,
}

impl InMemoryEntityStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn not_found(id: &BlogId) -> RpcShieldError {
    RpcShieldError::NotFound(format!("Cannot find blog with specified ID: {id}"))
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn create(&self, draft: BlogDraft) -> Result<Blog> {
        let id = BlogId::parse(&Uuid::new_v4().simple().to_string())?;
        let blog = Blog::from_draft(id, draft);
        self.records.write().push(blog.clone());
        debug!(id = %blog.id, "blog created");
        Ok(blog)
    }

    async fn read(&self, id: &BlogId) -> Result<Blog> {
        let records = self.records.read();
        records.iter().find(|blog| &blog.id == id).cloned().ok_or_else(|| not_found(id))
    }

    async fn update(&self, blog: Blog) -> Result<Blog> {
        let mut records = self.records.write();
        let slot = records.iter_mut().find(|stored| stored.id == blog.id);
        match slot {
            Some(stored) => {
                *stored = blog.clone();
                debug!(id = %blog.id, "blog updated");
                Ok(blog)
            }
            None => Err(not_found(&blog.id)),
        }
    }

    async fn delete(&self, id: &BlogId) -> Result<BlogId> {
        let mut records = self.records.write();
        let position =
            records.iter().position(|blog| &blog.id == id).ok_or_else(|| not_found(id))?;
        records.remove(position);
        debug!(%id, "blog deleted");
        Ok(id.clone())
    }

    async fn list(&self) -> Result<Vec<Blog>> {
        Ok(self.records.read().clone())
    }
}
