//! Blog service handlers
//!
//! Thin adapters from wire messages to an [`EntityStore`]. Storage errors
//! become statuses here; ids are validated before storage sees them.

use futures::stream::{self, StreamExt};
use rpcshield_core::{EntityStore, Payload, PayloadStream};
use rpcshield_domain::{
    BlogId, CreateBlogRequest, CreateBlogResponse, DeleteBlogRequest, DeleteBlogResponse,
    ListBlogPageRequest, ListBlogPageResponse, ListBlogResponse, ReadBlogRequest,
    ReadBlogResponse, RpcShieldError, Status, StatusCode, UpdateBlogRequest, UpdateBlogResponse,
};
use tracing::debug;

use super::{decode, encode};

fn status_of(err: RpcShieldError) -> Status {
    match err {
        RpcShieldError::NotFound(message) => Status::not_found(message),
        RpcShieldError::InvalidInput(_) => Status::invalid_argument("Cannot parse ID"),
        RpcShieldError::Transport(message) => Status::unavailable(message),
        other => Status::new(StatusCode::Internal, format!("Internal error: {other}")),
    }
}

fn parse_id(raw: &str) -> Result<BlogId, Status> {
    BlogId::parse(raw).map_err(status_of)
}

pub(super) async fn create(store: &dyn EntityStore, request: Payload) -> Result<Payload, Status> {
    let request: CreateBlogRequest = decode(request)?;
    let blog = store.create(request.blog).await.map_err(status_of)?;
    encode(&CreateBlogResponse { blog })
}

pub(super) async fn read(store: &dyn EntityStore, request: Payload) -> Result<Payload, Status> {
    let request: ReadBlogRequest = decode(request)?;
    let id = parse_id(&request.blog_id)?;
    let blog = store.read(&id).await.map_err(status_of)?;
    encode(&ReadBlogResponse { blog })
}

pub(super) async fn update(store: &dyn EntityStore, request: Payload) -> Result<Payload, Status> {
    let mut request: UpdateBlogRequest = decode(request)?;
    request.blog.id = parse_id(request.blog.id.as_str())?;
    let blog = store.update(request.blog).await.map_err(status_of)?;
    encode(&UpdateBlogResponse { blog })
}

pub(super) async fn delete(store: &dyn EntityStore, request: Payload) -> Result<Payload, Status> {
    let request: DeleteBlogRequest = decode(request)?;
    let id = parse_id(&request.blog_id)?;
    let deleted = store.delete(&id).await.map_err(status_of)?;
    encode(&DeleteBlogResponse { blog_id: deleted.to_string() })
}

pub(super) async fn list_page(
    store: &dyn EntityStore,
    request: Payload,
) -> Result<Payload, Status> {
    let request: ListBlogPageRequest = decode(request)?;
    let blogs = store.list_page(request).await.map_err(status_of)?;
    debug!(skip = request.skip, limit = request.limit, returned = blogs.len(), "page listed");
    encode(&ListBlogPageResponse { blogs })
}

/// Snapshot of every record, streamed one per message.
pub(super) async fn list(store: &dyn EntityStore) -> Result<PayloadStream, Status> {
    let blogs = store.list().await.map_err(status_of)?;
    let replies: Vec<_> =
        blogs.into_iter().map(|blog| encode(&ListBlogResponse { blog })).collect();
    Ok(stream::iter(replies).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_statuses() {
        assert_eq!(status_of(RpcShieldError::NotFound("x".into())).code, StatusCode::NotFound);
        assert_eq!(
            status_of(RpcShieldError::InvalidInput("bad".into())),
            Status::invalid_argument("Cannot parse ID")
        );
        assert_eq!(status_of(RpcShieldError::Storage("disk".into())).code, StatusCode::Internal);
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert_eq!(parse_id("nope").unwrap_err().code, StatusCode::InvalidArgument);
        assert!(parse_id("0123456789abcdef0123456789abcdef").is_ok());
    }
}
