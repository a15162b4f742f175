//! Blog service client

use rpcshield_core::{CallContext, Endpoint, ResponseStream};
use rpcshield_domain::constants::{
    METHOD_CREATE_BLOG, METHOD_DELETE_BLOG, METHOD_LIST_BLOG, METHOD_LIST_BLOG_PAGE,
    METHOD_READ_BLOG, METHOD_UPDATE_BLOG,
};
use rpcshield_domain::{
    Blog, BlogDraft, CallOutcome, CreateBlogRequest, CreateBlogResponse, DeleteBlogRequest,
    DeleteBlogResponse, ListBlogPageRequest, ListBlogPageResponse, ListBlogRequest,
    ListBlogResponse, ReadBlogRequest, ReadBlogResponse, Result, UpdateBlogRequest,
    UpdateBlogResponse,
};
use tracing::{debug, instrument};

use crate::context::EndpointFactory;

/// CRUD over blog records held by the storage collaborator.
///
/// Ids are passed as the peer's string form; a malformed id fails with
/// `InvalidArgument` and a missing record with `NotFound`.
#[derive(Clone)]
pub struct BlogClient {
    create: Endpoint<CreateBlogRequest, CreateBlogResponse>,
    read: Endpoint<ReadBlogRequest, ReadBlogResponse>,
    update: Endpoint<UpdateBlogRequest, UpdateBlogResponse>,
    delete: Endpoint<DeleteBlogRequest, DeleteBlogResponse>,
    list: Endpoint<ListBlogRequest, ResponseStream<ListBlogResponse>>,
    list_page: Endpoint<ListBlogPageRequest, ListBlogPageResponse>,
}

impl BlogClient {
    /// Build every blog endpoint from `endpoints`.
    pub fn new(endpoints: &EndpointFactory) -> Result<Self> {
        Ok(Self {
            create: endpoints.unary(METHOD_CREATE_BLOG)?,
            read: endpoints.unary(METHOD_READ_BLOG)?,
            update: endpoints.unary(METHOD_UPDATE_BLOG)?,
            delete: endpoints.unary(METHOD_DELETE_BLOG)?,
            list: endpoints.server_stream(METHOD_LIST_BLOG)?,
            list_page: endpoints.unary(METHOD_LIST_BLOG_PAGE)?,
        })
    }

    /// Store `draft`; the peer assigns the id.
    #[instrument(skip_all, fields(author = %draft.author_id))]
    pub async fn create(&self, ctx: &CallContext, draft: BlogDraft) -> CallOutcome<Blog> {
        let response = self.create.invoke(ctx, CreateBlogRequest { blog: draft }).await?;
        debug!(id = %response.blog.id, "blog created");
        Ok(response.blog)
    }

    /// Fetch the record with `blog_id`.
    #[instrument(skip(self, ctx))]
    pub async fn read(&self, ctx: &CallContext, blog_id: &str) -> CallOutcome<Blog> {
        let request = ReadBlogRequest { blog_id: blog_id.to_string() };
        Ok(self.read.invoke(ctx, request).await?.blog)
    }

    /// Replace the record with `blog.id`. Never creates one.
    #[instrument(skip_all, fields(id = %blog.id))]
    pub async fn update(&self, ctx: &CallContext, blog: Blog) -> CallOutcome<Blog> {
        Ok(self.update.invoke(ctx, UpdateBlogRequest { blog }).await?.blog)
    }

    /// Returns the id of the deleted record.
    #[instrument(skip(self, ctx))]
    pub async fn delete(&self, ctx: &CallContext, blog_id: &str) -> CallOutcome<String> {
        let request = DeleteBlogRequest { blog_id: blog_id.to_string() };
        Ok(self.delete.invoke(ctx, request).await?.blog_id)
    }

    /// Stream every record.
    pub async fn list(&self, ctx: &CallContext) -> CallOutcome<ResponseStream<ListBlogResponse>> {
        self.list.invoke(ctx, ListBlogRequest {}).await
    }

    /// Drain [`list`](Self::list) into memory.
    pub async fn list_all(&self, ctx: &CallContext) -> CallOutcome<Vec<Blog>> {
        let responses = self.list(ctx).await?.collect_all().await?;
        Ok(responses.into_iter().map(|response| response.blog).collect())
    }

    /// Filtered, sorted summaries; `limit == 0` returns everything after
    /// `skip`.
    #[instrument(skip(self, ctx))]
    pub async fn list_page(
        &self,
        ctx: &CallContext,
        skip: u64,
        limit: u64,
    ) -> CallOutcome<Vec<Blog>> {
        let response = self.list_page.invoke(ctx, ListBlogPageRequest { skip, limit }).await?;
        Ok(response.blogs)
    }
}
