//! Blog client CRUD against the in-process peer and in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use rpcshield_core::CallContext;
use rpcshield_domain::constants::{METHOD_DELETE_BLOG, METHOD_READ_BLOG, METHOD_UPDATE_BLOG};
use rpcshield_domain::{Blog, BlogDraft, BlogId, FailureKind};
use rpcshield_infra::InProcessTransport;
use tokio_test::{assert_err, assert_ok};

use support::{app, app_with, without_retries};

const MISSING_ID: &str = "0123456789abcdef0123456789abcdef";

fn draft(author: &str, title: &str) -> BlogDraft {
    BlogDraft {
        author_id: author.into(),
        title: title.into(),
        content: format!("Content of {title}"),
        tags: vec!["article".into()],
    }
}

#[tokio::test(start_paused = true)]
async fn test_crud_round_trip() {
    let (app, _peer) = app();
    let ctx = CallContext::background();

    let created = assert_ok!(app.blog.create(&ctx, draft("Stephane", "My First Blog")).await);
    assert_eq!(created.title, "My First Blog");
    assert_eq!(created.tags, vec!["article".to_string()]);

    let read = assert_ok!(app.blog.read(&ctx, created.id.as_str()).await);
    assert_eq!(read, created);

    let edited = Blog {
        author_id: "Changed Author".into(),
        title: "My First Blog (edited)".into(),
        content: "Content of the first blog, with some awesome additions!".into(),
        ..created.clone()
    };
    let updated = assert_ok!(app.blog.update(&ctx, edited.clone()).await);
    assert_eq!(updated, edited);
    assert_eq!(assert_ok!(app.blog.read(&ctx, created.id.as_str()).await), edited);

    let deleted = assert_ok!(app.blog.delete(&ctx, created.id.as_str()).await);
    assert_eq!(deleted, created.id.to_string());

    let failure = assert_err!(app.blog.read(&ctx, &deleted).await);
    assert_eq!(failure.kind, FailureKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn test_missing_records_are_retried_under_the_default_policy() {
    let (app, peer) = app();

    let failure = assert_err!(app.blog.read(&CallContext::background(), MISSING_ID).await);

    assert_eq!(failure.kind, FailureKind::NotFound);
    assert_eq!(peer.faults().calls(METHOD_READ_BLOG), 3);
}

#[tokio::test]
async fn test_update_of_a_missing_record_never_creates_it() {
    let peer = InProcessTransport::default();
    let app = app_with(&peer, without_retries());
    let ctx = CallContext::background();

    let ghost = Blog::from_draft(BlogId::parse(MISSING_ID).unwrap(), draft("Lucy", "Ghost"));
    let failure = assert_err!(app.blog.update(&ctx, ghost).await);

    assert_eq!(failure.kind, FailureKind::NotFound);
    assert_eq!(peer.faults().calls(METHOD_UPDATE_BLOG), 1);
    assert!(assert_ok!(app.blog.list_all(&ctx).await).is_empty());
}

#[tokio::test]
async fn test_delete_of_a_missing_record_is_not_found() {
    let peer = InProcessTransport::default();
    let app = app_with(&peer, without_retries());

    let failure = assert_err!(app.blog.delete(&CallContext::background(), MISSING_ID).await);

    assert_eq!(failure.kind, FailureKind::NotFound);
    assert_eq!(peer.faults().calls(METHOD_DELETE_BLOG), 1);
}

#[tokio::test]
async fn test_malformed_ids_are_rejected_without_retry() {
    let (app, peer) = app();
    let ctx = CallContext::background();

    for bad in ["", "not-an-id", "5bdc29e661b75adcac496cf4"] {
        let failure = assert_err!(app.blog.read(&ctx, bad).await);
        assert_eq!(failure.kind, FailureKind::InvalidArgument);
        assert_eq!(failure.detail, "Cannot parse ID");
    }
    assert_eq!(peer.faults().calls(METHOD_READ_BLOG), 3);
}

#[tokio::test]
async fn test_list_streams_every_record_in_insertion_order() {
    let (app, _peer) = app();
    let ctx = CallContext::background();

    let mut ids = Vec::new();
    for title in ["one", "two", "three"] {
        ids.push(assert_ok!(app.blog.create(&ctx, draft("Mark", title)).await).id);
    }

    let listed = assert_ok!(app.blog.list_all(&ctx).await);
    assert_eq!(listed.into_iter().map(|blog| blog.id).collect::<Vec<_>>(), ids);
}

#[tokio::test]
async fn test_list_page_filters_sorts_and_projects() {
    let (app, _peer) = app();
    let ctx = CallContext::background();

    for (author, title) in [
        ("Stephane", "My Title"),
        ("Lucy", "B"),
        ("Stephane", "Hidden"),
        ("Mark", "Z"),
        ("Stephane", "My Second Title"),
        ("Lucy", "A"),
    ] {
        assert_ok!(app.blog.create(&ctx, draft(author, title)).await);
    }

    let keys = |page: Vec<Blog>| -> Vec<(String, String)> {
        page.into_iter().map(|blog| (blog.author_id, blog.title)).collect()
    };

    let everything = assert_ok!(app.blog.list_page(&ctx, 0, 0).await);
    assert!(everything.iter().all(|blog| blog.content.is_empty() && blog.tags.is_empty()));
    assert_eq!(
        keys(everything),
        vec![
            ("Stephane".to_string(), "My Second Title".to_string()),
            ("Stephane".to_string(), "My Title".to_string()),
            ("Mark".to_string(), "Z".to_string()),
            ("Lucy".to_string(), "A".to_string()),
            ("Lucy".to_string(), "B".to_string()),
        ]
    );

    let window = assert_ok!(app.blog.list_page(&ctx, 1, 2).await);
    assert_eq!(
        keys(window),
        vec![
            ("Stephane".to_string(), "My Title".to_string()),
            ("Mark".to_string(), "Z".to_string()),
        ]
    );

    assert!(assert_ok!(app.blog.list_page(&ctx, 10, 5).await).is_empty());
}
