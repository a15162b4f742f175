//! Entity storage port
//!
//! The blog service keeps its records in an external store. Implementations
//! assign identifiers on creation; the rest of the system only parses them.

use std::cmp::Ordering;

use async_trait::async_trait;
use rpcshield_domain::{Blog, BlogDraft, BlogId, ListBlogPageRequest, Result};

/// Author whose records are hidden from page listings.
const HIDDEN_AUTHOR: &str = "Stephane";

/// Titles that stay visible even for [`HIDDEN_AUTHOR`].
const VISIBLE_TITLES: [&str; 2] = ["My Title", "My Second Title"];

/// Trait for blog record storage
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Store a new record and return it with its assigned id
    async fn create(&self, draft: BlogDraft) -> Result<Blog>;

    /// Fetch one record, `NotFound` if absent
    async fn read(&self, id: &BlogId) -> Result<Blog>;

    /// Replace every field but the id, `NotFound` if absent
    async fn update(&self, blog: Blog) -> Result<Blog>;

    /// Remove one record and return its id, `NotFound` if absent
    async fn delete(&self, id: &BlogId) -> Result<BlogId>;

    /// All records in storage order
    async fn list(&self) -> Result<Vec<Blog>>;

    /// One filtered, sorted and projected page of records
    async fn list_page(&self, request: ListBlogPageRequest) -> Result<Vec<Blog>> {
        Ok(page_of(self.list().await?, request))
    }
}

/// Apply the page-listing rules to `blogs`.
///
/// Records by the hidden author are dropped unless their title is allowed.
/// The rest are sorted by author descending then title ascending, reduced to
/// their summary, and windowed by `skip` and `limit` (zero means unbounded).
pub fn page_of(blogs: Vec<Blog>, request: ListBlogPageRequest) -> Vec<Blog> {
    let mut visible: Vec<Blog> = blogs
        .into_iter()
        .filter(|blog| {
            blog.author_id != HIDDEN_AUTHOR || VISIBLE_TITLES.contains(&blog.title.as_str())
        })
        .collect();

    visible.sort_by(|a, b| match b.author_id.cmp(&a.author_id) {
        Ordering::Equal => a.title.cmp(&b.title),
        other => other,
    });

    let skip = usize::try_from(request.skip).unwrap_or(usize::MAX);
    let limit = match request.limit {
        0 => usize::MAX,
        n => usize::try_from(n).unwrap_or(usize::MAX),
    };

    visible.iter().skip(skip).take(limit).map(Blog::summary).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog(n: u8, author: &str, title: &str) -> Blog {
        let id = BlogId::parse(&format!("{n:032x}")).unwrap();
        Blog::from_draft(
            id,
            BlogDraft {
                author_id: author.into(),
                title: title.into(),
                content: format!("content {n}"),
                tags: vec!["tag".into()],
            },
        )
    }

    fn fixture() -> Vec<Blog> {
        vec![
            blog(1, "Stephane", "My First Blog"),
            blog(2, "Stephane", "My Title"),
            blog(3, "Alice", "Zebra"),
            blog(4, "Bob", "Beta"),
            blog(5, "Stephane", "My Second Title"),
            blog(6, "Alice", "Apple"),
            blog(7, "Bob", "Alpha"),
        ]
    }

    fn titles(page: &[Blog]) -> Vec<&str> {
        page.iter().map(|b| b.title.as_str()).collect()
    }

    #[test]
    fn test_page_filters_and_sorts() {
        let page = page_of(fixture(), ListBlogPageRequest::default());

        assert_eq!(
            titles(&page),
            vec!["My Second Title", "My Title", "Alpha", "Beta", "Apple", "Zebra"]
        );
        assert!(page.iter().all(|b| b.content.is_empty() && b.tags.is_empty()));
    }

    #[test]
    fn test_page_window() {
        let page = page_of(fixture(), ListBlogPageRequest { skip: 2, limit: 3 });
        assert_eq!(titles(&page), vec!["Alpha", "Beta", "Apple"]);

        let page = page_of(fixture(), ListBlogPageRequest { skip: 5, limit: 10 });
        assert_eq!(titles(&page), vec!["Zebra"]);

        assert!(page_of(fixture(), ListBlogPageRequest { skip: 50, limit: 0 }).is_empty());
    }

    #[test]
    fn test_page_of_empty_store() {
        assert!(page_of(Vec::new(), ListBlogPageRequest { skip: 0, limit: 5 }).is_empty());
    }
}
