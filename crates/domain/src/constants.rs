//! Application constants
//!
//! Fully qualified method paths and wire-level defaults shared by the client
//! runtime and the in-process peer.

/// Service name of the greet RPCs.
pub const GREET_SERVICE: &str = "greet.GreetService";
/// Unary greeting.
pub const METHOD_GREET: &str = "greet.GreetService/Greet";
/// Server stream of greetings.
pub const METHOD_GREET_MANY_TIMES: &str = "greet.GreetService/GreetManyTimes";
/// Client stream answered with one aggregate greeting.
pub const METHOD_LONG_GREET: &str = "greet.GreetService/LongGreet";
/// Bidirectional greeting session.
pub const METHOD_GREET_EVERYONE: &str = "greet.GreetService/GreetEveryone";
/// Unary greeting the peer answers slowly.
pub const METHOD_GREET_WITH_DEADLINE: &str = "greet.GreetService/GreetWithDeadline";

/// Service name of the blog CRUD RPCs.
pub const BLOG_SERVICE: &str = "blog.BlogService";
/// Store a new record.
pub const METHOD_CREATE_BLOG: &str = "blog.BlogService/CreateBlog";
/// Fetch one record.
pub const METHOD_READ_BLOG: &str = "blog.BlogService/ReadBlog";
/// Replace a record.
pub const METHOD_UPDATE_BLOG: &str = "blog.BlogService/UpdateBlog";
/// Remove a record.
pub const METHOD_DELETE_BLOG: &str = "blog.BlogService/DeleteBlog";
/// Stream every record.
pub const METHOD_LIST_BLOG: &str = "blog.BlogService/ListBlog";
/// One page of record summaries.
pub const METHOD_LIST_BLOG_PAGE: &str = "blog.BlogService/ListBlogPage";

// Wire defaults
/// Largest encoded outbound message, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;
/// Peer address used when none is configured.
pub const DEFAULT_SERVER_ADDR: &str = "localhost:10051";
/// Record store used when none is configured.
pub const DEFAULT_STORAGE_URI: &str = "memory://";

/// Outbound stream messages queued before `send` awaits capacity.
pub const STREAM_BUFFER: usize = 32;
