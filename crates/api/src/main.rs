//! rpcshield - demo client
//!
//! Walks every greet and blog RPC once against the in-process peer and logs
//! the results.

use std::time::Duration;

use anyhow::{Context, Result};
use rpcshield_app::AppContext;
use rpcshield_core::{CallContext, Pacing};
use rpcshield_domain::{BlogDraft, FailureKind, Greeting};
use tracing::{info, warn};

const LONG_GREET_NAMES: [&str; 5] = ["Stephane", "John", "Lucy", "Mark", "Piper"];
const STREAM_PACING: Duration = Duration::from_secs(1);

async fn run_greet(app: &AppContext, ctx: &CallContext) -> Result<()> {
    let greet = app.greet.clone().with_pacing(Pacing::Fixed(STREAM_PACING));

    let result = greet.greet(ctx, Greeting::new("ming", "hsu")).await?;
    info!(%result, "greet");

    let mut replies = greet.greet_many_times(ctx, Greeting::new("Stephane", "Maarek")).await?;
    while let Some(reply) = replies.next().await {
        let reply = reply?;
        info!(result = %reply.result, "greet many times");
    }

    let result = greet.long_greet(ctx, LONG_GREET_NAMES).await?;
    info!(%result, "long greet");

    for result in greet.greet_everyone(ctx, LONG_GREET_NAMES).await? {
        info!(%result, "greet everyone");
    }

    for timeout in [Duration::from_secs(5), Duration::from_secs(1)] {
        let greeting = Greeting::new("Stephane", "Maarek");
        match greet.greet_with_deadline(ctx, greeting, timeout).await {
            Ok(result) => info!(%result, ?timeout, "greet with deadline"),
            Err(failure) if failure.kind == FailureKind::DeadlineExceeded => {
                warn!(?timeout, "deadline was exceeded")
            }
            Err(failure) => return Err(failure.into()),
        }
    }
    Ok(())
}

async fn run_blog(app: &AppContext, ctx: &CallContext) -> Result<()> {
    let blog = &app.blog;

    let created = blog
        .create(
            ctx,
            BlogDraft {
                author_id: "Stephane".into(),
                title: "My First Blog".into(),
                content: "Content of the first blog".into(),
                tags: Vec::new(),
            },
        )
        .await?;
    info!(id = %created.id, "blog created");

    let read = blog.read(ctx, created.id.as_str()).await?;
    info!(title = %read.title, "blog read");

    let mut edited = read.clone();
    edited.author_id = "Changed Author".into();
    edited.title = "My First Blog (edited)".into();
    edited.content = "Content of the first blog, with some awesome additions!".into();
    let updated = blog.update(ctx, edited).await?;
    info!(author = %updated.author_id, title = %updated.title, "blog updated");

    for entry in blog.list_all(ctx).await? {
        info!(id = %entry.id, title = %entry.title, "blog listed");
    }

    let deleted = blog.delete(ctx, created.id.as_str()).await?;
    info!(id = %deleted, "blog deleted");

    match blog.read(ctx, &deleted).await {
        Err(failure) if failure.kind == FailureKind::NotFound => info!("deleted blog is gone"),
        Err(failure) => return Err(failure.into()),
        Ok(_) => warn!(id = %deleted, "deleted blog is still readable"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG and RPCSHIELD_* from the file apply
    let env_file = dotenvy::dotenv();
    rpcshield_infra::init_tracing().context("failed to install tracing subscriber")?;
    match env_file {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(err) => info!(error = %err, "no .env file loaded"),
    }

    let app = AppContext::new().context("failed to build application context")?;
    let ctx = CallContext::background();

    run_greet(&app, &ctx).await.context("greet demo failed")?;
    run_blog(&app, &ctx).await.context("blog demo failed")?;

    app.shutdown();
    Ok(())
}
