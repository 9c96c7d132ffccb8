//! Concurrent segment fetching
//!
//! Plan entries are fed through a bounded `buffer_unordered` pool. Each
//! worker checks the resume cache, streams the body through the shared
//! rate limiter into a `.part` file, and renames it into place only when
//! the full body is on disk. A fatal failure cancels the pool; segments
//! already completed stay on disk for the next run.

use futures::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;
use crate::retry;
use crate::types::{Event, PlanEntry, SegmentPlan};

/// Shared state handed to every segment worker
pub(crate) struct FetchContext {
    pub client: reqwest::Client,
    pub limiter: RateLimiter,
    pub retry: RetryConfig,
    pub auth_token: Option<String>,
    pub cancel: CancellationToken,
    pub event_tx: broadcast::Sender<Event>,
}

/// Download every plan entry, `workers` segments at a time.
///
/// Returns the number of bytes actually transferred (resumed segments
/// contribute nothing). The first fatal error cancels in-flight workers
/// and is returned once they have wound down; a real failure is preferred
/// over the `Cancelled` errors it triggers in sibling workers.
pub(crate) async fn fetch_plan(
    ctx: &FetchContext,
    plan: &SegmentPlan,
    workers: usize,
) -> Result<u64> {
    let total = plan.entries.len();
    let completed = Arc::new(AtomicUsize::new(0));
    let bytes_total = Arc::new(AtomicU64::new(0));

    let mut results = futures::stream::iter(plan.entries.iter())
        .map(|entry| {
            let completed = completed.clone();
            let bytes_total = bytes_total.clone();
            async move { fetch_entry(ctx, entry, total, &completed, &bytes_total).await }
        })
        .buffer_unordered(workers.max(1));

    let mut first_error: Option<Error> = None;
    while let Some(result) = results.next().await {
        if let Err(err) = result {
            ctx.cancel.cancel();
            let replace = match (&first_error, &err) {
                (None, _) => true,
                (Some(Error::Cancelled), other) => !matches!(other, Error::Cancelled),
                _ => false,
            };
            if replace {
                first_error = Some(err);
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(bytes_total.load(Ordering::SeqCst)),
    }
}

async fn fetch_entry(
    ctx: &FetchContext,
    entry: &PlanEntry,
    total: usize,
    completed: &AtomicUsize,
    bytes_total: &AtomicU64,
) -> Result<()> {
    if ctx.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    if already_complete(&entry.target, entry.descriptor.expected_bytes).await {
        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(index = entry.descriptor.index, "segment already on disk, skipping");
        let _ = ctx.event_tx.send(Event::SegmentSkipped {
            index: entry.descriptor.index,
            completed: done,
            total,
        });
        return Ok(());
    }

    let attempts = AtomicU32::new(0);
    let result = retry::with_backoff(&ctx.retry, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        fetch_once(ctx, entry)
    })
    .await;

    match result {
        Ok(written) => {
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            let bytes = bytes_total.fetch_add(written, Ordering::SeqCst) + written;
            let _ = ctx.event_tx.send(Event::SegmentCompleted {
                index: entry.descriptor.index,
                completed: done,
                total,
                bytes_total: bytes,
            });
            Ok(())
        }
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(err) => Err(Error::SegmentDownload {
            index: entry.descriptor.index,
            url: entry.descriptor.url.clone(),
            attempts: attempts.load(Ordering::SeqCst),
            reason: err.to_string(),
        }),
    }
}

/// Resume check: only fully-written files are ever renamed to the target
/// name, so an existing file of the right size is a finished segment.
/// Without an advertised size, any non-empty file counts.
async fn already_complete(target: &Path, expected_bytes: Option<u64>) -> bool {
    match tokio::fs::metadata(target).await {
        Ok(metadata) => match expected_bytes {
            Some(expected) => metadata.len() == expected,
            None => metadata.len() > 0,
        },
        Err(_) => false,
    }
}

/// One streamed fetch attempt: GET, throttle, write to `.part`, rename.
async fn fetch_once(ctx: &FetchContext, entry: &PlanEntry) -> Result<u64> {
    let part = part_path(&entry.target);

    let mut request = ctx.client.get(&entry.descriptor.url);
    if let Some(token) = &ctx.auth_token {
        request = request.header("Authorization", format!("OAuth {token}"));
    }
    if let Some((offset, length)) = entry.descriptor.byte_range {
        let last = offset + length - 1;
        request = request.header("Range", format!("bytes={offset}-{last}"));
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Status {
            code: status.as_u16(),
            url: entry.descriptor.url.clone(),
        });
    }

    // File::create truncates, so a torn .part from an aborted attempt is
    // overwritten rather than appended to
    let mut file = tokio::fs::File::create(&part).await?;
    let mut body = response.bytes_stream();
    let mut written: u64 = 0;

    loop {
        tokio::select! {
            () = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            chunk = body.next() => {
                let Some(chunk) = chunk else { break };
                let chunk = chunk?;
                ctx.limiter.acquire(chunk.len() as u64).await;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
        }
    }

    file.flush().await?;
    drop(file);

    if let Some(expected) = entry.descriptor.expected_bytes
        && written != expected
    {
        // UnexpectedEof is retryable; the next attempt truncates the .part
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {expected} bytes, received {written}"),
        )));
    }

    tokio::fs::rename(&part, &entry.target).await?;
    Ok(written)
}

fn part_path(target: &Path) -> PathBuf {
    target.with_extension("part")
}
