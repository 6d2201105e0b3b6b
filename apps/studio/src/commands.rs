//! Command handlers for the `studio` binary. Each one drives the session and
//! prints a short human-readable result to stdout.

use std::path::Path;

use anyhow::{bail, Result};
use tracing::info;

use crate::http::ApiClient;
use crate::models::draft::{DocumentId, DocumentKind, VersionId};
use crate::models::task::{GenerateCommand, GenerateRequest};
use crate::session::{GenerationSession, GenerationStatus};

pub async fn generate(
    session: &GenerationSession,
    context: i64,
    job: i64,
    command: GenerateCommand,
    regenerate: bool,
    out: Option<&Path>,
) -> Result<()> {
    let mut request = GenerateRequest::new(context, job, command);
    request.regenerate_version = regenerate;

    let mut status = session.subscribe_status();
    let task_id = session.submit_generation(request).await?;
    println!("Generating (task {task_id}), press Ctrl-C to cancel");

    let finished = tokio::select! {
        res = status.wait_for(GenerationStatus::is_terminal) => res?.clone(),
        _ = tokio::signal::ctrl_c() => {
            session.cancel_generation();
            GenerationStatus::Cancelled
        }
    };

    match finished {
        GenerationStatus::Completed { messages } => {
            for (kind, message) in messages {
                println!("{}: {message}", kind.display_name());
            }
        }
        GenerationStatus::Failed { message } => bail!("generation failed: {message}"),
        GenerationStatus::Errored { error } => bail!("generation did not complete: {error}"),
        GenerationStatus::TimedOut => bail!("generation timed out"),
        GenerationStatus::Cancelled => {
            println!("Cancelled");
            return Ok(());
        }
        GenerationStatus::Idle
        | GenerationStatus::Submitting
        | GenerationStatus::Running { .. } => {
            bail!("generation ended in an unexpected state")
        }
    }

    for kind in DocumentKind::ALL {
        let snapshot = session.snapshot(kind);
        let Some(version) = snapshot.displayed else {
            continue;
        };
        let more = if snapshot.has_more_history { "+" } else { "" };
        println!(
            "{}: version {} ({}), {}{more} in history",
            snapshot.kind.display_name(),
            version.id,
            version.title(),
            snapshot.history.len()
        );
        if let Some(dir) = out {
            let artifact = session.export(kind).await?;
            let path = artifact.write_to(dir).await?;
            println!("  saved {}", path.display());
        }
    }
    Ok(())
}

pub async fn export(session: &GenerationSession, version: VersionId, out: &Path) -> Result<()> {
    let kind = session.open_version(version).await?;
    let artifact = session.export(kind).await?;
    let path = artifact.write_to(out).await?;
    println!("{}", path.display());
    Ok(())
}

/// A new label is saved as its own version before the revision runs.
pub async fn revise(
    session: &GenerationSession,
    version: VersionId,
    instructions: &str,
    label: Option<&str>,
) -> Result<()> {
    let kind = session.open_version(version).await?;
    if let Some(label) = label {
        session.set_label(kind, label).await;
        if session.snapshot(kind).dirty {
            info!("Saving label \"{label}\" before revising {version}");
        }
    }
    let revised = session.revise(kind, instructions).await?;
    info!("Revision of {version} stored as {revised}");
    println!("{} version {revised}", kind.display_name());
    Ok(())
}

pub async fn history(api: &ApiClient, document: i64) -> Result<()> {
    let document = DocumentId(document);
    let mut entries = Vec::new();
    let mut next: Option<String> = None;
    loop {
        let page = api.version_history(document, next.as_deref()).await?;
        entries.extend(page.results);
        match page.next {
            Some(link) => next = Some(link),
            None => break,
        }
    }
    entries.sort_by_key(|e| (e.updated_at, e.id));

    for entry in entries.iter().rev() {
        println!(
            "{:>8}  {:<14}  {}",
            entry.id.0,
            entry.updated_at.format("%b %-d, %Y").to_string(),
            entry.title()
        );
    }
    Ok(())
}
