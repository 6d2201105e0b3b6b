//! Draft reconciliation for one document kind.
//!
//! Every navigation-like action (switching versions, guided revision, export)
//! first calls `reconcile()`: if the edit buffer diverges from the displayed
//! version, the edits are persisted as a NEW version and that version becomes
//! the displayed one. A failed reconcile aborts the action and leaves the
//! buffer untouched.
//!
//! All operations take `&mut self`. Callers that share a controller keep it
//! behind a FIFO mutex, so a second trigger queues behind the first and no
//! network result is ever applied to a context other than the one that issued it.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::drafts::buffer::EditBuffer;
use crate::drafts::export::ExportedArtifact;
use crate::errors::ClientError;
use crate::http::ApiClient;
use crate::models::draft::{DocumentId, DocumentKind, Version, VersionId, VersionSummary};

/// Published after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub kind: DocumentKind,
    pub displayed: Option<Version>,
    pub history: Vec<VersionSummary>,
    pub has_more_history: bool,
    pub dirty: bool,
}

impl DocumentSnapshot {
    fn empty(kind: DocumentKind) -> Self {
        Self {
            kind,
            displayed: None,
            history: Vec::new(),
            has_more_history: false,
            dirty: false,
        }
    }
}

/// Version history of the displayed document, ordered oldest first.
#[derive(Debug, Default)]
struct History {
    document: Option<DocumentId>,
    entries: Vec<VersionSummary>,
    next_page: Option<String>,
}

impl History {
    fn for_document(document: DocumentId) -> Self {
        Self {
            document: Some(document),
            ..Self::default()
        }
    }

    fn record(&mut self, summary: VersionSummary) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.id == summary.id) {
            *existing = summary;
        } else {
            self.entries.push(summary);
        }
        self.entries.sort_by_key(|e| (e.updated_at, e.id));
    }
}

pub struct DraftController {
    kind: DocumentKind,
    api: ApiClient,
    displayed: Option<Version>,
    buffer: EditBuffer,
    history: History,
    snapshot: watch::Sender<DocumentSnapshot>,
}

impl DraftController {
    pub fn new(kind: DocumentKind, api: ApiClient) -> Self {
        let (snapshot, _rx) = watch::channel(DocumentSnapshot::empty(kind));
        Self {
            kind,
            api,
            displayed: None,
            buffer: EditBuffer::default(),
            history: History::default(),
            snapshot,
        }
    }

    #[allow(dead_code)]
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    #[allow(dead_code)]
    pub fn displayed(&self) -> Option<&Version> {
        self.displayed.as_ref()
    }

    #[allow(dead_code)]
    pub fn buffer(&self) -> &EditBuffer {
        &self.buffer
    }

    #[allow(dead_code)]
    pub fn history(&self) -> &[VersionSummary] {
        &self.history.entries
    }

    pub fn is_dirty(&self) -> bool {
        self.displayed
            .as_ref()
            .is_some_and(|v| self.buffer.diverges_from(v))
    }

    pub fn subscribe(&self) -> watch::Receiver<DocumentSnapshot> {
        self.snapshot.subscribe()
    }

    // ------------------------------------------------------------------------
    // Local edits
    // ------------------------------------------------------------------------

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.buffer.label = label.into();
        self.publish();
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.buffer.content = content.into();
        self.publish();
    }

    pub fn set_instructions(&mut self, instructions: impl Into<String>) {
        self.buffer.instructions = instructions.into();
        self.publish();
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Shows `version`, discarding the edit buffer. History is loaded the first
    /// time a document is displayed; a history failure does not fail the display.
    pub async fn display(&mut self, version: Version) -> Result<(), ClientError> {
        self.ensure_kind(&version)?;

        let document = version.document.id;
        let reload = self.history.document != Some(document);
        self.buffer = EditBuffer::from_version(&version);
        if reload {
            self.history = History::for_document(document);
        }
        self.history.record(version.summary());
        debug!("Displaying {} version {}", self.kind.display_name(), version.id);
        self.displayed = Some(version);

        if reload {
            if let Err(e) = self.fetch_history_page().await {
                warn!("Could not load history for document {document}: {e}");
            }
        }
        self.publish();
        Ok(())
    }

    /// Persists diverging edits as a new version and returns the identity later
    /// actions must use. With nothing to persist it returns the displayed id
    /// without touching the network.
    pub async fn reconcile(&mut self) -> Result<VersionId, ClientError> {
        let current = self
            .displayed
            .as_ref()
            .ok_or_else(|| ClientError::Validation("no draft is displayed".to_string()))?;

        let patch = self.buffer.patch_against(current);
        if patch.is_empty() {
            return Ok(current.id);
        }

        let base = current.id;
        info!("Saving edits to {} version {base}", self.kind.display_name());
        let saved = self.api.patch_version(base, &patch).await?;
        if let Err(e) = self.ensure_same_document(&saved) {
            warn!(
                "Edits to {} version {base} were stored as version {} of document {}; not adopting it",
                self.kind.display_name(),
                saved.id,
                saved.document.id
            );
            return Err(e);
        }

        info!("{} version {base} saved as {}", self.kind.display_name(), saved.id);
        let id = saved.id;
        self.buffer.adopt(&saved);
        self.history.record(saved.summary());
        self.displayed = Some(saved);
        self.publish();
        Ok(id)
    }

    /// Reconciles, then fetches and displays `target`.
    pub async fn switch_version(&mut self, target: VersionId) -> Result<(), ClientError> {
        self.reconcile_if_displayed().await?;
        let version = self.api.get_version(target).await?;
        self.display(version).await
    }

    /// Reconciles, then displays an already-fetched version.
    pub async fn switch_to(&mut self, version: Version) -> Result<(), ClientError> {
        self.ensure_kind(&version)?;
        self.reconcile_if_displayed().await?;
        self.display(version).await
    }

    /// Guided revision. Blank instructions are rejected before any network call.
    pub async fn revise(&mut self, instructions: &str) -> Result<VersionId, ClientError> {
        let instructions = instructions.trim();
        if instructions.is_empty() {
            return Err(ClientError::Validation(
                "revision instructions are required".to_string(),
            ));
        }

        let base = self.reconcile().await?;
        info!("Revising {} version {base}", self.kind.display_name());
        let revised = self.api.revise_content(base, instructions).await?;
        self.ensure_same_document(&revised)?;

        let id = revised.id;
        self.buffer = EditBuffer::from_version(&revised);
        self.history.record(revised.summary());
        self.displayed = Some(revised);
        self.publish();
        Ok(id)
    }

    /// Revises with the instructions held in the edit buffer.
    #[allow(dead_code)]
    pub async fn revise_with_buffered_instructions(&mut self) -> Result<VersionId, ClientError> {
        let instructions = self.buffer.instructions.clone();
        self.revise(&instructions).await
    }

    /// Reconciles, then renders the resulting version.
    pub async fn export(&mut self) -> Result<ExportedArtifact, ClientError> {
        let id = self.reconcile().await?;
        let response = self.api.export_version(id).await?;
        let version = self
            .displayed
            .as_ref()
            .ok_or_else(|| ClientError::Validation("no draft is displayed".to_string()))?;
        Ok(ExportedArtifact::new(
            version,
            response.content_disposition.as_deref(),
            response.body,
        ))
    }

    /// Follows the history `next` link. Returns `false` when there is nothing more to load.
    pub async fn load_more_history(&mut self) -> Result<bool, ClientError> {
        if self.history.next_page.is_none() {
            return Ok(false);
        }
        self.fetch_history_page().await?;
        self.publish();
        Ok(true)
    }

    pub fn reset(&mut self) {
        self.displayed = None;
        self.buffer = EditBuffer::default();
        self.history = History::default();
        self.publish();
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn reconcile_if_displayed(&mut self) -> Result<(), ClientError> {
        if self.displayed.is_some() {
            self.reconcile().await?;
        }
        Ok(())
    }

    async fn fetch_history_page(&mut self) -> Result<(), ClientError> {
        let Some(document) = self.history.document else {
            return Ok(());
        };
        let page = self
            .api
            .version_history(document, self.history.next_page.as_deref())
            .await?;
        debug!(
            "Loaded {} of {} history entries for document {document}",
            page.results.len(),
            page.count
        );
        self.history.next_page = page.next;
        for summary in page.results {
            self.history.record(summary);
        }
        Ok(())
    }

    fn ensure_kind(&self, version: &Version) -> Result<(), ClientError> {
        if version.kind() != self.kind {
            return Err(ClientError::UnexpectedResponse(format!(
                "{} version {} cannot be shown as a {}",
                version.kind().display_name(),
                version.id,
                self.kind.display_name()
            )));
        }
        Ok(())
    }

    fn ensure_same_document(&self, version: &Version) -> Result<(), ClientError> {
        self.ensure_kind(version)?;
        match &self.displayed {
            Some(current) if current.document.id != version.document.id => {
                Err(ClientError::UnexpectedResponse(format!(
                    "version {} belongs to document {}, expected {}",
                    version.id, version.document.id, current.document.id
                )))
            }
            _ => Ok(()),
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(DocumentSnapshot {
            kind: self.kind,
            displayed: self.displayed.clone(),
            history: self.history.entries.clone(),
            has_more_history: self.history.next_page.is_some(),
            dirty: self.is_dirty(),
        });
    }
}
