//! Generation session: the composition root of the client core.
//!
//! Flow: submit command → poll task → seed each returned artifact into its
//! document's controller → edit / switch / revise / export → reset.
//!
//! Each submission is tagged with an epoch. Superseding it (new submit, cancel,
//! reset) bumps the epoch, and any outcome carrying an older epoch is dropped
//! without touching document state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::drafts::controller::{DocumentSnapshot, DraftController};
use crate::drafts::export::ExportedArtifact;
use crate::errors::ClientError;
use crate::http::ApiClient;
use crate::models::draft::{DocumentKind, VersionId};
use crate::models::task::{GenerateCommand, GenerateRequest, GeneratedItem};
use crate::tasks::poller::{PollConfig, TaskHandle, TaskOutcome, TaskPoller};

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationStatus {
    Idle,
    /// Start request sent, task id not yet known.
    Submitting,
    Running { task_id: String },
    /// Per-document notes from the service, e.g. "returned existing document".
    Completed { messages: Vec<(DocumentKind, String)> },
    Failed { message: String },
    /// Polling broke or the result was unusable.
    Errored { error: String },
    TimedOut,
    Cancelled,
}

impl GenerationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            GenerationStatus::Idle | GenerationStatus::Submitting | GenerationStatus::Running { .. }
        )
    }
}

/// The generation owning the current epoch. `task_id` is `None` until the
/// service accepts the job.
struct ActiveTask {
    epoch: u64,
    task_id: Option<String>,
    cancel: CancellationToken,
}

struct SessionInner {
    api: ApiClient,
    poller: TaskPoller,
    resume: Arc<Mutex<DraftController>>,
    cover_letter: Arc<Mutex<DraftController>>,
    resume_rx: watch::Receiver<DocumentSnapshot>,
    cover_letter_rx: watch::Receiver<DocumentSnapshot>,
    epoch: AtomicU64,
    active: StdMutex<Option<ActiveTask>>,
    last_request: StdMutex<Option<GenerateRequest>>,
    status: watch::Sender<GenerationStatus>,
}

#[derive(Clone)]
pub struct GenerationSession {
    inner: Arc<SessionInner>,
}

impl GenerationSession {
    pub fn new(api: ApiClient, poll: PollConfig) -> Self {
        let resume = DraftController::new(DocumentKind::Resume, api.clone());
        let cover_letter = DraftController::new(DocumentKind::CoverLetter, api.clone());
        let (status, _rx) = watch::channel(GenerationStatus::Idle);

        Self {
            inner: Arc::new(SessionInner {
                poller: TaskPoller::new(api.clone(), poll),
                api,
                resume_rx: resume.subscribe(),
                cover_letter_rx: cover_letter.subscribe(),
                resume: Arc::new(Mutex::new(resume)),
                cover_letter: Arc::new(Mutex::new(cover_letter)),
                epoch: AtomicU64::new(0),
                active: StdMutex::new(None),
                last_request: StdMutex::new(None),
                status,
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Subscribable state
    // ------------------------------------------------------------------------

    pub fn subscribe_status(&self) -> watch::Receiver<GenerationStatus> {
        self.inner.status.subscribe()
    }

    pub fn subscribe_document(&self, kind: DocumentKind) -> watch::Receiver<DocumentSnapshot> {
        match kind {
            DocumentKind::Resume => self.inner.resume_rx.clone(),
            DocumentKind::CoverLetter => self.inner.cover_letter_rx.clone(),
        }
    }

    pub fn snapshot(&self, kind: DocumentKind) -> DocumentSnapshot {
        self.subscribe_document(kind).borrow().clone()
    }

    /// Task id of the in-flight generation, if any.
    #[allow(dead_code)]
    pub fn active_task(&self) -> Option<String> {
        lock(&self.inner.active)
            .as_ref()
            .and_then(|a| a.task_id.clone())
    }

    // ------------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------------

    /// Starts a generation job and returns its task id once the service accepts it.
    /// Any in-flight job is cancelled first. Documents are seeded in the background.
    pub async fn submit_generation(&self, request: GenerateRequest) -> Result<String, ClientError> {
        if request.user_context_id <= 0 {
            return Err(ClientError::Validation(
                "select a background profile before generating".to_string(),
            ));
        }
        if request.job_description_id <= 0 {
            return Err(ClientError::Validation(
                "select a job description before generating".to_string(),
            ));
        }
        if !request.regenerate_version {
            if let Some(last) = lock(&self.inner.last_request).as_ref() {
                if last.same_selection(&request) {
                    return Err(ClientError::Validation(
                        "documents have already been generated for this selection; regenerate instead"
                            .to_string(),
                    ));
                }
            }
        }

        let cancel = CancellationToken::new();
        let epoch = self.inner.begin(cancel.clone());

        let handle: TaskHandle<Vec<GeneratedItem>> =
            match self.inner.poller.submit(&request, cancel).await {
                Ok(handle) => handle,
                Err(e) => {
                    self.inner.publish_if_current(
                        epoch,
                        GenerationStatus::Errored {
                            error: e.to_string(),
                        },
                    );
                    return Err(e);
                }
            };

        let task_id = handle.task_id().to_string();
        if !self.inner.mark_running(epoch, &task_id) {
            debug!("Task {task_id} superseded before it was accepted");
            handle.cancel();
            return Ok(task_id);
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = handle.outcome().await;
            inner.finish(epoch, request, outcome).await;
        });

        Ok(task_id)
    }

    /// Re-submits the last request with `regenerate_version`, optionally for one kind only.
    #[allow(dead_code)]
    pub async fn regenerate(&self, kind: Option<DocumentKind>) -> Result<String, ClientError> {
        let last = lock(&self.inner.last_request).clone().ok_or_else(|| {
            ClientError::Validation("nothing has been generated yet".to_string())
        })?;
        let request = GenerateRequest {
            command: kind.map(GenerateCommand::for_kind).unwrap_or(last.command),
            regenerate_version: true,
            ..last
        };
        self.submit_generation(request).await
    }

    /// Cancels the in-flight job, including one whose start request has not
    /// been answered yet. Returns `false` when nothing was running.
    pub fn cancel_generation(&self) -> bool {
        let mut active = lock(&self.inner.active);
        let cancelled = self.inner.supersede(&mut active);
        if cancelled {
            self.inner.set_status(GenerationStatus::Cancelled);
        }
        cancelled
    }

    /// Starts a new application: cancels any job and clears both documents.
    #[allow(dead_code)]
    pub async fn reset(&self) {
        {
            let mut active = lock(&self.inner.active);
            self.inner.supersede(&mut active);
            self.inner.set_status(GenerationStatus::Idle);
        }
        *lock(&self.inner.last_request) = None;
        self.inner.resume.lock().await.reset();
        self.inner.cover_letter.lock().await.reset();
        info!("Session reset");
    }

    // ------------------------------------------------------------------------
    // Document intents
    // ------------------------------------------------------------------------

    /// Fetches a version and shows it in its kind's document, flushing edits there first.
    pub async fn open_version(&self, id: VersionId) -> Result<DocumentKind, ClientError> {
        let version = self.inner.api.get_version(id).await?;
        let kind = version.kind();
        self.inner.document(kind).lock().await.switch_to(version).await?;
        Ok(kind)
    }

    pub async fn set_label(&self, kind: DocumentKind, label: impl Into<String>) {
        self.inner.document(kind).lock().await.set_label(label);
    }

    #[allow(dead_code)]
    pub async fn set_content(&self, kind: DocumentKind, content: impl Into<String>) {
        self.inner.document(kind).lock().await.set_content(content);
    }

    #[allow(dead_code)]
    pub async fn set_instructions(&self, kind: DocumentKind, instructions: impl Into<String>) {
        self.inner
            .document(kind)
            .lock()
            .await
            .set_instructions(instructions);
    }

    #[allow(dead_code)]
    pub async fn switch_version(
        &self,
        kind: DocumentKind,
        target: VersionId,
    ) -> Result<(), ClientError> {
        self.inner
            .document(kind)
            .lock()
            .await
            .switch_version(target)
            .await
    }

    pub async fn revise(
        &self,
        kind: DocumentKind,
        instructions: &str,
    ) -> Result<VersionId, ClientError> {
        self.inner
            .document(kind)
            .lock()
            .await
            .revise(instructions)
            .await
    }

    pub async fn export(&self, kind: DocumentKind) -> Result<ExportedArtifact, ClientError> {
        self.inner.document(kind).lock().await.export().await
    }

    #[allow(dead_code)]
    pub async fn load_more_history(&self, kind: DocumentKind) -> Result<bool, ClientError> {
        self.inner
            .document(kind)
            .lock()
            .await
            .load_more_history()
            .await
    }
}

impl SessionInner {
    fn document(&self, kind: DocumentKind) -> &Arc<Mutex<DraftController>> {
        match kind {
            DocumentKind::Resume => &self.resume,
            DocumentKind::CoverLetter => &self.cover_letter,
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Invalidates every earlier epoch and cancels the active task.
    /// Returns whether a task was running. Callers hold the `active` lock.
    fn supersede(&self, active: &mut Option<ActiveTask>) -> bool {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        match active.take() {
            Some(task) => {
                match &task.task_id {
                    Some(task_id) => info!("Cancelling generation task {task_id}"),
                    None => info!("Cancelling generation before it was accepted"),
                }
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Opens a new epoch owned by a not-yet-accepted task.
    fn begin(&self, cancel: CancellationToken) -> u64 {
        let mut active = lock(&self.active);
        self.supersede(&mut active);
        let epoch = self.epoch.load(Ordering::SeqCst);
        *active = Some(ActiveTask {
            epoch,
            task_id: None,
            cancel,
        });
        self.set_status(GenerationStatus::Submitting);
        epoch
    }

    /// Records the accepted task id. `false` when the epoch was superseded meanwhile.
    fn mark_running(&self, epoch: u64, task_id: &str) -> bool {
        let mut active = lock(&self.active);
        if !self.is_current(epoch) {
            return false;
        }
        if let Some(task) = active.as_mut() {
            task.task_id = Some(task_id.to_string());
        }
        self.set_status(GenerationStatus::Running {
            task_id: task_id.to_string(),
        });
        true
    }

    /// Publishes a terminal status and retires the epoch's task, unless the
    /// epoch was superseded.
    fn publish_if_current(&self, epoch: u64, status: GenerationStatus) -> bool {
        let mut active = lock(&self.active);
        if !self.is_current(epoch) {
            debug!("Dropping stale generation status {status:?}");
            return false;
        }
        if active.as_ref().is_some_and(|a| a.epoch == epoch) {
            *active = None;
        }
        self.set_status(status);
        true
    }

    fn set_status(&self, status: GenerationStatus) {
        self.status.send_replace(status);
    }

    async fn finish(
        &self,
        epoch: u64,
        request: GenerateRequest,
        outcome: TaskOutcome<Vec<GeneratedItem>>,
    ) {
        if !self.is_current(epoch) {
            debug!("Dropping stale generation outcome ({})", outcome.label());
            return;
        }

        let status = match outcome {
            TaskOutcome::Succeeded(items) => match self.seed(epoch, &request, items).await {
                Some(status) => status,
                None => return,
            },
            TaskOutcome::Failed(message) => {
                self.api
                    .notices()
                    .report(&ClientError::JobFailure(message.clone()));
                GenerationStatus::Failed { message }
            }
            TaskOutcome::Lost(e) => GenerationStatus::Errored {
                error: e.to_string(),
            },
            TaskOutcome::TimedOut => {
                self.api.notices().report(&ClientError::TimedOut);
                GenerationStatus::TimedOut
            }
            TaskOutcome::Cancelled => GenerationStatus::Cancelled,
        };

        self.publish_if_current(epoch, status);
    }

    /// Displays each artifact in its document. `None` means the epoch went stale midway.
    async fn seed(
        &self,
        epoch: u64,
        request: &GenerateRequest,
        items: Vec<GeneratedItem>,
    ) -> Option<GenerationStatus> {
        let expected = request.command.kinds();
        let matches_command = items.len() == expected.len()
            && expected
                .iter()
                .all(|kind| items.iter().any(|i| i.document_version.kind() == *kind));
        if !matches_command {
            let got: Vec<&str> = items
                .iter()
                .map(|i| i.document_version.kind().display_name())
                .collect();
            let want: Vec<&str> = expected.iter().map(|k| k.display_name()).collect();
            let err = ClientError::UnexpectedResponse(format!(
                "expected [{}], got [{}]",
                want.join(", "),
                got.join(", ")
            ));
            self.api.notices().report(&err);
            return Some(GenerationStatus::Errored {
                error: err.to_string(),
            });
        }

        let mut messages = Vec::new();
        for item in items {
            let kind = item.document_version.kind();
            let mut controller = self.document(kind).lock().await;
            if !self.is_current(epoch) {
                debug!("Dropping stale {} artifact", kind.display_name());
                return None;
            }
            let version_id = item.document_version.id;
            if let Err(e) = controller.display(item.document_version).await {
                warn!("Could not display generated {} {version_id}: {e}", kind.display_name());
                continue;
            }
            if let Some(message) = item.message {
                messages.push((kind, message));
            }
        }

        // Checked under the `active` lock so a concurrent reset cannot be undone.
        {
            let _active = lock(&self.active);
            if !self.is_current(epoch) {
                debug!("Generation superseded while seeding");
                return None;
            }
            *lock(&self.last_request) = Some(GenerateRequest {
                regenerate_version: false,
                ..request.clone()
            });
        }
        Some(GenerationStatus::Completed { messages })
    }
}

/// Short critical sections only; never held across an await.
fn lock<T>(m: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
