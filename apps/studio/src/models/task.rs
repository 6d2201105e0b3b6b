use serde::{Deserialize, Serialize};

use crate::models::draft::{DocumentKind, Version};

/// Lifecycle of a server-side generation task as reported by `api/task-result/{id}/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "SUCCESS")]
    Succeeded,
    #[serde(rename = "FAILURE")]
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskResultEnvelope {
    pub status: TaskStatus,
    /// Payload on success, error string on failure, null otherwise.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskAccepted {
    pub task_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerateCommand {
    GenerateResume,
    GenerateCoverLetter,
    GenerateBoth,
}

impl GenerateCommand {
    pub fn for_kind(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Resume => GenerateCommand::GenerateResume,
            DocumentKind::CoverLetter => GenerateCommand::GenerateCoverLetter,
        }
    }

    /// Kinds a successful task must return, one artifact each.
    pub fn kinds(&self) -> &'static [DocumentKind] {
        match self {
            GenerateCommand::GenerateResume => &[DocumentKind::Resume],
            GenerateCommand::GenerateCoverLetter => &[DocumentKind::CoverLetter],
            GenerateCommand::GenerateBoth => &DocumentKind::ALL,
        }
    }
}

/// Body of `POST api/generate-resume-and-cover-letter/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateRequest {
    pub user_context_id: i64,
    pub job_description_id: i64,
    pub command: GenerateCommand,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub regenerate_version: bool,
}

impl GenerateRequest {
    pub fn new(user_context_id: i64, job_description_id: i64, command: GenerateCommand) -> Self {
        Self {
            user_context_id,
            job_description_id,
            command,
            regenerate_version: false,
        }
    }

    /// Same selection and command, ignoring the regenerate flag.
    pub fn same_selection(&self, other: &GenerateRequest) -> bool {
        self.user_context_id == other.user_context_id
            && self.job_description_id == other.job_description_id
            && self.command == other.command
    }
}

/// One artifact of a successful generation task.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedItem {
    pub document_version: Version,
    /// Informational server note, e.g. "returned existing document".
    #[serde(default)]
    pub message: Option<String>,
}
