use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    CoverLetter,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Resume, DocumentKind::CoverLetter];

    pub fn display_name(&self) -> &'static str {
        match self {
            DocumentKind::Resume => "Resume",
            DocumentKind::CoverLetter => "Cover Letter",
        }
    }
}

/// The logical document a version belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: DocumentId,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
}

/// An immutable, server-issued snapshot of a document's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    #[serde(rename = "markdown")]
    pub content: String,
    /// Empty when the user never named this draft.
    #[serde(rename = "version_name", default, deserialize_with = "null_as_empty")]
    pub label: String,
    pub document: DocumentRef,
    #[serde(alias = "created_at")]
    pub updated_at: DateTime<Utc>,
}

impl Version {
    pub fn kind(&self) -> DocumentKind {
        self.document.kind
    }

    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            id: self.id,
            label: self.label.clone(),
            updated_at: self.updated_at,
        }
    }

    /// Label if set, otherwise `Draft <id>`.
    pub fn title(&self) -> String {
        self.summary().title()
    }
}

/// History entry; the full content is fetched only when a version is displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub id: VersionId,
    #[serde(rename = "version_name", default, deserialize_with = "null_as_empty")]
    pub label: String,
    #[serde(alias = "created_at")]
    pub updated_at: DateTime<Utc>,
}

impl VersionSummary {
    pub fn title(&self) -> String {
        if self.label.is_empty() {
            format!("Draft {}", self.id)
        } else {
            self.label.clone()
        }
    }
}

/// One page of `api/document/{id}/versions/`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPage {
    pub count: u64,
    pub next: Option<String>,
    #[allow(dead_code)]
    pub previous: Option<String>,
    pub results: Vec<VersionSummary>,
}

/// Body of `PATCH api/document-version/{id}/`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VersionPatch {
    #[serde(rename = "version_name", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "markdown", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl VersionPatch {
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.content.is_none()
    }
}

/// Body of `POST api/update-content/`.
#[derive(Debug, Clone, Serialize)]
pub struct ReviseRequest {
    pub document_version_id: VersionId,
    pub instructions: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
