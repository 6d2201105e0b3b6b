use crate::models::draft::{Version, VersionPatch};

/// Unsaved field values for the displayed version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditBuffer {
    pub label: String,
    pub content: String,
    /// Guidance for the next revision; never persisted on its own.
    pub instructions: String,
}

impl EditBuffer {
    pub fn from_version(version: &Version) -> Self {
        Self {
            label: version.label.clone(),
            content: version.content.clone(),
            instructions: String::new(),
        }
    }

    /// True when label or content differ from `version`. Instructions do not count.
    pub fn diverges_from(&self, version: &Version) -> bool {
        !self.patch_against(version).is_empty()
    }

    /// Only the fields that differ from `version`.
    pub fn patch_against(&self, version: &Version) -> VersionPatch {
        VersionPatch {
            label: (self.label != version.label).then(|| self.label.clone()),
            content: (self.content != version.content).then(|| self.content.clone()),
        }
    }

    /// Takes label and content from a freshly persisted version, keeping instructions.
    pub fn adopt(&mut self, version: &Version) {
        self.label = version.label.clone();
        self.content = version.content.clone();
    }
}
