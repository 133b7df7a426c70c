use super::VisionState;
use crate::core::{RegistryError, Result};
use serde::{Deserialize, Serialize};

/// A named physical object the user registered for tracking.
///
/// `name` is the identity and doubles as the row key in the backing store,
/// so it never changes once the record exists. Updating a record means
/// writing a whole new value under the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrackedObjectRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail_blob_name: String,
    #[serde(default)]
    pub spatial_anchor_id: String,
    #[serde(default)]
    pub vision_state: VisionState,
}

impl TrackedObjectRecord {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            description: None,
            thumbnail_blob_name: String::new(),
            spatial_anchor_id: String::new(),
            vision_state: VisionState::default(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_thumbnail_blob_name(mut self, blob_name: impl Into<String>) -> Self {
        self.thumbnail_blob_name = blob_name.into();
        self
    }

    pub fn with_spatial_anchor_id(mut self, anchor_id: impl Into<String>) -> Self {
        self.spatial_anchor_id = anchor_id.into();
        self
    }

    pub fn with_vision_state(mut self, vision_state: VisionState) -> Self {
        self.vision_state = vision_state;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        self.vision_state.validate()
    }
}

/// Names are row keys: empty or whitespace-only names are rejected.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RegistryError::validation("name must not be empty or blank"));
    }
    Ok(())
}
