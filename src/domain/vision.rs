use crate::core::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Computer-vision training state embedded in every tracked object.
///
/// All identifiers point into an external training service; the registry
/// never interprets them. A record that has never been trained carries
/// `VisionState::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VisionState {
    pub project_id: String,
    pub iteration_id: String,
    pub publish_model_name: String,
    pub tag_name: String,
    pub tag_id: String,
    /// Training image references in upload order. Duplicates are kept.
    pub image_ids: Vec<String>,
    /// Sub-fields written by a newer writer. Preserved verbatim so that a
    /// read-modify-write by this version never drops them.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl VisionState {
    /// Serialized names of the typed fields. Extension keys may not reuse
    /// them.
    pub const FIELD_NAMES: [&'static str; 6] = [
        "ProjectId",
        "IterationId",
        "PublishModelName",
        "TagName",
        "TagId",
        "ImageIds",
    ];

    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag_name: impl Into<String>, tag_id: impl Into<String>) -> Self {
        self.tag_name = tag_name.into();
        self.tag_id = tag_id.into();
        self
    }

    pub fn with_iteration(
        mut self,
        iteration_id: impl Into<String>,
        publish_model_name: impl Into<String>,
    ) -> Self {
        self.iteration_id = iteration_id.into();
        self.publish_model_name = publish_model_name.into();
        self
    }

    pub fn with_images<I, S>(mut self, image_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_ids = image_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn record_image(&mut self, image_id: impl Into<String>) {
        self.image_ids.push(image_id.into());
    }

    pub fn is_trained(&self) -> bool {
        !self.iteration_id.is_empty()
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// An extension named like a typed field would serialize as a duplicate
    /// key that no reader accepts.
    pub fn validate(&self) -> Result<()> {
        match self
            .extensions
            .keys()
            .find(|key| Self::FIELD_NAMES.contains(&key.as_str()))
        {
            Some(key) => Err(RegistryError::validation(format!(
                "vision state extension '{}' shadows a typed field",
                key
            ))),
            None => Ok(()),
        }
    }
}
