//! Artifact model: concrete outputs of a finished generation job.
//!
//! Backends disagree about where URLs live; by the time a value becomes an
//! `Artifact` that mess has been resolved by `app::extractor`.

use serde::{Deserialize, Serialize};

/// What kind of file an artifact URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Video,
    Image,
    Audio,
    Archive,
    Model3d,
}

/// A generated output with a retrievable URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,

    pub url: String,

    #[serde(default, rename = "coverUrl", skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Artifact {
    pub fn new(artifact_type: ArtifactType, url: impl Into<String>) -> Self {
        Self {
            artifact_type,
            url: url.into(),
            cover_url: None,
            meta: None,
        }
    }

    pub fn video(url: impl Into<String>) -> Self {
        Self::new(ArtifactType::Video, url)
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::new(ArtifactType::Image, url)
    }

    pub fn audio(url: impl Into<String>) -> Self {
        Self::new(ArtifactType::Audio, url)
    }

    pub fn with_cover(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }
}
