//! Packaging hand-off for the selected specification.
//!
//! The orchestrator builds a [`PackageRequest`] and hands it to a
//! [`Packager`]; the returned artifact is passed through uninspected apart
//! from its digest.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::{TimelineEvent, UiSpec};
use crate::errors::PackagingError;

/// Everything the packager receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRequest {
    /// The run being packaged.
    pub run_id: Uuid,
    /// The original brief.
    pub brief: String,
    /// The selected specification.
    pub selected_spec: UiSpec,
    /// Why it was selected.
    pub justification: String,
    /// The full run timeline.
    pub timeline: Vec<TimelineEvent>,
}

/// A downloadable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagedArtifact {
    /// Suggested file name.
    pub file_name: String,
    /// MIME type of `bytes`.
    pub content_type: String,
    /// The artifact itself.
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    /// Hex SHA-256 of `bytes`.
    pub sha256: String,
}

impl PackagedArtifact {
    /// Creates an artifact, computing its digest.
    #[must_use]
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let sha256 = digest(&bytes);
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
            sha256,
        }
    }

    /// Returns true if `sha256` matches the bytes.
    #[must_use]
    pub fn verify(&self) -> bool {
        digest(&self.bytes) == self.sha256
    }

    /// Summarizes the artifact for the run record.
    #[must_use]
    pub fn receipt(&self) -> PackageReceipt {
        PackageReceipt {
            file_name: self.file_name.clone(),
            size_bytes: self.bytes.len(),
            sha256: self.sha256.clone(),
            created_at: crate::utils::iso_timestamp(),
        }
    }
}

/// Record of a produced package kept on the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageReceipt {
    /// File name of the artifact.
    pub file_name: String,
    /// Size in bytes.
    pub size_bytes: usize,
    /// Hex SHA-256 of the artifact.
    pub sha256: String,
    /// When it was produced (RFC 3339).
    pub created_at: String,
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Turns a selection into a downloadable artifact.
#[async_trait]
pub trait Packager: Send + Sync {
    /// Produces the artifact for a request.
    async fn package(&self, request: &PackageRequest) -> Result<PackagedArtifact, PackagingError>;
}

/// Packages the request as a single JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBundlePackager {
    pretty: bool,
}

impl JsonBundlePackager {
    /// Creates a packager emitting compact JSON.
    #[must_use]
    pub const fn new() -> Self {
        Self { pretty: false }
    }

    /// Emits indented JSON.
    #[must_use]
    pub const fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }
}

#[async_trait]
impl Packager for JsonBundlePackager {
    async fn package(&self, request: &PackageRequest) -> Result<PackagedArtifact, PackagingError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(request)
        } else {
            serde_json::to_vec(request)
        }
        .map_err(|e| PackagingError::Serialization(e.to_string()))?;

        Ok(PackagedArtifact::new(
            format!("{}.json", slug(&request.selected_spec.name)),
            "application/json",
            bytes,
        ))
    }
}

fn slug(name: &str) -> String {
    let slug = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "design-spec".to_string()
    } else {
        slug
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
