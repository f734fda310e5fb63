use thiserror::Error;

/// Failures surfaced to the host. Image fetch problems never end up here;
/// they degrade to placeholders and are only logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GalleryError {
    #[error("rendering is unavailable on this device: {0}")]
    RenderingUnavailable(String),

    #[error("item collection {path} could not be loaded")]
    ItemsUnavailable { path: String },

    #[error("precomputed atlas {path} could not be used: {reason}")]
    AtlasManifest { path: String, reason: String },
}

impl GalleryError {
    /// Stable identifier for host-side handling.
    pub fn code(&self) -> &'static str {
        match self {
            GalleryError::RenderingUnavailable(_) => "rendering_unavailable",
            GalleryError::ItemsUnavailable { .. } => "items_unavailable",
            GalleryError::AtlasManifest { .. } => "atlas_manifest",
        }
    }

    /// Fatal errors stop the gallery; the rest leave it running degraded.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GalleryError::RenderingUnavailable(_))
    }
}
