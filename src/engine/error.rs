use thiserror::Error;

use super::catalog::DeviceCategory;

/// Errors surfaced by the power engine and its catalog.
///
/// All variants are local, synchronous failures returned at the call site;
/// nothing here is retried inside the engine. `InvalidProfileDefinition` is
/// only produced while building a catalog and is fatal to process start.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Query or mutation on a device id that was never assigned a profile.
    #[error("device not registered: {0}")]
    DeviceNotFound(String),

    /// An explicitly requested profile name matches no catalog entry.
    #[error("no power profile named '{0}' in catalog")]
    ProfileNotFound(String),

    /// An explicitly requested category has zero catalog entries.
    #[error("category '{0}' has no profiles in catalog")]
    CategoryHasNoProfiles(DeviceCategory),

    /// A catalog entry violates the profile invariants (min <= max,
    /// standby <= min, variation in [0,1], positive cycle period).
    #[error("invalid profile definition '{name}': {reason}")]
    InvalidProfileDefinition { name: String, reason: String },
}

impl EngineError {
    pub(crate) fn invalid_profile(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidProfileDefinition {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
