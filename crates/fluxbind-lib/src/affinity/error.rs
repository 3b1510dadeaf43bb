//! Error types for the affinity pipeline.

use thiserror::Error;

/// Result type alias for affinity operations.
pub type Result<T> = std::result::Result<T, AffinityError>;

/// Errors produced while turning a cpuset hint into a CPU list.
///
/// None of these is fatal to container creation: the adjustment builder
/// collapses every variant into "no adjustment applied".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AffinityError {
    /// The mask does not start with the literal `0x`.
    #[error("invalid hex mask {mask:?}: missing '0x' prefix")]
    MissingPrefix { mask: String },

    /// The digits after `0x` are empty, not hexadecimal, or overflow the mask width.
    #[error("invalid hex mask {mask:?}: {reason}")]
    InvalidHex { mask: String, reason: String },

    /// A syntactically valid mask with no bit set.
    #[error("hex mask {mask:?} resulted in an empty CPU set")]
    EmptyMask { mask: String },

    /// The formatter was handed an empty set, which the decoder never produces.
    #[error("cannot format an empty CPU set")]
    EmptyCpuSet,
}

impl AffinityError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AffinityError::MissingPrefix { .. } | AffinityError::InvalidHex { .. } => "format",
            AffinityError::EmptyMask { .. } => "empty_mask",
            AffinityError::EmptyCpuSet => "internal_fault",
        }
    }

    /// True for malformed masks (missing prefix, bad digits, overflow).
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            AffinityError::MissingPrefix { .. } | AffinityError::InvalidHex { .. }
        )
    }

    /// True when a core invariant was violated rather than the input being bad.
    pub fn is_internal_fault(&self) -> bool {
        matches!(self, AffinityError::EmptyCpuSet)
    }
}
