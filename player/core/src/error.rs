//! Error Types
//!
//! Failures the core can report. Only [`SetupError`] is ever returned to the
//! caller of activation; device faults and stall timeouts become state
//! transitions plus a user-visible message, and [`StateError`] is logged and
//! swallowed by the state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controls::ControlRegion;
use crate::instance::SurfaceId;
use crate::state::{Category, StateValue};

/// Message shown when a surface has nothing it can load
pub const NO_SOURCE_MESSAGE: &str = "No valid media source found.";

/// Message shown when loading stalls past the watchdog deadline
pub const STALL_MESSAGE: &str = "An error occurred while loading the video.";

/// A rejected state machine request (unknown category, unknown value, or a
/// value outside the category's domain)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// Category name does not exist
    #[error("unknown state category \"{0}\"")]
    UnknownCategory(String),

    /// Value name does not exist
    #[error("unknown state value \"{0}\"")]
    UnknownValue(String),

    /// Value exists but belongs to another category
    #[error("value \"{value}\" is not in the domain of \"{category}\"")]
    OutsideDomain {
        /// Category that was addressed
        category: Category,
        /// Value that was rejected
        value: StateValue,
    },
}

/// Activation failures
///
/// Any of these aborts activation for one surface only; other surfaces in the
/// same scan keep activating.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Surface has no media element to drive
    #[error("surface {0} has no media element")]
    NoMediaCapability(SurfaceId),

    /// Controls collaborator failed
    #[error("failed to set up controls for surface {surface}: {reason}")]
    ControlsFailed {
        /// Surface being activated
        surface: SurfaceId,
        /// Collaborator error text
        reason: String,
    },

    /// Controls collaborator returned a bundle without required regions
    #[error("controls for surface {surface} are missing regions {missing:?}")]
    ControlsIncomplete {
        /// Surface being activated
        surface: SurfaceId,
        /// Required regions that were absent
        missing: Vec<ControlRegion>,
    },

    /// Neither a `src` nor any source entry resolved to a URL
    #[error("surface {0}: no valid media source found")]
    NoSource(SurfaceId),

    /// Interstitial overlay failed or was skipped
    #[error("interstitial for surface {0} did not complete")]
    InterstitialRejected(SurfaceId),

    /// Surface was destroyed while activation was still in flight
    #[error("surface {0} was destroyed during activation")]
    Cancelled(SurfaceId),

    /// Activation task panicked
    #[error("activation crashed: {0}")]
    Crashed(String),
}

impl SetupError {
    /// Surface the failure belongs to, when known
    #[must_use]
    pub fn surface_id(&self) -> Option<&SurfaceId> {
        match self {
            Self::NoMediaCapability(id)
            | Self::NoSource(id)
            | Self::InterstitialRejected(id)
            | Self::Cancelled(id) => Some(id),
            Self::ControlsFailed { surface, .. } | Self::ControlsIncomplete { surface, .. } => {
                Some(surface)
            }
            Self::Crashed(_) => None,
        }
    }
}

/// Errors reported by the media device or host collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// `play()` was rejected (autoplay policy, no source, ...)
    #[error("play request rejected: {0}")]
    PlayRejected(String),

    /// Requested capability is not available on this device or host
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// Device reported a media fault
    #[error("media fault: {0}")]
    Fault(MediaErrorCode),
}

/// Media fault codes reported by the device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaErrorCode {
    /// Fetching was aborted by the user
    Aborted,
    /// Network error while fetching
    Network,
    /// Resource could not be decoded
    Decode,
    /// Resource type is not supported
    SourceNotSupported,
    /// Resource is encrypted and cannot be used
    Encrypted,
    /// Device is in an invalid state
    InvalidState,
    /// Metadata could not be read
    MetadataError,
    /// Any other numeric code
    Other(u16),
}

impl MediaErrorCode {
    /// Map a numeric `MediaError.code` to a fault code
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::Aborted,
            2 => Self::Network,
            3 => Self::Decode,
            4 => Self::SourceNotSupported,
            5 => Self::Encrypted,
            other => Self::Other(other),
        }
    }

    /// Fixed user-facing message for this fault
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::Aborted => {
                "The fetching process for the media resource was aborted by the user."
            }
            Self::Network => "A network error occurred while fetching the media resource.",
            Self::Decode => "The media resource could not be decoded.",
            Self::SourceNotSupported => "The media resource is not supported.",
            Self::Encrypted => "The media resource is encrypted and cannot be used.",
            Self::InvalidState => "The media resource is in an invalid state.",
            Self::MetadataError => "A metadata error occurred while fetching the media resource.",
            Self::Other(_) => STALL_MESSAGE,
        }
    }

    /// Message to surface, with raw codes exposed when debugging
    #[must_use]
    pub fn display_message(&self, debug: bool) -> String {
        match self {
            Self::Other(code) if debug => format!("Video error: code {code}"),
            other => other.message().to_string(),
        }
    }
}

impl fmt::Display for MediaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted => write!(f, "aborted"),
            Self::Network => write!(f, "network"),
            Self::Decode => write!(f, "decode"),
            Self::SourceNotSupported => write!(f, "source-not-supported"),
            Self::Encrypted => write!(f, "encrypted"),
            Self::InvalidState => write!(f, "invalid-state"),
            Self::MetadataError => write!(f, "metadata-error"),
            Self::Other(code) => write!(f, "code-{code}"),
        }
    }
}
