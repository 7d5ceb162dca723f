// Engine error taxonomy
//
// Every fallible GPU call returns one of these. Nothing is retried: the first
// error aborts startup (or the frame loop) and travels up to main.

use ash::prelude::VkResult;
use ash::vk;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which capability list a missing name came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Layer,
    InstanceExtension,
    DeviceExtension,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layer => f.write_str("validation layer"),
            Self::InstanceExtension => f.write_str("instance extension"),
            Self::DeviceExtension => f.write_str("device extension"),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// A requested layer or extension is not reported by the driver.
    #[error("unsupported {kind}(s): {}", .missing.join(", "))]
    CapabilityUnsupported {
        kind: CapabilityKind,
        missing: Vec<String>,
    },

    /// No physical device at all, or none that passed the suitability checks.
    #[error("no suitable GPU: {0}")]
    NoSuitableDevice(String),

    #[error("failed to create {resource}: {source}")]
    ResourceCreationFailed {
        resource: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("failed to read {}: {source}", .path.display())]
    ResourceReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load the Vulkan library: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("{op} failed: {source}")]
    Vulkan {
        op: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("surface error: {0}")]
    Surface(String),

    #[error("frame slot {slot} fence did not signal within {timeout_ns}ns")]
    FrameTimeout { slot: usize, timeout_ns: u64 },

    #[error("invalid layer/extension name {0:?}")]
    InvalidName(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Attach what was being done to a raw `VkResult`.
pub trait VkResultExt<T> {
    /// The call constructs a GPU object.
    fn creating(self, resource: &'static str) -> Result<T>;
    /// Any other driver call (query, submit, present, wait).
    fn during(self, op: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn creating(self, resource: &'static str) -> Result<T> {
        self.map_err(|source| EngineError::ResourceCreationFailed { resource, source })
    }

    fn during(self, op: &'static str) -> Result<T> {
        self.map_err(|source| EngineError::Vulkan { op, source })
    }
}
