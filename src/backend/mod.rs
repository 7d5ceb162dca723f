// Backend module - Vulkan abstraction layer
//
// Thin RAII wrappers around ash. Every GPU object is owned by exactly one
// value and released in that value's Drop.

pub mod capabilities;
pub mod command;
pub mod device;
pub mod pipeline;
pub mod selector;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use command::{CommandBufferSet, DrawCommands};
pub use device::{CapabilityRequest, GraphicsContext};
pub use pipeline::{Framebuffers, PipelineDescription, RenderPipelineState};
pub use surface::SurfaceFactory;
pub use swapchain::{SwapchainPreferences, SwapchainState};
pub use sync::FrameSyncState;
