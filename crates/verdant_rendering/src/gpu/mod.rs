//! Device buffers: the backend seam and the synchronizer that owns them.

mod backend;
mod headless;
mod sync;
mod wgpu_backend;

pub use backend::{align_to_copy, BufferSpec, GpuBackend, MapRequest, MapStatus};
pub use headless::{HeadlessBackend, HeadlessBuffer};
pub use sync::{
    BufferContents, BufferKind, BufferSource, BufferSynchronizer, DescriptorSet, SyncReport,
    UpdateMode, MIN_BUFFER_SIZE,
};
pub use wgpu_backend::WgpuBackend;
