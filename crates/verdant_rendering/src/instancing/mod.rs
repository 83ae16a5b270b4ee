//! Per-placement instances and indirect draw lists.
//!
//! Every (instance, render batch) pair becomes one [`DrawCall`] plus one
//! [`DrawCallData`]. The culling pass compacts surviving draw calls; the
//! draw pass reads the side record through `first_instance`.

mod draw_list;
mod instance_data;
mod registry;

pub use draw_list::{DrawList, DrawListKind};
pub use instance_data::{DrawCall, DrawCallData, InstanceData, NO_BONES};
pub use registry::{InstanceRecord, InstanceRegistry, LoadReport, Placement, SkippedPlacement};
