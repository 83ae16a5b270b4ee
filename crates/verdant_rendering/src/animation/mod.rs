//! # Animation Instance Allocator
//!
//! ```text
//!  gameplay thread(s)                       render thread
//!  ──────────────────                       ─────────────
//!  AnimationRequester::request ──bounded──> process_requests (once per frame)
//!                                 queue            │
//!                                                  v
//!                            update(dt): progress, wrap/stop, frame index
//!                                                  │
//!                           bone_instances / bone_deform mirrors ──> GPU sync
//! ```
//!
//! Bone ranges are handed out best-fit from released ranges before the
//! buffers grow.

mod allocator;
mod queue;
mod state;

pub use allocator::{AnimationAllocator, BoneRanges};
pub use queue::AnimationRequester;
pub use state::{AnimationBoneInstance, AnimationRequest, PlayMode};
