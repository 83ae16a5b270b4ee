//! # Frame Synchronization Primitives
//!
//! ## The Problem
//!
//! ```text
//! Frame N:    CPU records commands that read Buffer A, submits
//! Frame N+1:  CPU replaces Buffer A with Buffer A'
//!             GPU may STILL be executing frame N → reads A
//!
//! Destroy A immediately: USE-AFTER-FREE on the GPU
//! ```
//!
//! ## The Solution: Frame-Lifetime Garbage
//!
//! ```text
//! slot = frame % frames_in_flight
//!
//! retire(A)       → garbage[slot].push(A)
//! advance_frame() → slot' = next slot, release everything in garbage[slot']
//! ```
//!
//! By the time a slot comes around again, the frame that filled it has had
//! its fence waited on by the frame loop.

mod frame_garbage;

pub use frame_garbage::FrameGarbage;
