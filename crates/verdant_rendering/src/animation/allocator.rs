//! Bone range allocation and per-frame playback.

use std::collections::HashMap;

use glam::Mat4;
use verdant_core::{AllocatedRange, RangeAllocator};

use super::queue::{AnimationRequester, RequestQueue};
use super::state::{AnimationBoneInstance, AnimationRequest, PlayMode};
use crate::error::{RenderError, RenderResult};
use crate::model::{ModelHandle, ModelStore, Skeleton};

/// Bone ranges owned by one animated instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoneRanges {
    /// Model the instance draws.
    pub model: ModelHandle,
    /// Range in the bone-deform buffer.
    pub deform: AllocatedRange,
    /// Range in the bone-instance buffer.
    pub state: AllocatedRange,
}

/// Owner of the bone-deform and bone-instance mirrors.
///
/// Both buffers grow with the accumulated bone count of live animated
/// instances. Released ranges are reused best-fit before either grows.
#[derive(Debug)]
pub struct AnimationAllocator {
    deform_ranges: RangeAllocator,
    state_ranges: RangeAllocator,
    /// One model-space matrix per allocated bone. Rest pose is identity.
    bone_deform: Vec<[[f32; 4]; 4]>,
    bone_instances: Vec<AnimationBoneInstance>,
    slots: HashMap<u32, BoneRanges>,
    queue: RequestQueue,
    deform_generation: u64,
    state_generation: u64,
}

impl AnimationAllocator {
    /// Creates an allocator whose request queue holds `queue_capacity` items.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            deform_ranges: RangeAllocator::new(),
            state_ranges: RangeAllocator::new(),
            bone_deform: Vec::new(),
            bone_instances: Vec::new(),
            slots: HashMap::new(),
            queue: RequestQueue::new(queue_capacity),
            deform_generation: 0,
            state_generation: 0,
        }
    }

    /// Producer handle for other threads.
    #[must_use]
    pub fn requester(&self) -> AnimationRequester {
        self.queue.requester()
    }

    /// Requests waiting for the next [`AnimationAllocator::process_requests`].
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.queue.pending()
    }

    /// Assigns bone ranges to an instance and returns
    /// `(deform_offset, instance_state_offset)`.
    ///
    /// An instance that already owns ranges keeps them.
    pub fn allocate_bone_ranges(&mut self, instance: u32, model: ModelHandle, bone_count: u32) -> (u32, u32) {
        if let Some(existing) = self.slots.get(&instance) {
            return (existing.deform.offset, existing.state.offset);
        }

        let deform = self.deform_ranges.allocate(bone_count);
        let state = self.state_ranges.allocate(bone_count);

        let deform_len = self.deform_ranges.capacity() as usize;
        if self.bone_deform.len() < deform_len {
            self.bone_deform.resize(deform_len, Mat4::IDENTITY.to_cols_array_2d());
        }
        let state_len = self.state_ranges.capacity() as usize;
        if self.bone_instances.len() < state_len {
            self.bone_instances.resize(state_len, AnimationBoneInstance::default());
        }
        self.reset_ranges(deform, state);

        self.slots.insert(instance, BoneRanges { model, deform, state });
        tracing::trace!(instance, bone_count, deform = deform.offset, state = state.offset, "allocated bone ranges");
        (deform.offset, state.offset)
    }

    /// Returns an instance's ranges to the free lists.
    pub fn release(&mut self, instance: u32) -> RenderResult<()> {
        let slot = self
            .slots
            .remove(&instance)
            .ok_or(RenderError::NotAnimated(instance))?;
        self.reset_ranges(slot.deform, slot.state);
        self.deform_ranges.release(slot.deform);
        self.state_ranges.release(slot.state);
        Ok(())
    }

    fn reset_ranges(&mut self, deform: AllocatedRange, state: AllocatedRange) {
        let identity = Mat4::IDENTITY.to_cols_array_2d();
        self.bone_deform[deform.offset as usize..deform.end() as usize].fill(identity);
        self.bone_instances[state.offset as usize..state.end() as usize]
            .fill(AnimationBoneInstance::default());
        self.deform_generation += 1;
        self.state_generation += 1;
    }

    /// Applies every request queued before the call. Rejected requests are
    /// logged and leave all state untouched. Returns the number applied.
    pub fn process_requests(&mut self, store: &ModelStore) -> usize {
        let mut applied = 0;
        for request in self.queue.drain_snapshot() {
            match self.apply_request(&request, store) {
                Ok(()) => applied += 1,
                Err(error) => tracing::warn!(
                    instance = request.instance_id,
                    sequence = request.sequence_id,
                    %error,
                    "animation request rejected"
                ),
            }
        }
        applied
    }

    /// Validates and applies one request.
    pub fn apply_request(&mut self, request: &AnimationRequest, store: &ModelStore) -> RenderResult<()> {
        let slot = *self
            .slots
            .get(&request.instance_id)
            .ok_or(RenderError::NotAnimated(request.instance_id))?;
        let skeleton = skeleton_of(store, slot.model).ok_or(RenderError::NotAnimated(request.instance_id))?;
        if request.sequence_id >= skeleton.sequence_count() {
            return Err(RenderError::UnknownAnimationSequence {
                instance: request.instance_id,
                sequence: request.sequence_id,
                available: skeleton.sequence_count(),
            });
        }

        let mode = request.play_mode() as u32;
        for bone in self.state_slice_mut(slot.state) {
            *bone = AnimationBoneInstance {
                progress: 0.0,
                sequence_index: request.sequence_id,
                frame_index: 0,
                play_mode: mode,
            };
        }
        pose_bones(
            &mut self.bone_deform[slot.deform.offset as usize..slot.deform.end() as usize],
            &self.bone_instances[slot.state.offset as usize..slot.state.end() as usize],
            skeleton,
        );
        self.state_generation += 1;
        self.deform_generation += 1;
        Ok(())
    }

    /// Advances every playing bone by `dt` seconds. Returns the number of
    /// bones still playing.
    pub fn update(&mut self, dt: f32, store: &ModelStore) -> usize {
        let mut playing = 0;
        let mut changed = false;
        for slot in self.slots.values() {
            let Some(skeleton) = skeleton_of(store, slot.model) else {
                continue;
            };
            let states = &mut self.bone_instances[slot.state.offset as usize..slot.state.end() as usize];
            let mut advanced = false;
            for (bone, state) in (0u32..).zip(states.iter_mut()) {
                if state.mode() == PlayMode::Stopped {
                    continue;
                }
                advance_bone(state, bone, dt, skeleton);
                advanced = true;
                if state.mode() != PlayMode::Stopped {
                    playing += 1;
                }
            }
            if advanced {
                let deform = &mut self.bone_deform[slot.deform.offset as usize..slot.deform.end() as usize];
                pose_bones(deform, states, skeleton);
                changed = true;
            }
        }
        if changed {
            self.state_generation += 1;
            self.deform_generation += 1;
        }
        playing
    }

    fn state_slice_mut(&mut self, range: AllocatedRange) -> &mut [AnimationBoneInstance] {
        &mut self.bone_instances[range.offset as usize..range.end() as usize]
    }

    /// Ranges of an animated instance.
    #[must_use]
    pub fn ranges(&self, instance: u32) -> Option<BoneRanges> {
        self.slots.get(&instance).copied()
    }

    /// Playback state of an instance's bones.
    #[must_use]
    pub fn bone_states(&self, instance: u32) -> Option<&[AnimationBoneInstance]> {
        let slot = self.slots.get(&instance)?;
        self.bone_instances
            .get(slot.state.offset as usize..slot.state.end() as usize)
    }

    /// Number of instances owning ranges.
    #[must_use]
    pub fn animated_instance_count(&self) -> usize {
        self.slots.len()
    }

    /// Bone-deform mirror.
    #[must_use]
    pub fn bone_deform(&self) -> &[[[f32; 4]; 4]] {
        &self.bone_deform
    }

    /// Bone-instance mirror.
    #[must_use]
    pub fn bone_instances(&self) -> &[AnimationBoneInstance] {
        &self.bone_instances
    }

    /// Bones the deform buffer must hold.
    #[must_use]
    pub fn deform_capacity(&self) -> u32 {
        self.deform_ranges.capacity()
    }

    /// Bones the instance-state buffer must hold.
    #[must_use]
    pub fn state_capacity(&self) -> u32 {
        self.state_ranges.capacity()
    }

    /// Change counter of the deform mirror.
    #[must_use]
    pub const fn deform_generation(&self) -> u64 {
        self.deform_generation
    }

    /// Change counter of the bone-instance mirror.
    #[must_use]
    pub const fn state_generation(&self) -> u64 {
        self.state_generation
    }

    /// Frees everything and drops queued requests.
    pub fn clear(&mut self) {
        let dropped = self.queue.discard();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded queued animation requests");
        }
        self.deform_ranges.clear();
        self.state_ranges.clear();
        self.bone_deform.clear();
        self.bone_instances.clear();
        self.slots.clear();
        self.deform_generation += 1;
        self.state_generation += 1;
    }
}

fn skeleton_of(store: &ModelStore, model: ModelHandle) -> Option<&Skeleton> {
    store.model(model)?.skeleton.as_ref()
}

/// Writes each bone's keyframe pose composed with its parent's. Bones past
/// the skeleton keep the rest pose.
fn pose_bones(deform: &mut [[[f32; 4]; 4]], states: &[AnimationBoneInstance], skeleton: &Skeleton) {
    for (bone, state) in (0u32..).zip(states).take(deform.len()) {
        let local = skeleton.local_pose(bone, state.sequence_index, state.frame_index);
        let parent = skeleton
            .parent(bone)
            .filter(|&p| p < bone)
            .map_or(Mat4::IDENTITY, |p| Mat4::from_cols_array_2d(&deform[p as usize]));
        deform[bone as usize] = (parent * local).to_cols_array_2d();
    }
}

fn advance_bone(state: &mut AnimationBoneInstance, bone: u32, dt: f32, skeleton: &Skeleton) {
    let duration = skeleton.duration_seconds(state.sequence_index);
    state.progress += dt;
    if duration <= 0.0 {
        state.progress = 0.0;
    } else if state.progress >= duration {
        match state.mode() {
            PlayMode::Loop => state.progress %= duration,
            _ => {
                state.progress = duration;
                state.play_mode = PlayMode::Stopped as u32;
            }
        }
    }

    // Last keyframe at or before the current time.
    let now_ms = state.progress * 1000.0;
    let timestamps = skeleton.timestamps(bone, state.sequence_index);
    let after = timestamps.partition_point(|&t| t as f32 <= now_ms);
    state.frame_index = after.saturating_sub(1) as u32;
}
