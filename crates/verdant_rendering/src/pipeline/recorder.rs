//! Command recording seam of the cull/draw pass.

use crate::instancing::DrawListKind;

/// Access a barrier orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    /// Written by a compute shader.
    ComputeWrite,
    /// Read as indirect draw arguments.
    IndirectRead,
    /// Read by a copy.
    TransferRead,
}

/// Execution/memory dependency between two accesses of some buffers.
#[derive(Debug, Clone)]
pub struct BufferBarrier<B> {
    /// Buffers covered.
    pub buffers: Vec<B>,
    /// Access that must finish.
    pub src: BufferAccess,
    /// Access that waits.
    pub dst: BufferAccess,
}

/// Bindings and size of one culling dispatch.
#[derive(Debug, Clone)]
pub struct CullDispatch<B> {
    /// List culled.
    pub list: DrawListKind,
    /// Draw calls tested, one invocation each.
    pub draw_count: u32,
    /// Changes whenever a binding below is replaced.
    pub bindings_version: u64,
    /// [`crate::culling::CullingConstants`] uniform.
    pub constants: B,
    /// Per-instance data.
    pub instances: B,
    /// Bounding volumes.
    pub culling_data: B,
    /// Uncompacted draw arguments.
    pub draw_calls: B,
    /// Side records.
    pub draw_call_data: B,
    /// Compacted output arguments.
    pub culled_draw_calls: B,
    /// Draw count and triangle count, zeroed before the dispatch.
    pub counters: B,
}

/// Bindings of one count-driven indirect draw.
#[derive(Debug, Clone)]
pub struct IndirectDraw<B> {
    /// List drawn.
    pub list: DrawListKind,
    /// Upper bound on the draws the count buffer may request.
    pub max_draw_count: u32,
    /// Changes whenever a binding below is replaced.
    pub bindings_version: u64,
    /// Indirect arguments, compacted or not.
    pub arguments: B,
    /// Draw count at offset 0.
    pub count: B,
    /// [`super::DrawView`] uniform.
    pub view: B,
    /// `u16` index buffer.
    pub indices: B,
    /// Vertex storage.
    pub vertices: B,
    /// Per-instance data.
    pub instances: B,
    /// Uncompacted arguments, for each draw's base vertex.
    pub draw_calls: B,
    /// Side records.
    pub draw_call_data: B,
    /// Materials.
    pub texture_units: B,
    /// Vertex colours.
    pub vertex_colors: B,
    /// Bone matrices.
    pub bone_deform: B,
}

/// Receives the commands of a frame in order.
///
/// Implemented over a wgpu command encoder and over host memory for tests.
pub trait CommandRecorder {
    /// Buffer handle.
    type Buffer;

    /// Overwrites `words.len()` words of `buffer` starting at `offset`.
    fn fill_buffer(&mut self, buffer: &Self::Buffer, offset: u64, words: &[u32]);

    /// Runs the culling shader over `dispatch.draw_count` draw calls.
    fn dispatch_cull(&mut self, dispatch: &CullDispatch<Self::Buffer>);

    /// Orders two accesses.
    fn barrier(&mut self, barrier: &BufferBarrier<Self::Buffer>);

    /// Draws `min(count[0], max_draw_count)` indexed draws.
    fn draw_indexed_indirect_count(&mut self, draw: &IndirectDraw<Self::Buffer>);

    /// Copies `size` bytes from the start of `src` to the start of `dst`.
    fn copy_buffer(&mut self, src: &Self::Buffer, dst: &Self::Buffer, size: u64);
}
