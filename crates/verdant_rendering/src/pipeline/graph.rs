//! Render-graph seam.
//!
//! The renderer only registers passes. Scheduling, barrier insertion and
//! resource aliasing belong to whatever graph the application runs;
//! [`SequentialGraph`] is the minimal one used by tools and tests.

/// Resource a pass reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassResource {
    /// A named buffer.
    Buffer(&'static str),
    /// A named image.
    Image(&'static str),
}

/// Collects a pass's resource declarations during setup.
#[derive(Debug, Default)]
pub struct PassBuilder {
    reads: Vec<PassResource>,
    writes: Vec<PassResource>,
}

impl PassBuilder {
    /// Empty declaration list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a read.
    pub fn read(&mut self, resource: PassResource) -> &mut Self {
        self.reads.push(resource);
        self
    }

    /// Declares a write.
    pub fn write(&mut self, resource: PassResource) -> &mut Self {
        self.writes.push(resource);
        self
    }

    /// Declared reads.
    #[must_use]
    pub fn reads(&self) -> &[PassResource] {
        &self.reads
    }

    /// Declared writes.
    #[must_use]
    pub fn writes(&self) -> &[PassResource] {
        &self.writes
    }
}

/// A pass with a setup and an execute callback.
///
/// `setup` always runs before `execute`; `execute` runs only if `setup`
/// returned true.
pub trait GraphPass<R> {
    /// Pass name.
    fn name(&self) -> &'static str;

    /// Declares resources and decides whether the pass runs this frame.
    fn setup(&mut self, builder: &mut PassBuilder) -> bool;

    /// Records commands.
    fn execute(&mut self, recorder: &mut R);
}

/// Scheduler accepting passes for one frame.
pub trait RenderGraph<'a, R> {
    /// Adds a pass.
    fn add_pass(&mut self, pass: Box<dyn GraphPass<R> + 'a>);
}

/// Declarations of one executed or skipped pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRecord {
    /// Pass name.
    pub name: &'static str,
    /// Whether setup enabled it.
    pub enabled: bool,
    /// Declared reads.
    pub reads: Vec<PassResource>,
    /// Declared writes.
    pub writes: Vec<PassResource>,
}

/// Runs every setup, then every enabled execute, in insertion order.
pub struct SequentialGraph<'a, R> {
    passes: Vec<Box<dyn GraphPass<R> + 'a>>,
}

impl<'a, R> Default for SequentialGraph<'a, R> {
    fn default() -> Self {
        Self { passes: Vec::new() }
    }
}

impl<'a, R> SequentialGraph<'a, R> {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of passes added.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns true without passes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs the frame and returns what each pass declared.
    pub fn execute(mut self, recorder: &mut R) -> Vec<PassRecord> {
        let mut records = Vec::with_capacity(self.passes.len());
        for pass in &mut self.passes {
            let mut builder = PassBuilder::new();
            let enabled = pass.setup(&mut builder);
            records.push(PassRecord {
                name: pass.name(),
                enabled,
                reads: builder.reads,
                writes: builder.writes,
            });
        }
        for (pass, record) in self.passes.iter_mut().zip(&records) {
            if record.enabled {
                pass.execute(recorder);
            }
        }
        records
    }
}

impl<'a, R> RenderGraph<'a, R> for SequentialGraph<'a, R> {
    fn add_pass(&mut self, pass: Box<dyn GraphPass<R> + 'a>) {
        self.passes.push(pass);
    }
}
