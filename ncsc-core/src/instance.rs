//! Per-unit compilation state and the stack of active instances.
//!
//! One [`CompilerInstance`] exists per source unit under compilation,
//! nested includes included. The instance that is "current" is the top
//! of an [`InstanceStack`]; entering an include pushes a new instance
//! and leaving it pops back to the enclosing one.

use std::borrow::Cow;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::buffer::InstructionBuffer;
use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::finalize::OutputTables;
use crate::include::{IncludeRegistry, Registration, SharedRegistry};
use crate::opcode::FunctionId;

/// Source bytes of a unit. In debug mode the instance keeps its own
/// copy and releases it on destroy; otherwise the caller keeps ownership.
#[derive(Debug)]
pub enum SourceBuffer {
    Owned(Vec<u8>),
    Borrowed(Rc<[u8]>),
    Released,
}

impl SourceBuffer {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            SourceBuffer::Owned(bytes) => Some(bytes),
            SourceBuffer::Borrowed(bytes) => Some(bytes),
            SourceBuffer::Released => None,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, SourceBuffer::Owned(_))
    }
}

/// Forward-growing byte window with a fixed logical capacity. Writes
/// beyond the capacity fail unless the window is grown explicitly.
#[derive(Debug, Default)]
pub struct OutputWindow {
    bytes: Vec<u8>,
    capacity: usize,
}

impl OutputWindow {
    pub fn with_capacity(capacity: usize) -> Result<Self, CoreError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(capacity)
            .map_err(|_| CoreError::out_of_memory("output window", capacity))?;
        Ok(OutputWindow { bytes, capacity })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), CoreError> {
        if data.len() > self.remaining() {
            return Err(CoreError::out_of_memory(
                "output window",
                self.bytes.len() + data.len(),
            ));
        }
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Overwrites bytes already written at `offset`.
    pub fn patch(&mut self, offset: usize, data: &[u8]) -> Result<(), CoreError> {
        let end = offset + data.len();
        if end > self.bytes.len() {
            return Err(CoreError::out_of_memory("output window", end));
        }
        self.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Raises the capacity to at least `capacity` bytes.
    pub fn grow_to(&mut self, capacity: usize) -> Result<(), CoreError> {
        if capacity <= self.capacity {
            return Ok(());
        }
        self.bytes
            .try_reserve_exact(capacity - self.bytes.len())
            .map_err(|_| CoreError::out_of_memory("output window", capacity))?;
        self.capacity = capacity;
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Parser settings of one instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseContext {
    pub debug_parsing: bool,
    pub flags: u8,
}

/// Which include registry an instance works against.
#[derive(Debug, Clone)]
pub enum IncludeScope {
    /// Registry owned by someone else (the run or an enclosing instance).
    Shared(SharedRegistry),
    /// Registry owned by this instance and cleared when it is destroyed.
    Private(SharedRegistry),
}

impl IncludeScope {
    pub fn private() -> Self {
        IncludeScope::Private(IncludeRegistry::shared())
    }

    pub fn registry(&self) -> &SharedRegistry {
        match self {
            IncludeScope::Shared(registry) | IncludeScope::Private(registry) => registry,
        }
    }

    /// Scope handed to a nested include: same registry, never owned.
    pub fn nested(&self) -> IncludeScope {
        IncludeScope::Shared(Rc::clone(self.registry()))
    }
}

#[derive(Debug)]
pub struct CompilerInstance {
    name: String,
    source: SourceBuffer,
    output: Option<OutputWindow>,
    debug: bool,
    errors: usize,
    diagnostics: Vec<Diagnostic>,
    context: ParseContext,
    includes: IncludeScope,
    registration: Option<Registration>,
    buffer: Option<InstructionBuffer>,
    defined: Vec<FunctionId>,
    is_include: bool,
    tables: Option<OutputTables>,
    destroyed: bool,
}

impl CompilerInstance {
    /// Creates the instance for unit `name`.
    ///
    /// The output window is sized to the source length. When
    /// `include_path` is given its key is registered in the include
    /// registry before returning, and the outcome is kept.
    pub fn create(
        name: impl Into<String>,
        source: Rc<[u8]>,
        include_path: Option<&str>,
        debug: bool,
        includes: IncludeScope,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        let output = OutputWindow::with_capacity(source.len())?;
        let source = if debug {
            let mut owned = Vec::new();
            owned
                .try_reserve_exact(source.len())
                .map_err(|_| CoreError::out_of_memory("source buffer", source.len()))?;
            owned.extend_from_slice(&source);
            SourceBuffer::Owned(owned)
        } else {
            SourceBuffer::Borrowed(source)
        };
        let registration = include_path.map(|path| {
            let key = IncludeRegistry::key_for_path(path);
            includes.registry().borrow_mut().register_or_touch(&key)
        });
        let owned_source = debug;
        debug!(unit = %name, owned_source, ?registration, "created compiler instance");
        Ok(CompilerInstance {
            name,
            source,
            output: Some(output),
            debug,
            errors: 0,
            diagnostics: Vec::new(),
            context: ParseContext::default(),
            includes,
            registration,
            buffer: None,
            defined: Vec::new(),
            is_include: false,
            tables: None,
            destroyed: false,
        })
    }

    /// Releases the instance's resources. Returns whether the source
    /// buffer was freed, which only happens for debug-mode instances.
    /// Further calls do nothing.
    pub fn destroy(&mut self) -> bool {
        if self.destroyed {
            trace!(unit = %self.name, "instance already destroyed");
            return false;
        }
        self.destroyed = true;
        let freed = self.source.is_owned();
        if freed {
            self.source = SourceBuffer::Released;
        }
        if let IncludeScope::Private(registry) = &self.includes {
            registry.borrow_mut().clear();
        }
        self.buffer = None;
        self.output = None;
        self.tables = None;
        debug!(unit = %self.name, freed_source = freed, "destroyed compiler instance");
        freed
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn source(&self) -> &SourceBuffer {
        &self.source
    }

    /// Source text, with invalid UTF-8 replaced.
    pub fn source_text(&self) -> Result<Cow<'_, str>, CoreError> {
        let bytes = self.source.bytes().ok_or(CoreError::InstanceDestroyed)?;
        Ok(String::from_utf8_lossy(bytes))
    }

    pub fn context(&self) -> ParseContext {
        self.context
    }

    /// Enables parser debugging and records the unit flags.
    pub fn apply_debug_flags(&mut self, flags: u8) {
        self.context = ParseContext {
            debug_parsing: flags != 0,
            flags,
        };
    }

    pub fn includes(&self) -> &IncludeScope {
        &self.includes
    }

    pub fn registry(&self) -> &SharedRegistry {
        self.includes.registry()
    }

    pub fn registration(&self) -> Option<Registration> {
        self.registration
    }

    /// Records a diagnostic; errors bump the error counter.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            self.errors += 1;
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn is_include(&self) -> bool {
        self.is_include
    }

    pub fn mark_include(&mut self) {
        self.is_include = true;
    }

    /// The instruction buffer, created on first use.
    pub fn buffer_mut(&mut self) -> Result<&mut InstructionBuffer, CoreError> {
        if self.destroyed {
            return Err(CoreError::InstanceDestroyed);
        }
        Ok(self.buffer.get_or_insert_with(InstructionBuffer::new))
    }

    pub fn buffer(&self) -> Option<&InstructionBuffer> {
        self.buffer.as_ref()
    }

    pub fn take_buffer(&mut self) -> Option<InstructionBuffer> {
        self.buffer.take()
    }

    pub fn record_definition(&mut self, id: FunctionId) {
        self.defined.push(id);
    }

    pub fn defined(&self) -> &[FunctionId] {
        &self.defined
    }

    /// Takes over the records, definitions and diagnostics of a finished
    /// nested instance. Returns the record offset the child's code now
    /// starts at.
    pub fn absorb(&mut self, child: &mut CompilerInstance) -> Result<usize, CoreError> {
        let offset = self.buffer.as_ref().map_or(0, InstructionBuffer::len);
        if let Some(records) = child.take_buffer() {
            self.buffer_mut()?.append_buffer(records)?;
        }
        self.defined.append(&mut child.defined);
        self.errors += child.errors;
        self.diagnostics.append(&mut child.diagnostics);
        child.errors = 0;
        Ok(offset)
    }

    pub fn output_mut(&mut self) -> Result<&mut OutputWindow, CoreError> {
        self.output.as_mut().ok_or(CoreError::InstanceDestroyed)
    }

    /// Hands the output window to the serializer; it is not returned.
    pub fn take_output(&mut self) -> Option<OutputWindow> {
        self.output.take()
    }

    pub fn tables(&self) -> Option<&OutputTables> {
        self.tables.as_ref()
    }

    pub fn tables_mut(&mut self) -> Option<&mut OutputTables> {
        self.tables.as_mut()
    }

    pub(crate) fn install_tables(&mut self, tables: OutputTables) {
        self.tables = Some(tables);
    }
}

impl Drop for CompilerInstance {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Active instances, innermost last.
#[derive(Debug, Default)]
pub struct InstanceStack {
    frames: Vec<CompilerInstance>,
}

impl InstanceStack {
    pub fn new() -> Self {
        InstanceStack::default()
    }

    pub fn push(&mut self, instance: CompilerInstance) {
        trace!(unit = instance.name(), depth = self.frames.len() + 1, "enter unit");
        self.frames.push(instance);
    }

    pub fn pop(&mut self) -> Option<CompilerInstance> {
        let instance = self.frames.pop();
        if let Some(instance) = &instance {
            trace!(unit = instance.name(), depth = self.frames.len(), "leave unit");
        }
        instance
    }

    pub fn current(&self) -> Option<&CompilerInstance> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut CompilerInstance> {
        self.frames.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
