//! Growable store of fixed-size instruction records.

use std::mem;

use tracing::trace;

use crate::error::CoreError;
use crate::opcode::Instruction;

/// Ordered instruction records with strict power-of-two growth.
///
/// `capacity` is the logical record capacity; the backing `Vec` is
/// reserved to exactly that many records so the two never disagree.
#[derive(Debug, Default)]
pub struct InstructionBuffer {
    records: Vec<Instruction>,
    capacity: usize,
    sealed: bool,
}

impl InstructionBuffer {
    pub fn new() -> Self {
        InstructionBuffer::default()
    }

    /// Size of one record in the backing store.
    pub fn stride() -> usize {
        mem::size_of::<Instruction>()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn records(&self) -> &[Instruction] {
        &self.records
    }

    /// Grows the store so that at least `required` records fit.
    ///
    /// Capacity doubles starting from 1. The new store is reserved up
    /// front and the existing records are moved into it; an allocation
    /// failure leaves the buffer untouched.
    pub fn ensure_capacity(&mut self, required: usize) -> Result<(), CoreError> {
        if required <= self.capacity {
            return Ok(());
        }
        let mut capacity = self.capacity.max(1);
        while capacity < required {
            capacity = capacity
                .checked_mul(2)
                .ok_or_else(|| CoreError::out_of_memory("instruction buffer", usize::MAX))?;
        }
        let bytes = capacity.saturating_mul(Self::stride());
        let mut store: Vec<Instruction> = Vec::new();
        store
            .try_reserve_exact(capacity)
            .map_err(|_| CoreError::out_of_memory("instruction buffer", bytes))?;
        store.extend(self.records.drain(..));
        trace!(
            from = self.capacity,
            to = capacity,
            used = store.len(),
            "grew instruction buffer"
        );
        self.records = store;
        self.capacity = capacity;
        Ok(())
    }

    /// Appends one record, growing first when the slot does not exist.
    pub fn append(&mut self, instruction: Instruction) -> Result<&mut Self, CoreError> {
        if self.sealed {
            return Err(CoreError::BufferSealed);
        }
        self.ensure_capacity(self.records.len() + 1)?;
        self.records.push(instruction);
        Ok(self)
    }

    /// Moves every record of `other` to the end of this buffer.
    pub fn append_buffer(&mut self, other: InstructionBuffer) -> Result<(), CoreError> {
        if self.sealed {
            return Err(CoreError::BufferSealed);
        }
        self.ensure_capacity(self.records.len() + other.records.len())?;
        self.records.extend(other.records);
        Ok(())
    }

    /// Fixes the used count; further appends fail.
    pub fn seal(&mut self) {
        self.sealed = true;
    }
}
