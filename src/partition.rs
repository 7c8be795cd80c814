//! Splitting the command sequence across workers.
//!
//! The chunk size is `ceil(len / workers)` and the sequence is cut into
//! consecutive chunks of that size, the last one possibly shorter. This can
//! produce fewer chunks than workers (10 commands over 4 workers gives chunks
//! of 3, 3, 3, 1; 4 commands over 3 workers gives 2, 2) and no chunks at all
//! for an empty sequence.

use crate::builder::CommandSequence;
use crate::command::Command;
use crate::error::{FloodError, Result};
use std::ops::Range;

/// A contiguous, read-only view into the shared command sequence.
#[derive(Debug, Clone)]
pub struct Chunk {
    sequence: CommandSequence,
    range: Range<usize>,
}

impl Chunk {
    /// View over `range` of `sequence`. The range is clamped to the sequence.
    pub fn new(sequence: CommandSequence, range: Range<usize>) -> Self {
        let end = range.end.min(sequence.len());
        let start = range.start.min(end);
        Self {
            sequence,
            range: start..end,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.sequence[self.range.clone()]
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Index ranges of the chunks for `len` commands over `workers` workers.
pub fn chunk_ranges(len: usize, workers: usize) -> Result<Vec<Range<usize>>> {
    if workers == 0 {
        return Err(FloodError::InvalidParameter(
            "worker count must be at least 1".to_string(),
        ));
    }
    if len == 0 {
        return Ok(Vec::new());
    }

    let chunk_size = len.div_ceil(workers);
    Ok((0..len)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(len))
        .collect())
}

/// Split `sequence` into chunks for `workers` workers.
pub fn partition(sequence: &CommandSequence, workers: usize) -> Result<Vec<Chunk>> {
    Ok(chunk_ranges(sequence.len(), workers)?
        .into_iter()
        .map(|range| Chunk::new(CommandSequence::clone(sequence), range))
        .collect())
}
