//! Command set construction.
//!
//! Walks a [`PixelGrid`] column by column (outer loop over x, inner loop over
//! y), keeps every `stride`-th visited pixel, encodes it, and shuffles the
//! resulting list once so that the canvas fills evenly instead of column by
//! column.
//!
//! The stride counts traversal steps, not grid positions: a stride of 2 on a
//! 3-pixel-high image samples (0,0), (0,2), (1,1), (2,0), ...

use crate::command::{encode, Command, PixelSample};
use crate::error::{FloodError, Result};
use crate::image_source::PixelGrid;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

/// Immutable, shared list of commands streamed by the workers.
pub type CommandSequence = Arc<[Command]>;

/// Builds the command sequence for one image placement.
#[derive(Debug, Clone, Copy)]
pub struct CommandSetBuilder {
    origin_x: u32,
    origin_y: u32,
    stride: u32,
}

impl CommandSetBuilder {
    /// Builder placing the image at `(origin_x, origin_y)`, sampling every pixel.
    pub fn new(origin_x: u32, origin_y: u32) -> Self {
        Self {
            origin_x,
            origin_y,
            stride: 1,
        }
    }

    /// Only emit every `stride`-th visited pixel. Must be at least 1.
    pub fn with_stride(mut self, stride: u32) -> Result<Self> {
        if stride == 0 {
            return Err(FloodError::InvalidParameter(
                "stride must be at least 1".to_string(),
            ));
        }
        self.stride = stride;
        Ok(self)
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Encode the grid in traversal order, without shuffling.
    ///
    /// Fully transparent pixels are visited (and counted for the stride) but
    /// produce no command.
    pub fn build_ordered(&self, grid: &PixelGrid) -> Vec<Command> {
        let stride = u64::from(self.stride);
        let mut commands = Vec::with_capacity(grid.area() / self.stride as usize + 1);
        let mut visited: u64 = 0;

        for x in 0..grid.width() {
            for y in 0..grid.height() {
                if visited % stride == 0 {
                    if let Some(color) = grid.get(x, y) {
                        let sample = PixelSample::new(
                            u64::from(self.origin_x) + u64::from(x),
                            u64::from(self.origin_y) + u64::from(y),
                            color,
                        );
                        if let Some(cmd) = encode(&sample) {
                            commands.push(cmd);
                        }
                    }
                }
                visited += 1;
            }
        }

        commands
    }

    /// Encode the grid and shuffle the result once with `rng`.
    pub fn build<R: Rng + ?Sized>(&self, grid: &PixelGrid, rng: &mut R) -> CommandSequence {
        let mut commands = self.build_ordered(grid);
        commands.shuffle(rng);
        commands.into()
    }
}
