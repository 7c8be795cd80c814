//! Pixelflut draw commands.
//!
//! Wire format, one command per line:
//!
//! ```text
//! PX <x> <y> <rr><gg><bb><aa>\n
//! ```
//!
//! Coordinates are base-10, colour channels are two lowercase hex digits each.
//! Commands are self-terminated and need no further framing.

use crate::error::{FloodError, Result};
use std::fmt;

/// RGBA colour with 16-bit channels (red, green, blue, alpha).
pub type Rgba = [u16; 4];

/// One pixel with absolute canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSample {
    pub x: u64,
    pub y: u64,
    pub color: Rgba,
}

impl PixelSample {
    pub fn new(x: u64, y: u64, color: Rgba) -> Self {
        Self { x, y, color }
    }
}

/// An encoded, newline-terminated draw command.
///
/// Never empty: fully transparent pixels have no command at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(Box<str>);

impl Command {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode one pixel as a draw command.
///
/// Every channel is truncated to its low 8 bits. Returns `None` when the
/// truncated alpha is zero, regardless of the colour channels.
pub fn encode(sample: &PixelSample) -> Option<Command> {
    let [r, g, b, a] = sample.color.map(|c| c as u8);
    if a == 0 {
        return None;
    }

    let line = format!(
        "PX {} {} {:02x}{:02x}{:02x}{:02x}\n",
        sample.x, sample.y, r, g, b, a
    );
    Some(Command(line.into_boxed_str()))
}

/// A draw command read back from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    pub x: u64,
    pub y: u64,
    pub rgba: [u8; 4],
}

impl DrawCommand {
    /// Parse one wire line. The trailing newline is optional.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let mut parts = line.split(' ');

        if parts.next() != Some("PX") {
            return Err(FloodError::Protocol(format!("not a PX command: {:?}", line)));
        }

        let x = parse_coordinate(parts.next(), line)?;
        let y = parse_coordinate(parts.next(), line)?;

        let color = parts
            .next()
            .ok_or_else(|| FloodError::Protocol(format!("missing colour: {:?}", line)))?;
        if parts.next().is_some() {
            return Err(FloodError::Protocol(format!("trailing fields: {:?}", line)));
        }
        if color.len() != 8 || !color.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(FloodError::Protocol(format!(
                "colour must be 8 lowercase hex digits: {:?}",
                color
            )));
        }

        let mut rgba = [0u8; 4];
        for (i, channel) in rgba.iter_mut().enumerate() {
            *channel = u8::from_str_radix(&color[i * 2..i * 2 + 2], 16)
                .map_err(|e| FloodError::Protocol(format!("bad colour {:?}: {}", color, e)))?;
        }

        Ok(Self { x, y, rgba })
    }
}

fn parse_coordinate(field: Option<&str>, line: &str) -> Result<u64> {
    let field =
        field.ok_or_else(|| FloodError::Protocol(format!("missing coordinate: {:?}", line)))?;
    field
        .parse()
        .map_err(|e| FloodError::Protocol(format!("bad coordinate {:?}: {}", field, e)))
}
