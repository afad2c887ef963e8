//! Fixed thumbnail widths produced by the derivation worker.

use serde::Serialize;

/// One of the canonical derived widths.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SizeVariant {
    W500,
    W250,
    W100,
}

impl SizeVariant {
    /// Every width the worker regenerates, largest first.
    pub const ALL: [SizeVariant; 3] = [SizeVariant::W500, SizeVariant::W250, SizeVariant::W100];

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        match self {
            SizeVariant::W500 => 500,
            SizeVariant::W250 => 250,
            SizeVariant::W100 => 100,
        }
    }

    /// Map a requested pixel width onto a canonical variant.
    pub fn from_width(width: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.width() == width)
    }
}
