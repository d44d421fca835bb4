//! Color tokens and the pool they are handed out from.
//!
//! Every connection may hold at most one [`Color`]. The pool is a FIFO queue:
//! [`ColorPool::take`] pops from the front and [`ColorPool::release`] pushes
//! to the back, so a reclaimed color is the last one to be reused.
//!
//! The pool does no locking of its own. The server keeps it behind the same
//! mutex as the connection registry so that assignment and registration are
//! a single atomic step.

use std::collections::VecDeque;
use std::fmt;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Palette used when no colors are configured.
pub const DEFAULT_PALETTE: &[&str] = &[
    "red", "green", "blue", "magenta", "purple", "plum", "orange",
];

/// An opaque display token assigned to a connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    /// Create a color from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The color name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Color {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Color {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unused color tokens, handed out in FIFO order.
#[derive(Clone, Debug, Default)]
pub struct ColorPool {
    available: VecDeque<Color>,
    palette_size: usize,
}

impl ColorPool {
    /// Build a pool from a palette. Duplicate names are dropped, keeping the
    /// first occurrence.
    pub fn new<I, C>(palette: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Color>,
    {
        let mut available: VecDeque<Color> = VecDeque::new();
        for color in palette {
            let color = color.into();
            if available.contains(&color) {
                warn!(color = %color, "duplicate palette entry ignored");
                continue;
            }
            available.push_back(color);
        }
        let palette_size = available.len();
        Self {
            available,
            palette_size,
        }
    }

    /// Pool built from [`DEFAULT_PALETTE`].
    pub fn with_default_palette() -> Self {
        Self::new(DEFAULT_PALETTE.iter().copied())
    }

    /// Shuffle the pool order once. Intended for startup only.
    #[must_use]
    pub fn shuffled(mut self) -> Self {
        self.available
            .make_contiguous()
            .shuffle(&mut rand::rng());
        self
    }

    /// Remove and return the next color, or `None` when the pool is empty.
    pub fn take(&mut self) -> Option<Color> {
        self.available.pop_front()
    }

    /// Return a color to the back of the pool.
    ///
    /// Returns `false` (and leaves the pool unchanged) if the color is already
    /// present, which would otherwise break the no-duplicates invariant.
    pub fn release(&mut self, color: Color) -> bool {
        if self.available.contains(&color) {
            warn!(color = %color, "color released twice, ignoring");
            return false;
        }
        self.available.push_back(color);
        true
    }

    /// Number of colors currently available.
    pub fn available(&self) -> usize {
        self.available.len()
    }

    /// Number of distinct colors the pool was created with.
    pub fn palette_size(&self) -> usize {
        self.palette_size
    }

    /// Whether no colors are left.
    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    /// Whether `color` is currently in the pool.
    pub fn contains(&self, color: &Color) -> bool {
        self.available.contains(color)
    }

    /// Available colors in take order.
    pub fn iter(&self) -> impl Iterator<Item = &Color> {
        self.available.iter()
    }
}
