//! Tensor shape records attached to input and output nodes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TensorShape {
    pub rows: usize,
    pub columns: usize,
    pub channels: usize,
}

impl TensorShape {
    pub fn new(rows: usize, columns: usize, channels: usize) -> Self {
        Self { rows, columns, channels }
    }

    /// A column vector of `size` elements, `{size, 1, 1}`.
    pub fn vector(size: usize) -> Self {
        Self::new(size, 1, 1)
    }

    pub fn size(&self) -> usize {
        self.rows * self.columns * self.channels
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}, {}}}", self.rows, self.columns, self.channels)
    }
}
