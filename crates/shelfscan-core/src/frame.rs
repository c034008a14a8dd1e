//! # Grayscale Frames
//!
//! The unit of work handed from a capture stream to a decoder: an 8-bit
//! luma buffer in row-major order. Buffers are reference counted so a
//! stream can hand the same frame to the sink, the decoder and a snapshot
//! without copying.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};

/// An 8-bit grayscale image, `data.len() == width * height`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl GrayFrame {
    /// Wraps a luma buffer, checking it matches the dimensions.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> CoreResult<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(CoreError::FrameSizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(GrayFrame {
            width,
            height,
            data: data.into(),
        })
    }

    /// Builds a frame by repeating one scanline `height` times.
    pub fn from_row(row: &[u8], height: u32) -> Self {
        let mut data = Vec::with_capacity(row.len() * height as usize);
        for _ in 0..height {
            data.extend_from_slice(row);
        }
        GrayFrame {
            width: row.len() as u32,
            height,
            data: data.into(),
        }
    }

    /// A uniform frame (e.g. a camera pointed at a blank shelf).
    pub fn blank(width: u32, height: u32, value: u8) -> Self {
        GrayFrame {
            width,
            height,
            data: vec![value; width as usize * height as usize].into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns scanline `y`, or `None` past the bottom edge.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.width as usize;
        self.data.get(start..start + self.width as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_size() {
        assert!(GrayFrame::new(4, 2, vec![0; 8]).is_ok());
        let err = GrayFrame::new(4, 2, vec![0; 7]).unwrap_err();
        assert!(matches!(err, CoreError::FrameSizeMismatch { expected: 8, actual: 7, .. }));
    }

    #[test]
    fn test_from_row_repeats_scanline() {
        let frame = GrayFrame::from_row(&[0, 255, 0], 3);
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.row(2), Some(&[0u8, 255, 0][..]));
        assert_eq!(frame.row(3), None);
    }
}
