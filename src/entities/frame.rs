//! Frame: the image artifact passed between graph nodes.
//!
//! Pixel data is RGBA, stored at one of three precisions:
//! - `PixelBuffer::U8`: LDR (JPG/PNG), 4 bytes/pixel
//! - `PixelBuffer::F16`: EXR HALF, 8 bytes/pixel
//! - `PixelBuffer::F32`: EXR FLOAT and node output, 16 bytes/pixel
//!
//! Frames are immutable and the buffer is behind an `Arc`, so memoizing a
//! frame or handing it to several consumers never copies pixels.
//!
//! `FrameResource` is the decoded-frame form the preload coordinator caches:
//! a frame plus an explicit `release()` that drops the pixel allocation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use half::f16 as F16;

use crate::core::handle::Resource;

/// RGBA pixel storage
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    F16(Vec<F16>),
    F32(Vec<f32>),
}

impl PixelBuffer {
    /// Number of channel values
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(v) => v.len(),
            PixelBuffer::F16(v) => v.len(),
            PixelBuffer::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn format(&self) -> PixelFormat {
        match self {
            PixelBuffer::U8(_) => PixelFormat::Rgba8,
            PixelBuffer::F16(_) => PixelFormat::RgbaF16,
            PixelBuffer::F32(_) => PixelFormat::RgbaF32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    RgbaF16,
    RgbaF32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::RgbaF16 => 8,
            PixelFormat::RgbaF32 => 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer length does not match width * height * 4
    SizeMismatch { expected: usize, actual: usize },
    /// Zero width or height
    EmptyDimensions,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::SizeMismatch { expected, actual } => {
                write!(f, "Pixel buffer size mismatch: expected {} values, got {}", expected, actual)
            }
            FrameError::EmptyDimensions => write!(f, "Frame dimensions must be non-zero"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Immutable RGBA image.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    buffer: Arc<PixelBuffer>,
}

impl Frame {
    /// Transparent black 8-bit frame.
    pub fn new(width: usize, height: usize) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            height,
            buffer: Arc::new(PixelBuffer::U8(vec![0; width * height * 4])),
        }
    }

    /// Float frame filled with one color.
    pub fn solid(width: usize, height: usize, rgba: [f32; 4]) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let data = rgba.iter().copied().cycle().take(width * height * 4).collect();
        Self {
            width,
            height,
            buffer: Arc::new(PixelBuffer::F32(data)),
        }
    }

    pub fn from_u8(width: usize, height: usize, data: Vec<u8>) -> Result<Self, FrameError> {
        Self::from_buffer(width, height, PixelBuffer::U8(data))
    }

    pub fn from_f16(width: usize, height: usize, data: Vec<F16>) -> Result<Self, FrameError> {
        Self::from_buffer(width, height, PixelBuffer::F16(data))
    }

    pub fn from_f32(width: usize, height: usize, data: Vec<f32>) -> Result<Self, FrameError> {
        Self::from_buffer(width, height, PixelBuffer::F32(data))
    }

    pub fn from_buffer(width: usize, height: usize, buffer: PixelBuffer) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions);
        }
        let expected = width * height * 4;
        if buffer.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: buffer.len(),
            });
        }
        Ok(Self {
            width,
            height,
            buffer: Arc::new(buffer),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn buffer(&self) -> &Arc<PixelBuffer> {
        &self.buffer
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.buffer.format()
    }

    /// Pixel memory in bytes
    pub fn mem(&self) -> usize {
        self.width * self.height * self.pixel_format().bytes_per_pixel()
    }

    /// True if both frames share one pixel allocation.
    pub fn shares_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Pixels as f32 RGBA (U8 normalized to 0..1).
    pub fn to_f32(&self) -> Vec<f32> {
        match self.buffer.as_ref() {
            PixelBuffer::U8(data) => data.iter().map(|&v| v as f32 / 255.0).collect(),
            PixelBuffer::F16(data) => data.iter().map(|v| v.to_f32()).collect(),
            PixelBuffer::F32(data) => data.clone(),
        }
    }

    /// One pixel as f32 RGBA, `None` outside the frame.
    pub fn pixel(&self, x: usize, y: usize) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        let px = match self.buffer.as_ref() {
            PixelBuffer::U8(d) => [0, 1, 2, 3].map(|c| d[i + c] as f32 / 255.0),
            PixelBuffer::F16(d) => [0, 1, 2, 3].map(|c| d[i + c].to_f32()),
            PixelBuffer::F32(d) => [d[i], d[i + 1], d[i + 2], d[i + 3]],
        };
        Some(px)
    }
}

/// Decoded frame held by the frame cache.
///
/// `release()` drops the pixels; the frame is gone afterwards even if
/// someone still holds the `FrameResource` itself.
#[derive(Debug)]
pub struct FrameResource {
    frame: Mutex<Option<Frame>>,
    mem: usize,
    released: AtomicBool,
}

impl FrameResource {
    pub fn new(frame: Frame) -> Self {
        Self {
            mem: frame.mem(),
            frame: Mutex::new(Some(frame)),
            released: AtomicBool::new(false),
        }
    }

    /// The frame, or `None` once released.
    pub fn frame(&self) -> Option<Frame> {
        self.frame.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl From<Frame> for FrameResource {
    fn from(frame: Frame) -> Self {
        Self::new(frame)
    }
}

impl Resource for FrameResource {
    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.frame.lock().unwrap_or_else(|e| e.into_inner()).take();
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn mem(&self) -> usize {
        self.mem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_frame() {
        let frame = Frame::solid(4, 2, [0.5, 0.25, 1.0, 1.0]);
        assert_eq!(frame.resolution(), (4, 2));
        assert_eq!(frame.pixel_format(), PixelFormat::RgbaF32);
        assert_eq!(frame.mem(), 4 * 2 * 16);
        assert_eq!(frame.pixel(3, 1), Some([0.5, 0.25, 1.0, 1.0]));
        assert_eq!(frame.pixel(4, 0), None);
    }

    #[test]
    fn test_size_checked() {
        assert_eq!(
            Frame::from_u8(2, 2, vec![0; 15]).unwrap_err(),
            FrameError::SizeMismatch { expected: 16, actual: 15 }
        );
        assert_eq!(Frame::from_f32(0, 2, vec![]).unwrap_err(), FrameError::EmptyDimensions);
    }

    #[test]
    fn test_to_f32_normalizes() {
        let frame = Frame::from_u8(1, 1, vec![255, 0, 51, 255]).unwrap();
        assert_eq!(frame.to_f32(), vec![1.0, 0.0, 0.2, 1.0]);

        let half = Frame::from_f16(1, 1, vec![F16::from_f32(2.0); 4]).unwrap();
        assert_eq!(half.pixel(0, 0), Some([2.0; 4]));
        assert_eq!(half.mem(), 8);
    }

    #[test]
    fn test_clone_shares_pixels() {
        let frame = Frame::new(8, 8);
        let copy = frame.clone();
        assert!(frame.shares_buffer(&copy));
    }

    #[test]
    fn test_frame_resource_release() {
        let res = FrameResource::new(Frame::new(2, 2));
        assert_eq!(res.mem(), 16);
        assert!(res.frame().is_some());

        res.release();
        res.release();
        assert!(res.is_released());
        assert!(res.frame().is_none());
        // Size is still reported for accounting
        assert_eq!(res.mem(), 16);
    }
}
