//! Color frame conversion and the reusable output buffer.

use crate::types::{ColorFrame, ColorFrameRef, PixelFormat};
use crate::{KinectError, Result};
use parking_lot::Mutex;

pub const COLOR_WIDTH: u32 = 1920;
pub const COLOR_HEIGHT: u32 = 1080;
pub const COLOR_BYTES_PER_PIXEL: usize = 4;
pub const COLOR_BUFFER_SIZE: usize =
    COLOR_WIDTH as usize * COLOR_HEIGHT as usize * COLOR_BYTES_PER_PIXEL;

/// Pixel formats a sensor can deliver raw color data in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorImageFormat {
    Rgba,
    Yuv,
    Bgra,
    Bayer,
    Yuy2,
}

impl ColorImageFormat {
    /// Bytes per pixel of the raw layout, `None` for formats we cannot decode.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            ColorImageFormat::Rgba | ColorImageFormat::Bgra => Some(4),
            ColorImageFormat::Yuy2 => Some(2),
            ColorImageFormat::Yuv | ColorImageFormat::Bayer => None,
        }
    }
}

/// A color frame in the sensor's raw format.
#[derive(Debug, Clone)]
pub struct RawColorFrame {
    pub width: u32,
    pub height: u32,
    pub format: ColorImageFormat,
    pub data: Vec<u8>,
}

impl RawColorFrame {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Convert into `out` as BGRA. `out` must hold exactly width*height*4 bytes.
    pub fn copy_converted_to(&self, out: &mut [u8]) -> Result<()> {
        let bpp = self
            .format
            .bytes_per_pixel()
            .ok_or(KinectError::UnsupportedColorFormat(self.format))?;

        let expected_in = self.pixel_count() * bpp;
        if self.data.len() != expected_in {
            return Err(KinectError::ColorFrameSize {
                expected: expected_in,
                got: self.data.len(),
            });
        }
        let expected_out = self.pixel_count() * COLOR_BYTES_PER_PIXEL;
        if out.len() != expected_out {
            return Err(KinectError::ColorFrameSize {
                expected: expected_out,
                got: out.len(),
            });
        }

        match self.format {
            ColorImageFormat::Bgra => out.copy_from_slice(&self.data),
            ColorImageFormat::Rgba => {
                for (dst, src) in out.chunks_exact_mut(4).zip(self.data.chunks_exact(4)) {
                    dst[0] = src[2];
                    dst[1] = src[1];
                    dst[2] = src[0];
                    dst[3] = src[3];
                }
            }
            ColorImageFormat::Yuy2 => {
                // [Y0 U Y1 V] -> two BGRA pixels
                for (dst, src) in out.chunks_exact_mut(8).zip(self.data.chunks_exact(4)) {
                    let (u, v) = (src[1], src[3]);
                    dst[..4].copy_from_slice(&yuv_to_bgra(src[0], u, v));
                    dst[4..].copy_from_slice(&yuv_to_bgra(src[2], u, v));
                }
            }
            other => return Err(KinectError::UnsupportedColorFormat(other)),
        }
        Ok(())
    }
}

/// BT.601 limited-range YUV to BGRA.
fn yuv_to_bgra(y: u8, u: u8, v: u8) -> [u8; 4] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| x.clamp(0, 255) as u8;
    let r = clamp((298 * c + 409 * e + 128) >> 8);
    let g = clamp((298 * c - 100 * d - 208 * e + 128) >> 8);
    let b = clamp((298 * c + 516 * d + 128) >> 8);
    [b, g, r, 0xFF]
}

struct ColorBuffer {
    data: Vec<u8>,
    /// Bytes of `data` holding the latest frame; zero until one arrives.
    last_written: usize,
    width: u32,
    height: u32,
    reallocations: u64,
}

impl ColorBuffer {
    fn reserve(&mut self, size: usize) {
        if self.data.len() != size {
            log::debug!("Reallocating color buffer: {} -> {} bytes", self.data.len(), size);
            self.data = vec![0u8; size];
            self.last_written = 0;
            self.reallocations += 1;
        }
    }
}

/// Reusable BGRA buffer holding the most recent color frame.
pub struct ColorBufferStore {
    inner: Mutex<ColorBuffer>,
}

impl Default for ColorBufferStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorBufferStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ColorBuffer {
                data: Vec::new(),
                last_written: 0,
                width: 0,
                height: 0,
                reallocations: 0,
            }),
        }
    }

    /// Convert `frame` into the buffer at the fixed output resolution.
    pub fn update(&self, frame: &RawColorFrame) -> Result<()> {
        self.update_sized(frame, COLOR_WIDTH, COLOR_HEIGHT)
    }

    /// Convert `frame` into a `width`x`height` BGRA buffer, reallocating only
    /// when that size differs from the current allocation.
    pub fn update_sized(&self, frame: &RawColorFrame, width: u32, height: u32) -> Result<()> {
        let required = width as usize * height as usize * COLOR_BYTES_PER_PIXEL;
        let mut buf = self.inner.lock();
        buf.reserve(required);
        frame.copy_converted_to(&mut buf.data[..required])?;
        buf.last_written = required;
        buf.width = width;
        buf.height = height;
        Ok(())
    }

    /// Run `f` on the latest frame without copying it.
    pub fn with_frame<R>(&self, f: impl FnOnce(ColorFrameRef<'_>) -> R) -> Option<R> {
        let buf = self.inner.lock();
        if buf.last_written == 0 {
            return None;
        }
        Some(f(ColorFrameRef {
            data: &buf.data[..buf.last_written],
            width: buf.width,
            height: buf.height,
            format: PixelFormat::Bgra32,
        }))
    }

    pub fn snapshot(&self) -> Option<ColorFrame> {
        self.with_frame(|frame| frame.to_frame())
    }

    pub fn allocated(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn last_written(&self) -> usize {
        self.inner.lock().last_written
    }

    pub fn reallocations(&self) -> u64 {
        self.inner.lock().reallocations
    }
}
