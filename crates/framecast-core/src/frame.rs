//! Frames and the producer contract.

/// An RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    /// Opaque white.
    pub const WHITE: Self = Self([0xff, 0xff, 0xff, 0xff]);
    /// Opaque red.
    pub const RED: Self = Self([0xff, 0x00, 0x00, 0xff]);
    /// Opaque green (CSS `green`).
    pub const GREEN: Self = Self([0x00, 0x80, 0x00, 0xff]);
    /// The cyan used by the quadrant pattern.
    pub const CYAN: Self = Self([100, 200, 200, 0xff]);
}

/// One rendered frame: a row-major, top-down RGBA pixel buffer.
///
/// Frames are produced fresh each iteration and dropped once encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    /// A frame filled with a single color.
    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        let count = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: color.0.repeat(count),
        }
    }

    /// Wrap a raw buffer without validating its length.
    ///
    /// Codecs reject buffers that do not hold `width * height * 4` bytes.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Number of bytes a well-formed buffer holds.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Set one pixel. Out-of-bounds coordinates are ignored.
    pub fn set(&mut self, x: u32, y: u32, color: Rgba) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        if let Some(px) = self.pixels.get_mut(offset..offset + 4) {
            px.copy_from_slice(&color.0);
        }
    }

    /// Read one pixel.
    pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(offset..offset + 4)?;
        Some(Rgba([px[0], px[1], px[2], px[3]]))
    }

    /// Fill the axis-aligned rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: Rgba) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for py in y..y_end {
            for px in x..x_end {
                self.set(px, py, color);
            }
        }
    }
}

/// Generates one frame per stream iteration.
///
/// Each session owns its producer exclusively. Implementations must always
/// return a well-formed frame; a malformed one is a producer bug and ends the
/// stream when the codec rejects it.
pub trait FrameProducer: Send {
    /// Produce the next frame.
    fn next_frame(&mut self) -> Frame;
}
