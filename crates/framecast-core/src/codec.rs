//! Frame encoding: image codecs and the data-URI payload encoder.
//!
//! Payloads are text messages of the form
//! `data:image/<format>;base64,<encoded-bytes>`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::errors::EncodeError;
use crate::frame::Frame;

/// Serializes a frame into image file bytes.
pub trait ImageCodec: Send + Sync {
    /// Image subtype used in the MIME type (`image/<format>`).
    fn format(&self) -> &'static str;

    /// Encode the frame.
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError>;
}

/// Serializes a frame into a transport-ready text payload.
pub trait FrameEncoder: Send + Sync {
    /// Encode the frame into one message payload.
    fn encode(&self, frame: &Frame) -> Result<String, EncodeError>;
}

/// Wraps an [`ImageCodec`] output in a base64 data URI.
pub struct DataUriEncoder<C> {
    codec: C,
}

impl<C: ImageCodec> DataUriEncoder<C> {
    /// Encoder around `codec`.
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    /// Prefix every payload starts with.
    pub fn prefix(&self) -> String {
        format!("data:image/{};base64,", self.codec.format())
    }
}

impl<C: ImageCodec> FrameEncoder for DataUriEncoder<C> {
    fn encode(&self, frame: &Frame) -> Result<String, EncodeError> {
        let bytes = self.codec.encode(frame)?;
        let mut payload = self.prefix();
        STANDARD.encode_string(&bytes, &mut payload);
        Ok(payload)
    }
}

/// Uncompressed 24-bit BMP (`BITMAPINFOHEADER`, bottom-up rows).
///
/// Alpha is dropped. Rows are padded to a multiple of four bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct BmpCodec;

const FILE_HEADER_LEN: u32 = 14;
const INFO_HEADER_LEN: u32 = 40;
const PIXELS_PER_METER: i32 = 2835;

impl BmpCodec {
    fn row_stride(width: u32) -> Option<u32> {
        width.checked_mul(3)?.checked_add(3).map(|n| n & !3)
    }
}

impl ImageCodec for BmpCodec {
    fn format(&self) -> &'static str {
        "bmp"
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        let (width, height) = (frame.width(), frame.height());
        if frame.pixels().len() != frame.expected_len() {
            return Err(EncodeError::InvalidFrame {
                width,
                height,
                expected: frame.expected_len(),
                actual: frame.pixels().len(),
            });
        }

        let too_large = EncodeError::DimensionsTooLarge { width, height };
        let signed_w = i32::try_from(width).map_err(|_| too_large.clone())?;
        let signed_h = i32::try_from(height).map_err(|_| too_large.clone())?;
        let stride = Self::row_stride(width).ok_or_else(|| too_large.clone())?;
        let image_len = stride.checked_mul(height).ok_or_else(|| too_large.clone())?;
        let offset = FILE_HEADER_LEN + INFO_HEADER_LEN;
        let file_len = image_len.checked_add(offset).ok_or(too_large)?;

        let mut out = Vec::with_capacity(file_len as usize);
        // BITMAPFILEHEADER
        out.extend_from_slice(b"BM");
        out.extend_from_slice(&file_len.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&offset.to_le_bytes());
        // BITMAPINFOHEADER
        out.extend_from_slice(&INFO_HEADER_LEN.to_le_bytes());
        out.extend_from_slice(&signed_w.to_le_bytes());
        out.extend_from_slice(&signed_h.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&24u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&image_len.to_le_bytes());
        out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
        out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());

        let padding = (stride - width * 3) as usize;
        let row_len = width as usize * 4;
        if row_len > 0 {
            for row in frame.pixels().chunks_exact(row_len).rev() {
                for px in row.chunks_exact(4) {
                    out.extend_from_slice(&[px[2], px[1], px[0]]);
                }
                out.extend(std::iter::repeat_n(0u8, padding));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;
    use crate::frame::Rgba;

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn bmp_header_fields() {
        let frame = Frame::filled(3, 2, Rgba::WHITE);
        let bytes = BmpCodec.encode(&frame).unwrap();
        assert_eq!(&bytes[..2], b"BM");
        // 3px * 3 bytes = 9, padded to 12 per row
        assert_eq!(u32_at(&bytes, 2) as usize, bytes.len());
        assert_eq!(bytes.len(), 54 + 12 * 2);
        assert_eq!(u32_at(&bytes, 10), 54);
        assert_eq!(u32_at(&bytes, 18), 3);
        assert_eq!(u32_at(&bytes, 22), 2);
        assert_eq!(u32_at(&bytes, 34), 24);
    }

    #[test]
    fn bmp_rows_are_bottom_up_bgr() {
        let mut frame = Frame::filled(1, 2, Rgba::WHITE);
        frame.set(0, 0, Rgba::RED);
        let bytes = BmpCodec.encode(&frame).unwrap();
        // first stored row is the bottom (white), second is the top (red as BGR)
        assert_eq!(&bytes[54..57], &[0xff, 0xff, 0xff]);
        assert_eq!(&bytes[58..61], &[0x00, 0x00, 0xff]);
    }

    #[test]
    fn malformed_frame_is_rejected() {
        let frame = Frame::from_raw(4, 4, vec![0; 10]);
        let err = BmpCodec.encode(&frame).unwrap_err();
        assert_matches!(err, EncodeError::InvalidFrame { expected: 64, actual: 10, .. });
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let frame = Frame::from_raw(u32::MAX, 0, Vec::new());
        let err = BmpCodec.encode(&frame).unwrap_err();
        assert_matches!(err, EncodeError::DimensionsTooLarge { .. });
    }

    #[test]
    fn data_uri_prefix_matches_codec() {
        let encoder = DataUriEncoder::new(BmpCodec);
        let payload = encoder.encode(&Frame::filled(2, 2, Rgba::CYAN)).unwrap();
        assert!(payload.starts_with("data:image/bmp;base64,"));
        let body = payload.trim_start_matches(&encoder.prefix());
        let decoded = STANDARD.decode(body).unwrap();
        assert_eq!(&decoded[..2], b"BM");
    }

    #[test]
    fn data_uri_propagates_codec_error() {
        let encoder = DataUriEncoder::new(BmpCodec);
        let result = encoder.encode(&Frame::from_raw(1, 1, Vec::new()));
        assert_matches!(result, Err(EncodeError::InvalidFrame { .. }));
    }

    proptest! {
        #[test]
        fn bmp_length_follows_stride(w in 1u32..64, h in 1u32..64) {
            let bytes = BmpCodec.encode(&Frame::filled(w, h, Rgba::GREEN)).unwrap();
            let stride = ((w * 3 + 3) & !3) as usize;
            prop_assert_eq!(bytes.len(), 54 + stride * h as usize);
            prop_assert_eq!(u32_at(&bytes, 2) as usize, bytes.len());
        }
    }
}
