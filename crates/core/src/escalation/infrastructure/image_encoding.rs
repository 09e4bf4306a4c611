use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, RgbImage};
use thiserror::Error;

use crate::shared::frame::Frame;

const JPEG_QUALITY: u8 = 80;
const DATA_URL_MARKER: &str = ";base64,";

#[derive(Error, Debug)]
pub enum ImageEncodingError {
    #[error("frame has no decodable RGB data")]
    Undecodable,
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub fn encode_jpeg_base64(img: &RgbImage) -> Result<String, ImageEncodingError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(img)?;
    Ok(BASE64_STANDARD.encode(buf))
}

pub fn frame_to_jpeg_base64(frame: &Frame) -> Result<String, ImageEncodingError> {
    let img = frame.to_rgb_image().ok_or(ImageEncodingError::Undecodable)?;
    encode_jpeg_base64(&img)
}

/// Accepts bare base64 or a `data:image/...;base64,` URL.
pub fn strip_data_url(payload: &str) -> &str {
    let payload = payload.trim();
    match payload.find(DATA_URL_MARKER) {
        Some(pos) if payload.starts_with("data:") => &payload[pos + DATA_URL_MARKER.len()..],
        _ => payload,
    }
}

pub fn decode_base64_image(payload: &str) -> Result<RgbImage, ImageEncodingError> {
    let bytes = BASE64_STANDARD.decode(strip_data_url(payload))?;
    Ok(image::load_from_memory(&bytes)?.to_rgb8())
}
