use std::path::Path;

use tracing::info;

use crate::error::{MoshError, MoshResult};

pub mod gif;

/// Largest accepted source dimension on either axis.
pub const MAX_DIMENSION: u32 = 4096;

/// A decoded still image, straight-alpha RGBA8.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub(crate) fn validate_dimensions(width: u32, height: u32) -> MoshResult<()> {
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(MoshError::decode(format!(
            "invalid source dimensions {width}x{height} (accepted range 1..={MAX_DIMENSION})"
        )));
    }
    Ok(())
}

/// Decode a still image from raw encoded bytes.
pub fn decode_image(bytes: &[u8]) -> MoshResult<DecodedImage> {
    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| MoshError::decode(format!("decode image: {e}")))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    validate_dimensions(width, height)?;

    Ok(DecodedImage {
        width,
        height,
        pixels: rgba.into_raw(),
    })
}

/// Decode a still image from a filesystem path.
pub fn load_image(path: &Path) -> MoshResult<DecodedImage> {
    let bytes = std::fs::read(path)
        .map_err(|e| MoshError::decode(format!("read image '{}': {e}", path.display())))?;
    let decoded = decode_image(&bytes)?;
    info!(
        path = %path.display(),
        width = decoded.width,
        height = decoded.height,
        "image loaded"
    );
    Ok(decoded)
}
