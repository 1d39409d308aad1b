use anyhow::{Context, Result};

/// Decoded page raster in interleaved 8-bit BGR order.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub width: u32,
    pub height: u32,
    pub bgr: Vec<u8>,
}

impl PageImage {
    /// Decodes any supported raster format and reorders channels to BGR.
    /// Alpha is dropped and grayscale is expanded to three channels.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes).with_context(|| "decoding page image")?;
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut bgr = rgb.into_raw();
        for px in bgr.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        Ok(Self { width, height, bgr })
    }
}
