use crate::layout::{OcrProcessing, PageLayout};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyOut {
    pub ok: bool,
    #[serde(default)]
    pub engine_config: Option<String>,
    #[serde(default)]
    pub library_version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessIn<'a> {
    pub cmd: &'static str,
    pub image: RawImage,
    pub layout: &'a PageLayout,
    pub ocr_processing: &'a OcrProcessing,
}

/// Raw interleaved pixels on disk; the runner reshapes to `height x width x channels`.
#[derive(Debug, Clone, Serialize)]
pub struct RawImage {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub order: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOut {
    pub ok: bool,
    #[serde(default)]
    pub layout: Option<PageLayout>,
    /// ALTO written by the library with `ocr_processing` as its description.
    #[serde(default)]
    pub alto: Option<String>,
    #[serde(default)]
    pub page_xml: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}
