pub mod python;
pub mod types;

use crate::{
    layout::{OcrProcessing, PageLayout},
    raster::PageImage,
};
use anyhow::Result;
use std::path::Path;

pub use python::{PythonPageParser, PythonProcessorFactory};

/// A recognized page. `alto` and `page_xml` are the library's own
/// serializations; `None` means the caller has to serialize `layout`.
#[derive(Debug, Clone)]
pub struct ProcessedPage {
    pub layout: PageLayout,
    pub alto: Option<String>,
    pub page_xml: Option<String>,
}

impl From<PageLayout> for ProcessedPage {
    fn from(layout: PageLayout) -> Self {
        Self {
            layout,
            alto: None,
            page_xml: None,
        }
    }
}

/// Runs layout analysis and text recognition for one page.
pub trait PageProcessor {
    fn process_page(
        &mut self,
        image: &PageImage,
        layout: PageLayout,
        processing: &OcrProcessing,
    ) -> Result<ProcessedPage>;
}

/// Builds a processor from an extracted engine bundle directory.
pub trait ProcessorFactory {
    fn open(&self, bundle_dir: &Path) -> Result<Box<dyn PageProcessor>>;
}
