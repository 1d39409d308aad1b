#![allow(dead_code)]

use anyhow::{anyhow, Result};
use pero_processing_client::{
    config::Settings,
    engine::{PageProcessor, ProcessedPage, ProcessorFactory},
    layout::{OcrProcessing, PageLayout, TextLine, TextRegion},
    raster::PageImage,
    server::{EngineDownload, ProcessingRequest, ProcessingServer, ResultUpload},
};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

pub fn settings(engines_path: &Path) -> Settings {
    Settings {
        api_key: "secret".into(),
        engines_path: engines_path.to_path_buf(),
        preferred_engine: "1".into(),
        poll_interval_seconds: 10,
        max_idle_polls: 0,
        score: "100".into(),
    }
}

pub fn bundle_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut w = zip::ZipWriter::new(&mut buf);
        let opts = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, body) in files {
            w.start_file(*name, opts).unwrap();
            w.write_all(body.as_bytes()).unwrap();
        }
        w.finish().unwrap();
    }
    buf.into_inner()
}

pub fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn idle(status: &str) -> ProcessingRequest {
    ProcessingRequest {
        status: status.into(),
        page_id: None,
        page_url: None,
        engine_id: None,
    }
}

pub fn work(page_id: &str, engine_id: &str) -> ProcessingRequest {
    ProcessingRequest {
        status: "success".into(),
        page_id: Some(page_id.into()),
        page_url: Some(format!("http://images/{page_id}.png")),
        engine_id: Some(engine_id.into()),
    }
}

/// Reader that fails the test if anything tries to consume it.
pub struct UntouchedBody;

impl Read for UntouchedBody {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        panic!("engine archive body was read");
    }
}

#[derive(Default)]
pub struct Calls {
    pub downloads: Vec<String>,
    pub polls: Vec<String>,
    pub fetches: Vec<String>,
    pub uploads: Vec<(String, ResultUpload)>,
}

/// Scripted processing server; `next_request` errors once the script runs out.
#[derive(Default)]
pub struct FakeServer {
    pub bundles: HashMap<String, (String, Vec<u8>)>,
    pub skip_body: bool,
    pub script: RefCell<VecDeque<ProcessingRequest>>,
    pub calls: RefCell<Calls>,
}

impl FakeServer {
    pub fn with_engine(mut self, id: &str, file_name: &str) -> Self {
        let zip = bundle_zip(&[("config.ini", "[PAGE_PARSER]\nRUN_LAYOUT_PARSER = yes\n")]);
        self.bundles.insert(id.into(), (file_name.into(), zip));
        self
    }

    pub fn then(self, req: ProcessingRequest) -> Self {
        self.script.borrow_mut().push_back(req);
        self
    }
}

impl ProcessingServer for FakeServer {
    fn download_engine(&self, engine_id: &str) -> Result<EngineDownload> {
        self.calls.borrow_mut().downloads.push(engine_id.into());
        let (file_name, zip) = self
            .bundles
            .get(engine_id)
            .ok_or_else(|| anyhow!("no engine {engine_id}"))?;
        let body: Box<dyn Read> = if self.skip_body {
            Box::new(UntouchedBody)
        } else {
            Box::new(Cursor::new(zip.clone()))
        };
        Ok(EngineDownload {
            content_disposition: format!("attachment; filename={file_name}"),
            body,
        })
    }

    fn next_request(&self, preferred_engine: &str) -> Result<ProcessingRequest> {
        self.calls.borrow_mut().polls.push(preferred_engine.into());
        self.script
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("script exhausted"))
    }

    fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.borrow_mut().fetches.push(url.into());
        Ok(png(4, 3, [200, 10, 30]))
    }

    fn upload_results(&self, page_id: &str, upload: &ResultUpload) -> Result<()> {
        self.calls
            .borrow_mut()
            .uploads
            .push((page_id.into(), upload.clone()));
        Ok(())
    }
}

/// Processor that "recognizes" a fixed list of lines in one region. With
/// `library_xml` it also answers with its own ALTO and PAGE documents.
pub struct StubProcessor {
    pub lines: Vec<String>,
    pub library_xml: bool,
}

impl PageProcessor for StubProcessor {
    fn process_page(
        &mut self,
        image: &PageImage,
        mut layout: PageLayout,
        processing: &OcrProcessing,
    ) -> Result<ProcessedPage> {
        assert_eq!((layout.width, layout.height), (image.width, image.height));
        if !self.lines.is_empty() {
            layout.regions.push(TextRegion {
                id: "r1".into(),
                polygon: vec![],
                lines: self
                    .lines
                    .iter()
                    .enumerate()
                    .map(|(i, t)| line(&format!("l{i}"), t))
                    .collect(),
            });
        }
        if !self.library_xml {
            return Ok(layout.into());
        }
        Ok(ProcessedPage {
            alto: Some(format!(
                "<alto by=\"{}\" name=\"{}\" version=\"{}\"/>",
                processing.software_creator, processing.software_name, processing.software_version
            )),
            page_xml: Some(format!("<PcGts page=\"{}\"/>", layout.id)),
            layout,
        })
    }
}

pub fn line(id: &str, text: &str) -> TextLine {
    TextLine {
        id: id.into(),
        baseline: vec![],
        polygon: vec![],
        heights: None,
        transcription: text.into(),
        confidence: None,
    }
}

#[derive(Default)]
pub struct StubFactory {
    pub lines: Vec<String>,
    pub library_xml: bool,
    pub opened: RefCell<Vec<PathBuf>>,
}

impl ProcessorFactory for StubFactory {
    fn open(&self, bundle_dir: &Path) -> Result<Box<dyn PageProcessor>> {
        self.opened.borrow_mut().push(bundle_dir.to_path_buf());
        Ok(Box::new(StubProcessor {
            lines: self.lines.clone(),
            library_xml: self.library_xml,
        }))
    }
}
