use crate::{
    config::Settings,
    engine::{ProcessedPage, ProcessorFactory},
    layout::{to_alto_xml, to_page_xml, to_plain_text, OcrProcessing, PageLayout},
    provision::{get_engine, LoadedEngine},
    raster::PageImage,
    server::{PageJob, ProcessingServer, ResultUpload},
};
use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Idle { status: String },
    Processed { page_id: String },
}

/// State that changes while the loop runs. The preferred engine follows
/// whatever engine the server last assigned; it is never written back to
/// the config file.
#[derive(Debug)]
pub struct Session {
    pub preferred_engine: String,
    pub engine: LoadedEngine,
}

pub struct Worker<S: ProcessingServer, F: ProcessorFactory> {
    settings: Settings,
    server: S,
    factory: F,
    session: Session,
}

impl<S: ProcessingServer, F: ProcessorFactory> Worker<S, F> {
    /// Loads the preferred engine and returns a worker ready to poll.
    pub fn start(settings: &Settings, server: S, factory: F) -> Result<Self> {
        let engine = get_engine(settings, &server, &factory, &settings.preferred_engine)?;
        Ok(Self {
            settings: settings.clone(),
            server,
            factory,
            session: Session {
                preferred_engine: settings.preferred_engine.clone(),
                engine,
            },
        })
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Polls until an error occurs or `max_idle_polls` consecutive idle polls
    /// have been seen. `sleep` is called once per idle poll that is retried.
    pub fn run(&mut self, mut sleep: impl FnMut(Duration)) -> Result<()> {
        let interval = Duration::from_secs(self.settings.poll_interval_seconds);
        let max_idle = self.settings.max_idle_polls;
        let mut idle = 0u64;
        loop {
            match self.poll_once()? {
                PollOutcome::Idle { status } => {
                    idle += 1;
                    if max_idle > 0 && idle >= max_idle {
                        info!("stopping after {idle} idle polls (last status={status})");
                        return Ok(());
                    }
                    debug!("no work (status={status}); sleeping {:?}", interval);
                    sleep(interval);
                }
                PollOutcome::Processed { .. } => idle = 0,
            }
        }
    }

    pub fn poll_once(&mut self) -> Result<PollOutcome> {
        let req = self
            .server
            .next_request(&self.session.preferred_engine)
            .with_context(|| "polling for processing request")?;
        if !req.is_success() {
            return Ok(PollOutcome::Idle { status: req.status });
        }
        let job = req.work()?;
        self.ensure_engine(&job.engine_id)?;
        self.process(&job)?;
        Ok(PollOutcome::Processed {
            page_id: job.page_id,
        })
    }

    fn ensure_engine(&mut self, engine_id: &str) -> Result<()> {
        if self.session.engine.id == engine_id {
            return Ok(());
        }
        info!(
            "server assigned engine {engine_id}; switching from {}",
            self.session.engine.id
        );
        let engine = get_engine(&self.settings, &self.server, &self.factory, engine_id)?;
        self.session.engine = engine;
        self.session.preferred_engine = engine_id.to_string();
        Ok(())
    }

    fn process(&mut self, job: &PageJob) -> Result<()> {
        let started = Instant::now();
        info!("processing page {} ({})", job.page_id, job.page_url);

        let bytes = self
            .server
            .fetch_image(&job.page_url)
            .with_context(|| format!("fetching page {}", job.page_id))?;
        let image = PageImage::decode(&bytes)
            .with_context(|| format!("page {} from {}", job.page_id, job.page_url))?;
        debug!(
            "page {} decoded {}x{} ({} bytes)",
            job.page_id,
            image.width,
            image.height,
            bytes.len()
        );

        let engine = &mut self.session.engine;
        let processing = OcrProcessing::for_engine(&engine.name, &engine.version);
        let layout = PageLayout::new(&job.page_id, image.width, image.height);
        let page = engine.processor.process_page(&image, layout, &processing)?;

        let upload = build_upload(&page, &processing, &engine.version, &self.settings.score);
        self.server
            .upload_results(&job.page_id, &upload)
            .with_context(|| format!("uploading results for page {}", job.page_id))?;

        info!(
            "page {} done lines={} elapsed_ms={}",
            job.page_id,
            page.layout.lines().count(),
            started.elapsed().as_millis()
        );
        Ok(())
    }
}

/// Assembles the three upload artifacts. XML the library produced is sent
/// as is; missing documents are written from the layout.
pub fn build_upload(
    page: &ProcessedPage,
    processing: &OcrProcessing,
    engine_version: &str,
    score: &str,
) -> ResultUpload {
    let layout = &page.layout;
    let alto = page.alto.clone().unwrap_or_else(|| {
        debug!("page {}: engine returned no ALTO, writing it from the layout", layout.id);
        to_alto_xml(layout, processing)
    });
    let page_xml = page.page_xml.clone().unwrap_or_else(|| {
        debug!("page {}: engine returned no PAGE XML, writing it from the layout", layout.id);
        to_page_xml(layout)
    });
    ResultUpload::new(
        &layout.id,
        engine_version,
        score,
        alto,
        page_xml,
        to_plain_text(layout),
    )
}
