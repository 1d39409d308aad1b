//! HTTP exchanges with the processing server.
//!
//! [`ProcessingServer`] is the seam the poll loop and the engine provisioner
//! talk through; [`HttpServer`] is the real implementation over one reused
//! blocking client.

use crate::{config::Config, util::join_url};
use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{multipart, Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION};
use serde::{Deserialize, Deserializer};
use std::io::Read;
use tracing::{debug, warn};

pub const STATUS_SUCCESS: &str = "success";

pub trait ProcessingServer {
    fn download_engine(&self, engine_id: &str) -> Result<EngineDownload>;
    fn next_request(&self, preferred_engine: &str) -> Result<ProcessingRequest>;
    fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
    /// Only transport failures are errors. A non-2xx reply is logged and the
    /// page is dropped.
    fn upload_results(&self, page_id: &str, upload: &ResultUpload) -> Result<()>;
}

/// Engine bundle response: the served filename header and a body that is
/// only read when the bundle has to be installed.
pub struct EngineDownload {
    pub content_disposition: String,
    pub body: Box<dyn Read>,
}

impl std::fmt::Debug for EngineDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineDownload")
            .field("content_disposition", &self.content_disposition)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessingRequest {
    pub status: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub page_id: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub engine_id: Option<String>,
}

impl ProcessingRequest {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// The work item of a `success` response; all three fields are required.
    pub fn work(&self) -> Result<PageJob> {
        let field = |v: &Option<String>, name: &str| {
            v.clone()
                .ok_or_else(|| anyhow!("processing request is missing {name}"))
        };
        Ok(PageJob {
            page_id: field(&self.page_id, "page_id")?,
            page_url: field(&self.page_url, "page_url")?,
            engine_id: field(&self.engine_id, "engine_id")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageJob {
    pub page_id: String,
    pub page_url: String,
    pub engine_id: String,
}

fn opt_string_or_number<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    match v {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub field: &'static str,
    pub file_name: String,
    pub content: String,
}

/// The three result artifacts of one page plus the headers that describe them.
#[derive(Debug, Clone)]
pub struct ResultUpload {
    pub engine_version: String,
    pub score: String,
    pub parts: Vec<UploadPart>,
}

impl ResultUpload {
    pub const MIME: &'static str = "text/plain";

    pub fn new(
        page_id: &str,
        engine_version: &str,
        score: &str,
        alto: String,
        page_xml: String,
        text: String,
    ) -> Self {
        Self {
            engine_version: engine_version.to_string(),
            score: score.to_string(),
            parts: vec![
                UploadPart {
                    field: "alto",
                    file_name: format!("{page_id}_alto.xml"),
                    content: alto,
                },
                UploadPart {
                    field: "xml",
                    file_name: format!("{page_id}.xml"),
                    content: page_xml,
                },
                UploadPart {
                    field: "txt",
                    file_name: format!("{page_id}.txt"),
                    content: text,
                },
            ],
        }
    }
}

pub struct HttpServer {
    client: Client,
    base_url: String,
    download_engine_path: String,
    processing_request_path: String,
    upload_results_path: String,
    api_key: String,
}

impl HttpServer {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pero-processing-client/", env!("CARGO_PKG_VERSION")))
            .timeout(None::<std::time::Duration>)
            .build()
            .with_context(|| "building HTTP client")?;
        Ok(Self {
            client,
            base_url: cfg.server.base_url.clone(),
            download_engine_path: cfg.server.get_download_engine.clone(),
            processing_request_path: cfg.server.get_processing_request.clone(),
            upload_results_path: cfg.server.post_upload_results.clone(),
            api_key: cfg.settings.api_key.clone(),
        })
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(&self.api_key).with_context(|| "api_key is not a valid header value")?,
        );
        Ok(headers)
    }
}

fn ensure_success(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        bail!("{what} failed: HTTP {status}: {}", body.trim());
    }
    Ok(resp)
}

impl ProcessingServer for HttpServer {
    fn download_engine(&self, engine_id: &str) -> Result<EngineDownload> {
        let url = join_url(&self.base_url, &[self.download_engine_path.as_str(), engine_id]);
        debug!("GET {url}");
        let resp = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .with_context(|| format!("GET {url}"))?;
        let resp = ensure_success(resp, "engine download")?;
        let content_disposition = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .ok_or_else(|| anyhow!("engine download {url} has no content-disposition header"))?
            .to_str()
            .with_context(|| "content-disposition is not valid text")?
            .to_string();
        Ok(EngineDownload {
            content_disposition,
            body: Box::new(resp),
        })
    }

    fn next_request(&self, preferred_engine: &str) -> Result<ProcessingRequest> {
        let url = join_url(&self.base_url, &[self.processing_request_path.as_str(), preferred_engine]);
        let resp = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        resp.json::<ProcessingRequest>()
            .with_context(|| format!("decoding processing request from {url} (HTTP {status})"))
    }

    fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {url}");
        let resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?;
        let resp = ensure_success(resp, "page image fetch")?;
        let bytes = resp.bytes().with_context(|| format!("reading body of {url}"))?;
        Ok(bytes.to_vec())
    }

    fn upload_results(&self, page_id: &str, upload: &ResultUpload) -> Result<()> {
        let url = join_url(&self.base_url, &[self.upload_results_path.as_str(), page_id]);
        let mut form = multipart::Form::new();
        for part in &upload.parts {
            let p = multipart::Part::text(part.content.clone())
                .file_name(part.file_name.clone())
                .mime_str(ResultUpload::MIME)?;
            form = form.part(part.field, p);
        }
        let mut headers = self.auth_headers()?;
        headers.insert(
            "engine-version",
            HeaderValue::from_str(&upload.engine_version)
                .with_context(|| "engine version is not a valid header value")?,
        );
        headers.insert(
            "score",
            HeaderValue::from_str(&upload.score).with_context(|| "score is not a valid header value")?,
        );
        debug!("POST {url}");
        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .multipart(form)
            .send()
            .with_context(|| format!("POST {url}"))?;
        // A rejected upload loses this page only; the loop keeps polling.
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            warn!("result upload for page {page_id} rejected: HTTP {status}: {}", body.trim());
        }
        Ok(())
    }
}
