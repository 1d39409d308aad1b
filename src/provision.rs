//! Engine bundle provisioning: resolve the served bundle name, install the
//! archive once under `engines_path`, and open a page processor on it.

use crate::{
    config::Settings,
    engine::{python::ENGINE_CONFIG_FILE, PageProcessor, ProcessorFactory},
    server::ProcessingServer,
    util::{ensure_dir, HashingWriter},
};
use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};
use zip::ZipArchive;

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"filename="?([^";]+)"?"#).expect("filename pattern")
});
static BUNDLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^#]+)#(.+)\.(?i:zip)$").expect("bundle pattern")
});

/// `name#version.zip` as served by the engine download endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleName {
    pub file_name: String,
    pub name: String,
    pub version: String,
}

impl BundleName {
    pub fn from_content_disposition(header: &str) -> Result<Self> {
        let file_name = FILENAME_RE
            .captures(header)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .ok_or_else(|| anyhow!("content-disposition has no filename: {header:?}"))?;
        Self::parse(&file_name)
    }

    pub fn parse(file_name: &str) -> Result<Self> {
        let caps = BUNDLE_RE.captures(file_name).ok_or_else(|| {
            anyhow!("engine bundle filename is not <name>#<version>.zip: {file_name:?}")
        })?;
        let bundle = Self {
            file_name: file_name.to_string(),
            name: caps[1].to_string(),
            version: caps[2].to_string(),
        };
        let stem = bundle.stem();
        if stem.contains(['/', '\\']) || bundle.name == "." || bundle.name == ".." {
            bail!("engine bundle filename is not a plain file name: {file_name:?}");
        }
        Ok(bundle)
    }

    /// Cache directory name under `engines_path`.
    pub fn stem(&self) -> String {
        format!("{}#{}", self.name, self.version)
    }
}

pub struct LoadedEngine {
    pub id: String,
    pub name: String,
    pub version: String,
    pub bundle_dir: PathBuf,
    pub processor: Box<dyn PageProcessor>,
}

impl std::fmt::Debug for LoadedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedEngine")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("bundle_dir", &self.bundle_dir)
            .finish_non_exhaustive()
    }
}

pub fn get_engine(
    settings: &Settings,
    server: &dyn ProcessingServer,
    factory: &dyn ProcessorFactory,
    engine_id: &str,
) -> Result<LoadedEngine> {
    info!("requesting engine {engine_id}");
    let download = server
        .download_engine(engine_id)
        .with_context(|| format!("downloading engine {engine_id}"))?;
    let bundle = BundleName::from_content_disposition(&download.content_disposition)?;

    let mut body = download.body;
    let bundle_dir = install_bundle(&settings.engines_path, &bundle, &mut body)?;
    drop(body);

    // A cache dir placed by hand may still lack the parser config.
    if !bundle_dir.join(ENGINE_CONFIG_FILE).is_file() {
        bail!(
            "engine bundle {} has no {ENGINE_CONFIG_FILE}",
            bundle_dir.display()
        );
    }
    let processor = factory
        .open(&bundle_dir)
        .with_context(|| format!("opening engine {}", bundle.stem()))?;

    info!(
        "engine {engine_id} loaded name={} version={}",
        bundle.name, bundle.version
    );
    Ok(LoadedEngine {
        id: engine_id.to_string(),
        name: bundle.name,
        version: bundle.version,
        bundle_dir,
        processor,
    })
}

/// Installs the bundle unless its cache directory already exists, in which
/// case `body` is never read. Returns the cache directory.
///
/// The archive is streamed to disk and extracted in a staging directory,
/// which is renamed into place only if it holds the engine's `config.ini`.
pub fn install_bundle(engines_path: &Path, bundle: &BundleName, body: &mut dyn Read) -> Result<PathBuf> {
    let final_dir = engines_path.join(bundle.stem());
    if final_dir.exists() {
        debug!("engine cache hit {}", final_dir.display());
        return Ok(final_dir);
    }

    ensure_dir(engines_path)?;
    let staging = tempfile::Builder::new()
        .prefix(".install-")
        .tempdir_in(engines_path)
        .with_context(|| format!("creating staging dir in {}", engines_path.display()))?;

    let archive_path = staging.path().join(&bundle.file_name);
    let file = File::create(&archive_path)
        .with_context(|| format!("creating {}", archive_path.display()))?;
    let mut writer = HashingWriter::new(file);
    std::io::copy(body, &mut writer)
        .with_context(|| format!("downloading engine archive {}", bundle.file_name))?;
    let (file, size, digest) = writer
        .finish()
        .with_context(|| format!("writing {}", archive_path.display()))?;
    drop(file);
    info!(
        "engine archive {} bytes={size} sha256={digest}",
        bundle.file_name
    );

    let file = File::open(&archive_path)
        .with_context(|| format!("opening {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("reading zip archive {}", bundle.file_name))?;
    archive
        .extract(staging.path())
        .with_context(|| format!("extracting {}", bundle.file_name))?;

    // Only a bundle that can be opened is promoted into the cache; the
    // staging dir is removed on every early return.
    if !staging.path().join(ENGINE_CONFIG_FILE).is_file() {
        bail!(
            "engine archive {} has no {ENGINE_CONFIG_FILE} at its root",
            bundle.file_name
        );
    }

    std::fs::rename(staging.path(), &final_dir).with_context(|| {
        format!(
            "moving {} to {}",
            staging.path().display(),
            final_dir.display()
        )
    })?;
    info!("engine installed at {}", final_dir.display());
    Ok(final_dir)
}
