use super::{types::*, PageProcessor, ProcessedPage, ProcessorFactory};
use crate::{
    config::Processor,
    layout::{OcrProcessing, PageLayout},
    raster::PageImage,
};
use anyhow::{anyhow, bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Engine bundles carry their own parser configuration under this name.
pub const ENGINE_CONFIG_FILE: &str = "config.ini";

pub struct PythonProcessorFactory {
    cfg: Processor,
}

impl PythonProcessorFactory {
    pub fn new(cfg: &Processor) -> Self {
        Self { cfg: cfg.clone() }
    }
}

impl ProcessorFactory for PythonProcessorFactory {
    fn open(&self, bundle_dir: &Path) -> Result<Box<dyn PageProcessor>> {
        Ok(Box::new(PythonPageParser::spawn(&self.cfg, bundle_dir)?))
    }
}

/// A long-lived runner process hosting the OCR library for one engine bundle.
///
/// Requests and replies are single JSON lines on the child's stdin/stdout.
pub struct PythonPageParser {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr_thread: Option<JoinHandle<()>>,
    bundle_dir: PathBuf,
}

impl PythonPageParser {
    pub fn spawn(cfg: &Processor, bundle_dir: &Path) -> Result<Self> {
        let engine_config = bundle_dir.join(ENGINE_CONFIG_FILE);
        if !engine_config.is_file() {
            bail!("engine bundle has no {ENGINE_CONFIG_FILE}: {}", bundle_dir.display());
        }
        if !cfg.runner_script.is_file() {
            bail!("missing runner script: {}", cfg.runner_script.display());
        }
        let python_exe = resolve_python_exe(&cfg.python_exe);

        debug!(
            "spawning engine runner {} {} --engine-dir {}",
            python_exe.display(),
            cfg.runner_script.display(),
            bundle_dir.display()
        );
        let mut child = Command::new(&python_exe)
            .arg(&cfg.runner_script)
            .arg("--engine-dir")
            .arg(bundle_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning python: {}", cfg.runner_script.display()))?;

        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("no stderr"))?;

        // Drain stderr continuously so a chatty library can't block the child.
        let stderr_thread = std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) if !line.trim().is_empty() => debug!("engine stderr: {}", line.trim_end()),
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });

        let mut parser = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr_thread: Some(stderr_thread),
            bundle_dir: bundle_dir.to_path_buf(),
        };

        let ready: ReadyOut = parser.read_reply()?;
        if !ready.ok {
            bail!(
                "engine runner failed to load {}: {}",
                bundle_dir.display(),
                ready.error.unwrap_or_else(|| "unknown error".into())
            );
        }
        info!(
            "engine runner ready bundle={} library_version={}",
            bundle_dir.display(),
            ready.library_version.as_deref().unwrap_or("unknown")
        );
        Ok(parser)
    }

    fn call<I: Serialize, O: DeserializeOwned>(&mut self, input: &I) -> Result<O> {
        let mut line = serde_json::to_vec(input)?;
        line.push(b'\n');
        self.stdin
            .write_all(&line)
            .and_then(|_| self.stdin.flush())
            .with_context(|| "writing request to engine runner")?;
        self.read_reply()
    }

    fn read_reply<O: DeserializeOwned>(&mut self) -> Result<O> {
        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .with_context(|| "reading engine runner reply")?;
        if n == 0 {
            let status = self
                .child
                .try_wait()
                .ok()
                .flatten()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "still running".into());
            bail!(
                "engine runner closed its output ({status}) for {}",
                self.bundle_dir.display()
            );
        }
        serde_json::from_str(&line).with_context(|| "parsing engine runner JSON reply")
    }
}

impl PageProcessor for PythonPageParser {
    fn process_page(
        &mut self,
        image: &PageImage,
        layout: PageLayout,
        processing: &OcrProcessing,
    ) -> Result<ProcessedPage> {
        let mut raw = tempfile::Builder::new()
            .prefix("page-")
            .suffix(".bgr")
            .tempfile()
            .with_context(|| "creating raw image file")?;
        raw.write_all(&image.bgr)
            .and_then(|_| raw.flush())
            .with_context(|| "writing raw image file")?;

        let page_id = layout.id.clone();
        let req = ProcessIn {
            cmd: "process",
            image: RawImage {
                path: raw.path().display().to_string(),
                width: image.width,
                height: image.height,
                channels: 3,
                order: "bgr",
            },
            layout: &layout,
            ocr_processing: processing,
        };
        let out: ProcessOut = self.call(&req)?;
        for w in &out.warnings {
            warn!("engine warning for page {page_id}: {w}");
        }
        if !out.ok {
            bail!(
                "engine failed on page {page_id}: {}",
                out.error.unwrap_or_else(|| "unknown error".into())
            );
        }
        let layout = out
            .layout
            .ok_or_else(|| anyhow!("engine returned no layout for page {page_id}"))?;
        Ok(ProcessedPage {
            layout,
            alto: out.alto,
            page_xml: out.page_xml,
        })
    }
}

impl Drop for PythonPageParser {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(t) = self.stderr_thread.take() {
            let _ = t.join();
        }
    }
}

fn resolve_python_exe(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("PERO_PYTHON") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return p;
            }
        }
        return PathBuf::from("python3");
    }
    expand_tilde(raw)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_python_is_used_verbatim() {
        assert_eq!(resolve_python_exe(" /opt/venv/bin/python "), PathBuf::from("/opt/venv/bin/python"));
    }

    #[test]
    fn spawn_rejects_bundle_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = PythonPageParser::spawn(&Processor::default(), dir.path())
            .err()
            .unwrap();
        assert!(err.to_string().contains("config.ini"));
    }
}
