use crate::{
    config::Config,
    engine::PythonProcessorFactory,
    server::HttpServer,
    util::ensure_dir,
    worker::Worker,
};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_CONFIG: &str = "config.ini";

#[derive(Parser, Debug)]
#[command(name = "pero-client")]
#[command(about = "Polls a processing server for pages, OCRs them with a cached engine bundle, uploads the results")]
pub struct Args {
    /// Path to the INI config. Defaults to ./config.ini.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// API key, overrides [SETTINGS] api_key.
    #[arg(short = 'a', long = "api-key")]
    pub api_key: Option<String>,

    /// Engine ID to request work for, overrides [SETTINGS] preferred_engine.
    #[arg(short = 'e', long = "preferred-engine")]
    pub preferred_engine: Option<String>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
    }
}

/// Loads the config file and applies the command-line overrides.
pub fn load_config(args: &Args) -> Result<Config> {
    let path = args.config_path();
    let mut cfg = Config::load(&path)?;
    cfg.apply_overrides(args.api_key.as_deref(), args.preferred_engine.as_deref());
    Ok(cfg)
}

/// Runs the worker with an already loaded config. Logging must be
/// initialized first.
pub fn dispatch(args: &Args, cfg: Config) -> Result<()> {
    info!(
        "config={} server={} engines_path={} preferred_engine={}",
        args.config_path().display(),
        cfg.server.base_url,
        cfg.settings.engines_path.display(),
        cfg.settings.preferred_engine
    );

    let server = HttpServer::new(&cfg)?;
    let factory = PythonProcessorFactory::new(&cfg.processor);
    let mut worker = Worker::start(&cfg.settings, server, factory)?;
    worker.run(std::thread::sleep)
}

/// Installs the global subscriber. The returned guard must outlive all logging
/// when a log file is configured.
pub fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if cfg.logging.file_path.is_empty() {
        (None, None)
    } else {
        let path = Path::new(&cfg.logging.file_path);
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_flags_parse() {
        let args = Args::try_parse_from(["pero-client", "-c", "x.ini", "-a", "k", "-e", "7"]).unwrap();
        assert_eq!(args.config_path(), PathBuf::from("x.ini"));
        assert_eq!(args.api_key.as_deref(), Some("k"));
        assert_eq!(args.preferred_engine.as_deref(), Some("7"));
    }

    #[test]
    fn default_config_path() {
        let args = Args::try_parse_from(["pero-client"]).unwrap();
        assert_eq!(args.config_path(), PathBuf::from("config.ini"));
    }
}
