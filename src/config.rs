use anyhow::{anyhow, Context, Result};
use ini::{Ini, ParseOption, Properties};
use std::path::{Path, PathBuf};

pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 10;
pub const DEFAULT_SCORE: &str = "100";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: Server,
    pub settings: Settings,
    pub processor: Processor,
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        Self::parse(&raw, &path.display().to_string())
    }

    /// Parses INI text; `origin` only labels error messages.
    ///
    /// Section names are case-sensitive, key names are not, and values are
    /// taken verbatim (no quote stripping or backslash escapes).
    pub fn parse(raw: &str, origin: &str) -> Result<Self> {
        let opt = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(raw, opt).with_context(|| format!("parsing INI: {origin}"))?;
        let sections = Sections { ini: &ini, origin };

        let server = Server {
            base_url: sections.required("SERVER", "base_url")?,
            get_download_engine: sections.required("SERVER", "get_download_engine")?,
            get_processing_request: sections.required("SERVER", "get_processing_request")?,
            post_upload_results: sections.required("SERVER", "post_upload_results")?,
        };

        let settings = Settings {
            api_key: sections.required("SETTINGS", "api_key")?,
            engines_path: PathBuf::from(sections.required("SETTINGS", "engines_path")?),
            preferred_engine: sections.required("SETTINGS", "preferred_engine")?,
            poll_interval_seconds: sections
                .parsed("SETTINGS", "poll_interval_seconds")?
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS),
            max_idle_polls: sections.parsed("SETTINGS", "max_idle_polls")?.unwrap_or(0),
            score: sections
                .optional("SETTINGS", "score")
                .unwrap_or_else(|| DEFAULT_SCORE.to_string()),
        };

        let defaults = Processor::default();
        let processor = Processor {
            python_exe: sections
                .optional("PROCESSOR", "python_exe")
                .unwrap_or(defaults.python_exe),
            runner_script: sections
                .optional("PROCESSOR", "runner_script")
                .map(PathBuf::from)
                .unwrap_or(defaults.runner_script),
        };

        let defaults = Logging::default();
        let logging = Logging {
            level: sections.optional("LOGGING", "level").unwrap_or(defaults.level),
            json: sections.parsed("LOGGING", "json")?.unwrap_or(defaults.json),
            file_path: sections
                .optional("LOGGING", "file_path")
                .unwrap_or(defaults.file_path),
        };

        Ok(Self {
            server,
            settings,
            processor,
            logging,
        })
    }

    /// Applies command-line overrides on top of the file values.
    pub fn apply_overrides(&mut self, api_key: Option<&str>, preferred_engine: Option<&str>) {
        if let Some(key) = api_key {
            self.settings.api_key = key.to_string();
        }
        if let Some(engine) = preferred_engine {
            self.settings.preferred_engine = engine.to_string();
        }
    }
}

struct Sections<'a> {
    ini: &'a Ini,
    origin: &'a str,
}

impl Sections<'_> {
    fn section(&self, name: &str) -> Option<&Properties> {
        self.ini.section(Some(name))
    }

    fn optional(&self, section: &str, key: &str) -> Option<String> {
        self.section(section)
            .and_then(|s| s.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)))
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, section: &str, key: &str) -> Result<String> {
        self.optional(section, key)
            .ok_or_else(|| anyhow!("missing key [{section}] {key} in {}", self.origin))
    }

    fn parsed<T>(&self, section: &str, key: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(section, key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
                anyhow!("invalid value for [{section}] {key} in {}: {raw:?} ({e})", self.origin)
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Server {
    pub base_url: String,
    pub get_download_engine: String,
    pub get_processing_request: String,
    pub post_upload_results: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub engines_path: PathBuf,
    pub preferred_engine: String,
    pub poll_interval_seconds: u64,
    /// Consecutive idle polls before the loop returns; 0 polls forever.
    pub max_idle_polls: u64,
    pub score: String,
}

#[derive(Debug, Clone)]
pub struct Processor {
    pub python_exe: String,
    pub runner_script: PathBuf,
}
impl Default for Processor {
    fn default() -> Self {
        Self {
            python_exe: "python3".into(),
            runner_script: PathBuf::from("scripts/pero_runner.py"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            file_path: "".into(),
        }
    }
}
