use pero_processing_client::{
    cli::{load_config, Args},
    config::Config,
};
use std::path::PathBuf;

#[test]
fn parse_example_config() {
    let raw = include_str!("../config.example.ini");
    let cfg = Config::parse(raw, "config.example.ini").expect("parse INI");
    assert_eq!(cfg.server.get_download_engine, "/download_engine");
    assert_eq!(cfg.settings.engines_path, PathBuf::from("./engines"));
    assert_eq!(cfg.settings.poll_interval_seconds, 10);
    assert_eq!(cfg.settings.max_idle_polls, 0);
    assert_eq!(cfg.settings.score, "100");
    assert_eq!(cfg.processor.python_exe, "auto");
    assert!(cfg.logging.file_path.is_empty());
}

#[test]
fn optional_keys_fall_back_to_defaults() {
    let raw = "\
[SERVER]
base_url = http://x
get_download_engine = e
get_processing_request = r
post_upload_results = u
[SETTINGS]
api_key = k
engines_path = /tmp/engines
preferred_engine = 2
";
    let cfg = Config::parse(raw, "mem").unwrap();
    assert_eq!(cfg.settings.poll_interval_seconds, 10);
    assert_eq!(cfg.settings.score, "100");
    assert_eq!(cfg.processor.runner_script, PathBuf::from("scripts/pero_runner.py"));
    assert_eq!(cfg.logging.level, "info");
    assert!(!cfg.logging.json);
}

#[test]
fn missing_key_names_section_and_key() {
    let raw = "[SERVER]\nbase_url = http://x\n";
    let err = Config::parse(raw, "broken.ini").unwrap_err();
    assert_eq!(
        err.to_string(),
        "missing key [SERVER] get_download_engine in broken.ini"
    );
}

#[test]
fn bad_number_is_reported() {
    let raw = include_str!("../config.example.ini")
        .replace("poll_interval_seconds = 10", "poll_interval_seconds = soon");
    let err = Config::parse(&raw, "x.ini").unwrap_err();
    assert!(err.to_string().contains("[SETTINGS] poll_interval_seconds"));
}

#[test]
fn flags_override_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    std::fs::write(&path, include_str!("../config.example.ini")).unwrap();

    let args = Args {
        config: Some(path),
        api_key: Some("from-flag".into()),
        preferred_engine: Some("9".into()),
        log_level: None,
    };
    let cfg = load_config(&args).unwrap();
    assert_eq!(cfg.settings.api_key, "from-flag");
    assert_eq!(cfg.settings.preferred_engine, "9");
}

#[test]
fn key_names_ignore_case() {
    let raw = "\
[SERVER]
BASE_URL = http://x
Get_Download_Engine = e
get_processing_request = r
post_upload_results = u
[SETTINGS]
API_KEY = k
engines_path = /tmp/engines
Preferred_Engine = 2
Poll_Interval_Seconds = 4
";
    let cfg = Config::parse(raw, "mem").unwrap();
    assert_eq!(cfg.server.base_url, "http://x");
    assert_eq!(cfg.server.get_download_engine, "e");
    assert_eq!(cfg.settings.api_key, "k");
    assert_eq!(cfg.settings.preferred_engine, "2");
    assert_eq!(cfg.settings.poll_interval_seconds, 4);
}

#[test]
fn values_are_taken_verbatim() {
    let raw = include_str!("../config.example.ini")
        .replace("api_key = replace-me", r#"api_key = "k\ey""#)
        .replace("engines_path = ./engines", r"engines_path = C:\pero\engines");
    let cfg = Config::parse(&raw, "x.ini").unwrap();
    assert_eq!(cfg.settings.api_key, r#""k\ey""#);
    assert_eq!(cfg.settings.engines_path, PathBuf::from(r"C:\pero\engines"));
}
