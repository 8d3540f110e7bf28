use std::io::Write;
use std::time::Duration;

use chrono_tz::Tz;
use tempfile::NamedTempFile;
use timelapse_viewer::config::{Configuration, DEFAULT_BASE_URL};
use timelapse_viewer::tasks::viewer::ViewerOptions;
use timelapse_viewer::{PlaybackRate, ViewMode};

#[test]
fn empty_document_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    assert_eq!(cfg.request_timeout, Duration::from_secs(10));
    assert_eq!(cfg.live_poll_interval, Duration::from_secs(5));
    assert_eq!(cfg.playback_rate, PlaybackRate::DEFAULT);
    assert_eq!(cfg.start_mode, ViewMode::Gallery);
    assert_eq!(cfg.timezone, Tz::UTC);
}

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
base-url: "http://camera.lan:8080/"
request-timeout: 3s
live-poll-interval: 2500ms
playback-rate: 4.5
start-mode: live
timezone: "Europe/Paris"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.base_url, "http://camera.lan:8080");
    assert_eq!(cfg.request_timeout, Duration::from_secs(3));
    assert_eq!(cfg.live_poll_interval, Duration::from_millis(2500));
    assert_eq!(cfg.playback_rate.fps(), 4.5);
    assert_eq!(cfg.start_mode, ViewMode::Live);
    assert_eq!(cfg.timezone, Tz::Europe__Paris);

    let options = ViewerOptions::from(&cfg);
    assert_eq!(options.start_mode, ViewMode::Live);
    assert_eq!(options.live_poll_interval, Duration::from_millis(2500));
}

#[test]
fn unknown_keys_are_rejected() {
    let yaml = r#"
base-url: "http://camera.lan"
poll-every: 5s
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn off_step_playback_rate_is_rejected() {
    assert!(serde_yaml::from_str::<Configuration>("playback-rate: 1.2").is_err());
    assert!(serde_yaml::from_str::<Configuration>("playback-rate: 0").is_err());
}

#[test]
fn validation_rejects_bad_base_url_and_zero_durations() {
    for yaml in [
        "base-url: \"camera.lan\"",
        "base-url: \"ftp://camera.lan\"",
        "request-timeout: 0s",
        "live-poll-interval: 0s",
    ] {
        let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validated().is_err(), "expected {yaml:?} to fail validation");
    }
}

#[test]
fn loads_from_yaml_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "base-url: \"https://frames.example.com\"").unwrap();
    writeln!(file, "playback-rate: 10").unwrap();

    let cfg = Configuration::from_yaml_file(file.path())
        .unwrap()
        .validated()
        .unwrap();
    assert_eq!(cfg.base_url, "https://frames.example.com");
    assert_eq!(cfg.playback_rate, PlaybackRate::MAX);
}

#[test]
fn missing_file_is_an_error() {
    assert!(Configuration::from_yaml_file("/definitely/not/here.yaml").is_err());
}
