use artifact_sync_core::config::BackendConfig;
use artifact_sync_core::contract::BackendKind;
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), yaml).unwrap();
    config_file
}

const FULL_CONFIG: &str = r#"
sync:
  output_dir: ./tmp/models
  destination: https://bucket.example/api/files
  workers: 4
publish:
  max_attempts: 3
  backoff_secs: 10
backends:
  primary_mirror:
    type: hub
  secondary_mirror:
    type: hub
    endpoint: https://hf-mirror.example
  origin:
    type: modelscope
    revision: v2.0.4
artifacts:
  - logical_name: vad_model
    source_backends:
      - backend: primary_mirror
        locator: org/models
        subfolder: vad_model
      - backend: secondary_mirror
        locator: org/models
        subfolder: vad_model
      - backend: origin
        locator: iic/speech_fsmn_vad
"#;

#[tokio::test]
#[serial]
async fn loads_static_config_and_injects_secrets() {
    let file = config_file(FULL_CONFIG);
    env::set_var("PUBLISH_TOKEN", "publish-secret");
    env::set_var("HF_TOKEN", "hf-secret");
    env::remove_var("MS_TOKEN");

    let loaded = artifact_sync::load_config::load_config(file.path()).expect("Config should load");
    let config = &loaded.config;

    assert_eq!(config.sync.output_dir, PathBuf::from("./tmp/models"));
    assert_eq!(config.sync.destination, "https://bucket.example/api/files");
    assert_eq!(config.sync.workers, 4);
    assert_eq!(config.publish.max_attempts, 3);
    assert_eq!(config.publish.backoff_secs, 10);

    assert_eq!(
        config.backends.secondary_mirror,
        Some(BackendConfig::Hub {
            endpoint: Some("https://hf-mirror.example".to_string()),
            revision: None,
        })
    );
    assert_eq!(
        config.backends.origin,
        Some(BackendConfig::Modelscope {
            endpoint: None,
            revision: Some("v2.0.4".to_string()),
        })
    );

    assert_eq!(config.artifacts.len(), 1);
    let sources = &config.artifacts[0].source_backends;
    let kinds: Vec<BackendKind> = sources.iter().map(|s| s.backend).collect();
    assert_eq!(
        kinds,
        vec![
            BackendKind::PrimaryMirror,
            BackendKind::SecondaryMirror,
            BackendKind::Origin
        ]
    );
    assert_eq!(sources[0].allow_pattern().as_deref(), Some("vad_model/*"));
    assert_eq!(sources[2].subfolder, None);

    assert_eq!(loaded.secrets.publish_token.expose(), "publish-secret");
    assert_eq!(
        loaded.secrets.hub_token.as_ref().map(|t| t.expose()),
        Some("hf-secret")
    );
    assert!(loaded.secrets.modelscope_token.is_none());
    assert!(!format!("{:?}", loaded.secrets).contains("publish-secret"));
}

#[tokio::test]
#[serial]
async fn optional_sections_fall_back_to_defaults() {
    let file = config_file(
        r#"
sync:
  output_dir: ./tmp/models
  destination: https://bucket.example
"#,
    );
    env::set_var("PUBLISH_TOKEN", "publish-secret");

    let loaded = artifact_sync::load_config::load_config(file.path()).expect("Config should load");
    let config = loaded.config;

    assert_eq!(config.sync.workers, 3);
    assert_eq!(config.publish.max_attempts, 5);
    assert_eq!(config.publish.backoff_secs, 30);
    assert!(config.artifacts.is_empty());
    assert!(config.sync.allowed_extensions.contains(&".safetensors".to_string()));
    assert_eq!(config.sync.allowed_extensions.len(), 7);
}

#[tokio::test]
#[serial]
async fn missing_publish_token_is_an_error() {
    let file = config_file(FULL_CONFIG);
    env::remove_var("PUBLISH_TOKEN");

    let err = artifact_sync::load_config::load_config(file.path()).unwrap_err();
    assert!(
        err.to_string().contains("PUBLISH_TOKEN"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
#[serial]
async fn unconfigured_backend_role_is_rejected() {
    let file = config_file(
        r#"
sync:
  output_dir: ./tmp/models
  destination: https://bucket.example
backends:
  origin:
    type: modelscope
artifacts:
  - logical_name: asr_model
    source_backends:
      - backend: primary_mirror
        locator: org/models
        subfolder: asr_model
"#,
    );
    env::set_var("PUBLISH_TOKEN", "publish-secret");

    let err = artifact_sync::load_config::load_config(file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("primary_mirror"), "unexpected error: {msg}");
    assert!(msg.contains("asr_model"), "unexpected error: {msg}");
}

#[tokio::test]
#[serial]
async fn artifact_without_sources_is_rejected() {
    let file = config_file(
        r#"
sync:
  output_dir: ./tmp/models
  destination: https://bucket.example
artifacts:
  - logical_name: lonely
    source_backends: []
"#,
    );
    env::set_var("PUBLISH_TOKEN", "publish-secret");

    let err = artifact_sync::load_config::load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("lonely"));
}

#[tokio::test]
#[serial]
async fn invalid_yaml_reports_parse_error() {
    let file = config_file("not-yaml: [:::");
    env::set_var("PUBLISH_TOKEN", "publish-secret");

    let err = artifact_sync::load_config::load_config(file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[tokio::test]
#[serial]
async fn unknown_backend_type_is_a_parse_error() {
    let file = config_file(
        r#"
sync:
  output_dir: ./tmp/models
  destination: https://bucket.example
backends:
  origin:
    type: ftp
"#,
    );
    env::set_var("PUBLISH_TOKEN", "publish-secret");

    let err = artifact_sync::load_config::load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("parse"));
}

#[tokio::test]
#[serial]
async fn orchestrator_builds_from_loaded_config() {
    let file = config_file(FULL_CONFIG);
    env::set_var("PUBLISH_TOKEN", "publish-secret");

    let loaded = artifact_sync::load_config::load_config(file.path()).unwrap();
    artifact_sync::clients::build_orchestrator(&loaded).expect("orchestrator should build");
}
