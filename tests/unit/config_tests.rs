// Configuration tests: loading YAML files and feeding them to the pipeline

use std::io::Write;

use http::Request;
use pixelgate::config::{Config, LogFormat};
use pixelgate::options::ResizeType;
use pixelgate::pipeline::resolve;
use pixelgate::security::sign_path;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_full_config_file() {
    let file = write_config(
        r#"
base_url: "http://images.dev/"
signing:
  keys: ["746573742d6b6579"]
  salts: ["746573742d73616c74"]
  signature_size: 16
presets:
  ignore_unknown: true
  definitions:
    default: "q:75"
    thumb: "rt:fill/s:150:150"
negotiation:
  enable_webp_detection: true
  enable_client_hints: true
logging:
  level: debug
  format: json
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.base_url, "http://images.dev");
    assert_eq!(config.signing.keys[0].as_bytes(), b"test-key");
    assert_eq!(config.signing.salts[0].as_bytes(), b"test-salt");
    assert!(config.signing.is_enforced());
    assert!(config.presets.ignore_unknown);
    assert!(config.presets.has_default());
    assert!(config.negotiation.enable_client_hints);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_loaded_config_drives_resolution() {
    let file = write_config(
        r#"
base_url: "http://images.dev"
signing:
  keys: ["746573742d6b6579"]
  salts: ["746573742d73616c74"]
presets:
  definitions:
    default: "q:75"
    thumb: "rt:fill/s:150:150"
"#,
    );
    let config = Config::from_file(file.path()).unwrap();

    let signed = sign_path("/pr:thumb/lorem/ipsum.jpg", &config.signing).unwrap();
    let request = Request::builder().uri(signed).body(()).unwrap();
    let resolved = resolve(&request, &config).unwrap();

    assert_eq!(resolved.image_url, "http://images.dev/lorem/ipsum.jpg");
    assert_eq!(resolved.options.resize, ResizeType::Fill);
    assert_eq!((resolved.options.width, resolved.options.height), (150, 150));
    assert_eq!(resolved.options.quality, 75);
    assert_eq!(resolved.options.used_presets, vec!["default", "thumb"]);
}

#[test]
fn test_unpaired_salts_fail_validation() {
    let file = write_config(
        r#"
signing:
  keys: ["00", "01"]
  salts: ["02"]
"#,
    );
    let config = Config::from_file(file.path()).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_unknown_log_format_rejected() {
    let file = write_config("logging:\n  format: xml\n");
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn test_config_round_trips_through_yaml() {
    let file = write_config(
        r#"
signing:
  keys: ["0a0b"]
  salts: ["0c0d"]
presets:
  definitions:
    thumb: "rt:fill/w:150"
"#,
    );
    let config = Config::from_file(file.path()).unwrap();

    let yaml = serde_yaml::to_string(&config).unwrap();
    assert!(yaml.contains("0a0b"));
    assert!(yaml.contains("rt:fill/w:150"));

    let reloaded = Config::from_yaml_with_env(&yaml).unwrap();
    assert_eq!(reloaded.signing.keys, config.signing.keys);
    assert_eq!(reloaded.presets.definitions, config.presets.definitions);
}
