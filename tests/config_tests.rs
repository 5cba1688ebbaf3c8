// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use camera_pipeline::backends::camera::{PixelFormat, SourceKind};
use camera_pipeline::errors::AppError;
use camera_pipeline::{Config, FilterType};

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.filter, FilterType::Edges, "Edge detection is the default filter");
    assert!(config.analysis.enabled, "Analysis should be enabled by default");
    assert!(config.preferred_camera.is_none());
    assert_eq!(config.synthetic.cameras.len(), 1);
    assert_eq!(config.synthetic.cameras[0].kind, SourceKind::Color);
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.filter = FilterType::Grayscale;
    config.preferred_camera = Some("synthetic://1".to_string());
    config.analysis.max_dimension = 320;
    config.synthetic.cameras[0].pixel_format = PixelFormat::NV12;

    config.save(&path).expect("save");
    let loaded = Config::load(&path).expect("load");
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_config_uses_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "filter": "blur", "analysis": { "enabled": false } }"#)
        .expect("write");

    let config = Config::load(&path).expect("load");
    assert_eq!(config.filter, FilterType::Blur);
    assert!(!config.analysis.enabled);
    assert_eq!(
        config.analysis.max_dimension,
        Config::default().analysis.max_dimension
    );
    assert_eq!(config.synthetic, Config::default().synthetic);
}

#[test]
fn test_invalid_config_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").expect("write");

    assert!(matches!(Config::load(&path), Err(AppError::Config(_))));
}

#[test]
fn test_explicit_missing_path_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.json");

    assert!(matches!(
        Config::load_or_default(Some(&missing)),
        Err(AppError::Config(_))
    ));
}
