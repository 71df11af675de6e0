use super::describe_secret;
use super::load_existing_config as load_existing_config_impl;
use tempfile::TempDir;

#[test]
fn load_existing_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = load_existing_config_impl(temp_dir.path());

    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert!(!config.openai.embedding_model.is_empty());
    assert!(config.chunking.chunk_overlap < config.chunking.chunk_size);
}

#[test]
fn load_existing_config_ignores_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(temp_dir.path().join("config.toml"), "[chunking\n")
        .expect("should write config");

    let config = load_existing_config_impl(temp_dir.path());
    assert_eq!(config.chunking.chunk_size, 1000);
}

#[test]
fn secrets_are_masked_when_described() {
    let described = describe_secret(Some("sk-1234567890"));
    assert!(described.contains("7890"));
    assert!(!described.contains("sk-123456"));
    assert!(describe_secret(None).contains("not set"));
}
