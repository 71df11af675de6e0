// Configuration management: TOML settings on disk, credentials from the environment

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Backend, Config, ConfigError, Credentials, HistoryConfig, HistoryMode, OpenAiConfig,
    PineconeConfig, PipelineConfig, RetrievalConfig, ServerConfig, mask_secret,
};

/// Get the default configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_dir()
}
