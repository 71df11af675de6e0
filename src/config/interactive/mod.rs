#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Backend, Config, ConfigError, HistoryMode, mask_secret};
use crate::embeddings::chunking::ChunkingConfig;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 PDF RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Pipeline").bold().yellow());
    configure_pipeline(&mut config)?;

    eprintln!();
    eprintln!("{}", style("OpenAI").bold().yellow());
    eprintln!("API keys are read from OPENAI_API_KEY and are never written to disk.");
    configure_openai(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Chunking").bold().yellow());
    configure_chunking(&mut config.chunking)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_openai_connection(&config) {
        eprintln!("{}", style("✓ OpenAI endpoint reachable!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the OpenAI endpoint").yellow()
        );
        eprintln!("You can continue, but questions will fail until it is reachable.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Pipeline:").bold().yellow());
    eprintln!("  Backend: {}", style(config.pipeline.backend).cyan());
    eprintln!("  History: {}", style(config.pipeline.history).cyan());

    eprintln!();
    eprintln!("{}", style("OpenAI:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.openai.base_url).cyan());
    eprintln!(
        "  Embedding model: {} ({} dimensions)",
        style(&config.openai.embedding_model).cyan(),
        config.openai.embedding_dimension
    );
    eprintln!(
        "  Completion model: {}",
        style(&config.openai.completion_model).cyan()
    );
    eprintln!(
        "  API key: {}",
        describe_secret(config.credentials.openai_api_key.as_deref())
    );

    eprintln!();
    eprintln!("{}", style("Pinecone:").bold().yellow());
    eprintln!("  Control URL: {}", style(&config.pinecone.control_url).cyan());
    eprintln!(
        "  Cloud / metric: {} / {}",
        style(&config.pinecone.cloud).cyan(),
        style(&config.pinecone.metric).cyan()
    );
    eprintln!(
        "  API key: {}",
        describe_secret(config.credentials.pinecone_api_key.as_deref())
    );
    eprintln!(
        "  Environment: {}",
        config
            .credentials
            .pinecone_environment
            .as_deref()
            .map_or_else(|| style("not set").red().to_string(), |env| style(env).cyan().to_string())
    );

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!(
        "  Size / overlap: {} / {}",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );
    eprintln!("  Separator: {:?}", config.chunking.separator);

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  Top k (local / remote): {} / {}",
        style(config.retrieval.local_top_k).cyan(),
        style(config.retrieval.remote_top_k).cyan()
    );
    eprintln!("  History turns kept: {}", style(config.history.max_turns).cyan());
    eprintln!("  Server address: {}", style(config.server_address()).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn describe_secret(secret: Option<&str>) -> String {
    secret.map_or_else(
        || style("not set").red().to_string(),
        |value| style(mask_secret(value)).green().to_string(),
    )
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_pipeline(config: &mut Config) -> Result<()> {
    let backends = &["local", "remote"];
    let backend_index = Select::new()
        .with_prompt("Vector index backend")
        .default(usize::from(config.pipeline.backend == Backend::Remote))
        .items(backends)
        .interact()?;
    config.pipeline.backend = if backend_index == 1 {
        Backend::Remote
    } else {
        Backend::Local
    };

    let modes = &["none", "accumulated"];
    let history_index = Select::new()
        .with_prompt("Conversation history")
        .default(usize::from(
            config.pipeline.history == HistoryMode::Accumulated,
        ))
        .items(modes)
        .interact()?;
    config.pipeline.history = if history_index == 1 {
        HistoryMode::Accumulated
    } else {
        HistoryMode::None
    };

    Ok(())
}

fn configure_openai(config: &mut Config) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(config.openai.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = super::OpenAiConfig {
                base_url: input.clone(),
                ..super::OpenAiConfig::default()
            };
            candidate.base_url().map(|_| ())
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(config.openai.embedding_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let completion_model: String = Input::new()
        .with_prompt("Completion model")
        .default(config.openai.completion_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    config.openai.base_url = base_url;
    config.openai.embedding_model = embedding_model;
    config.openai.completion_model = completion_model;

    Ok(())
}

fn configure_chunking(chunking: &mut ChunkingConfig) -> Result<()> {
    let chunk_size: usize = Input::new()
        .with_prompt("Maximum chunk size (characters)")
        .default(chunking.chunk_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Chunk size must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let chunk_overlap: usize = Input::new()
        .with_prompt("Chunk overlap (characters)")
        .default(chunking.chunk_overlap.min(chunk_size.saturating_sub(1)))
        .validate_with(|input: &usize| -> Result<(), String> {
            if *input >= chunk_size {
                Err(format!("Overlap must be smaller than {}", chunk_size))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    chunking.chunk_size = chunk_size;
    chunking.chunk_overlap = chunk_overlap;
    chunking.validate()?;

    Ok(())
}

fn test_openai_connection(config: &Config) -> bool {
    let Ok(url) = config
        .openai
        .base_url()
        .and_then(|base| base.join("models").map_err(|e| ConfigError::InvalidUrl(e.to_string())))
    else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    let mut request = agent.get(url.as_str());
    if let Some(key) = config.credentials.openai_api_key.as_deref() {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    match request.call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
