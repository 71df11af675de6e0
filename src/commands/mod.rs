// CLI command implementations


use anyhow::Context;
use console::style;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::Result;
use crate::config::{Backend, Config, HistoryMode, get_config_dir, run_interactive_config, show_config};
use crate::database::VectorIndex;
use crate::history::SessionHistory;
use crate::pipeline::{IndexSource, Pipeline, PreparedIndex};
use crate::server::{self, AppState};

/// File used by `chat` when neither a file nor a directory is given
pub const DEFAULT_PDF: &str = "policies/CBA.pdf";

const QUESTION_PROMPT: &str = "Enter your question (or 'exit' to quit): ";

/// Options for the interactive question loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatOptions {
    pub file: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub history: Option<HistoryMode>,
    pub skip_upload: bool,
}

impl ChatOptions {
    /// Directory wins over file; the default PDF is used when neither is set
    #[inline]
    pub fn source(&self) -> IndexSource {
        match (&self.dir, &self.file) {
            (Some(dir), _) => IndexSource::Directory(dir.clone()),
            (None, Some(file)) => IndexSource::File(file.clone()),
            (None, None) => IndexSource::File(PathBuf::from(DEFAULT_PDF)),
        }
    }
}

/// Load configuration from `config_dir` (or the default directory) with
/// credentials from the environment
#[inline]
pub fn load_config(config_dir: Option<&Path>) -> Result<Config> {
    let dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => get_config_dir()?,
    };
    Ok(Config::load(&dir)?.with_env_credentials())
}

/// Message printed when `source` does not exist, or `None` when it does
#[inline]
pub fn missing_source_message(source: &IndexSource) -> Option<String> {
    match source {
        IndexSource::File(path) if !path.is_file() => {
            Some(format!("Error: File not found at {}", path.display()))
        }
        IndexSource::Directory(path) if !path.is_dir() => {
            Some(format!("Error: Directory not found at {}", path.display()))
        }
        _ => None,
    }
}

fn history_for(mode: HistoryMode, config: &Config) -> Option<SessionHistory> {
    match mode {
        HistoryMode::None => None,
        HistoryMode::Accumulated => Some(SessionHistory::with_capacity(config.history.max_turns)),
    }
}

fn print_prepared(prepared: &PreparedIndex) {
    match &prepared.upload {
        Some(report) => {
            for file in &report.files {
                eprintln!(
                    "  {} {} ({} chunks)",
                    style("✓").green(),
                    file.file.display(),
                    file.chunks
                );
            }
            eprintln!(
                "{}",
                style(format!(
                    "All embeddings uploaded to index '{}'.",
                    report.index_name
                ))
                .green()
            );
        }
        None => eprintln!(
            "{}",
            style(format!("Index '{}' ready.", prepared.index.name())).green()
        ),
    }
}

/// Build or connect to an index, then answer questions read from stdin
#[inline]
pub fn chat(config: &Config, options: &ChatOptions) -> Result<()> {
    let source = options.source();
    if let Some(message) = missing_source_message(&source) {
        println!("{}", message);
        return Ok(());
    }

    let backend = options.backend.unwrap_or(config.pipeline.backend);
    let pipeline = Pipeline::from_config(config, backend)?;
    info!("Preparing {} index from {}", backend, source.path().display());

    let prepared = pipeline.prepare_index(&source, !options.skip_upload)?;
    print_prepared(&prepared);

    let mut history = history_for(options.history.unwrap_or(config.pipeline.history), config);
    let stdin = std::io::stdin();
    run_chat_loop(
        &pipeline,
        prepared.index.as_ref(),
        history.as_mut(),
        stdin.lock(),
        std::io::stdout(),
    )
}

/// Prompt, read a question, print the answer; stops on `exit` or end of input
#[inline]
pub fn run_chat_loop<R: BufRead, W: Write>(
    pipeline: &Pipeline,
    index: &dyn VectorIndex,
    mut history: Option<&mut SessionHistory>,
    mut input: R,
    mut output: W,
) -> Result<()> {
    loop {
        write!(output, "{}", QUESTION_PROMPT)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }

        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        let answer = pipeline.ask(index, history.as_deref_mut(), question)?;
        writeln!(output, "Answer: {}", answer.text)?;
    }

    Ok(())
}

/// Create or connect to the remote index for `dir` and upload every PDF in it
#[inline]
pub fn upload(config: &Config, dir: &Path) -> Result<()> {
    let source = IndexSource::Directory(dir.to_path_buf());
    if let Some(message) = missing_source_message(&source) {
        println!("{}", message);
        return Ok(());
    }

    let pipeline = Pipeline::from_config(config, Backend::Remote)?;
    let prepared = pipeline.prepare_index(&source, true)?;
    print_prepared(&prepared);
    Ok(())
}

/// Options for the HTTP service; unset values come from configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub backend: Option<Backend>,
    pub history: Option<HistoryMode>,
}

#[inline]
pub async fn serve(config: &Config, options: ServeOptions) -> Result<()> {
    let backend = options.backend.unwrap_or(config.pipeline.backend);
    let pipeline = Pipeline::from_config(config, backend)?;
    let history = history_for(options.history.unwrap_or(config.pipeline.history), config);

    let address = format!(
        "{}:{}",
        options.host.as_deref().unwrap_or(&config.server.host),
        options.port.unwrap_or(config.server.port)
    );
    if history.is_some() {
        info!("Replaying up to {} previous exchanges per question", config.history.max_turns);
    }

    let state = Arc::new(AppState::new(pipeline, history));
    server::serve(state, &address)
        .await
        .with_context(|| format!("HTTP server on {} failed", address))?;
    Ok(())
}

/// Run the interactive configuration, or print the effective one with `show`
#[inline]
pub fn configure(config_dir: Option<&Path>, show: bool) -> Result<()> {
    if show {
        show_config(&load_config(config_dir)?);
        return Ok(());
    }

    let dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => get_config_dir()?,
    };
    if let Err(e) = run_interactive_config(&dir) {
        warn!("Configuration aborted: {:#}", e);
        return Err(e.into());
    }
    Ok(())
}
