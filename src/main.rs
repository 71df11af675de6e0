use clap::{Parser, Subcommand};
use pdf_rag::Result;
use pdf_rag::commands::{ChatOptions, ServeOptions, chat, configure, load_config, serve, upload};
use pdf_rag::config::{Backend, HistoryMode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "Ask questions about PDF documents using retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to ~/.pdf-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index PDFs and answer questions interactively
    Chat {
        /// Single PDF to index (defaults to policies/CBA.pdf)
        #[arg(long, conflicts_with = "dir")]
        file: Option<PathBuf>,
        /// Directory of PDFs to index
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Where vectors are stored
        #[arg(long, value_enum)]
        backend: Option<Backend>,
        /// Replay earlier exchanges in front of each question
        #[arg(long, value_enum)]
        history: Option<HistoryMode>,
        /// Query the existing remote index without uploading
        #[arg(long)]
        skip_upload: bool,
    },
    /// Upload every PDF in a directory to its remote index
    Upload {
        /// Directory of PDFs; `policies` uploads to pdf-policies, anything else to pdf-products
        dir: PathBuf,
    },
    /// Start the HTTP service
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, value_enum)]
        backend: Option<Backend>,
        #[arg(long, value_enum)]
        history: Option<HistoryMode>,
    },
    /// Configure models, chunking and the vector store
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = cli.config_dir;

    match cli.command {
        Commands::Chat {
            file,
            dir,
            backend,
            history,
            skip_upload,
        } => {
            let config = load_config(config_dir.as_deref())?;
            let options = ChatOptions {
                file,
                dir,
                backend,
                history,
                skip_upload,
            };
            tokio::task::spawn_blocking(move || chat(&config, &options))
                .await
                .map_err(anyhow::Error::from)??;
        }
        Commands::Upload { dir } => {
            let config = load_config(config_dir.as_deref())?;
            tokio::task::spawn_blocking(move || upload(&config, &dir))
                .await
                .map_err(anyhow::Error::from)??;
        }
        Commands::Serve {
            host,
            port,
            backend,
            history,
        } => {
            let config = load_config(config_dir.as_deref())?;
            let options = ServeOptions {
                host,
                port,
                backend,
                history,
            };
            serve(&config, options).await?;
        }
        Commands::Config { show } => {
            configure(config_dir.as_deref(), show)?;
        }
    }

    Ok(())
}
