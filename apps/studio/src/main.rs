mod commands;
mod config;
mod drafts;
mod errors;
mod http;
mod models;
mod session;
mod tasks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::errors::ClientError;
use crate::http::auth::{AuthSession, AuthState};
use crate::http::notices::Notices;
use crate::http::transport::HttpTransport;
use crate::http::ApiClient;
use crate::models::draft::{DocumentKind, VersionId};
use crate::models::task::GenerateCommand;
use crate::session::GenerationSession;
use crate::tasks::poller::PollConfig;

#[derive(Parser)]
#[command(name = "studio")]
#[command(version, about = "Generate, revise and export tailored resumes and cover letters")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate documents for a background profile and a job description
    Generate {
        /// Background profile (user context) id
        #[arg(long)]
        context: i64,
        /// Job description id
        #[arg(long)]
        job: i64,
        #[arg(long, value_enum, default_value = "both")]
        kind: KindArg,
        /// Directory to export the generated PDFs into
        #[arg(long)]
        out: Option<PathBuf>,
        /// Ask the service for a fresh version instead of the existing one
        #[arg(long)]
        regenerate: bool,
    },
    /// Export a version as PDF
    Export {
        #[arg(long)]
        version: i64,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Revise a version with free-text guidance
    Revise {
        #[arg(long)]
        version: i64,
        #[arg(long)]
        instructions: String,
        /// Rename the draft before revising it
        #[arg(long)]
        label: Option<String>,
    },
    /// List the versions of a document
    History {
        #[arg(long)]
        document: i64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Resume,
    CoverLetter,
    Both,
}

impl KindArg {
    fn command(self) -> GenerateCommand {
        match self {
            KindArg::Resume => GenerateCommand::for_kind(DocumentKind::Resume),
            KindArg::CoverLetter => GenerateCommand::for_kind(DocumentKind::CoverLetter),
            KindArg::Both => GenerateCommand::GenerateBoth,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting studio v{} against {}", env!("CARGO_PKG_VERSION"), config.api_base_url);

    let transport = HttpTransport::new(config.api_base_url.clone(), config.request_timeout)?;
    let api = ApiClient::new(Arc::new(transport), AuthSession::new(), Notices::new());
    spawn_notice_printer(&api);
    spawn_auth_watcher(&api);

    if let Some(credentials) = &config.credentials {
        api.login(&credentials.email, &credentials.password).await?;
    }
    if !api.check_session().await {
        warn!("No valid session; set STUDIO_EMAIL and STUDIO_PASSWORD to sign in");
        return Err(ClientError::SessionInvalid.into());
    }

    let session = GenerationSession::new(
        api.clone(),
        PollConfig {
            interval: config.poll_interval,
            timeout: config.poll_timeout,
        },
    );

    let result = match cli.command {
        Commands::Generate {
            context,
            job,
            kind,
            out,
            regenerate,
        } => {
            commands::generate(&session, context, job, kind.command(), regenerate, out.as_deref())
                .await
        }
        Commands::Export { version, out } => {
            commands::export(&session, VersionId(version), &out).await
        }
        Commands::Revise {
            version,
            instructions,
            label,
        } => {
            commands::revise(&session, VersionId(version), &instructions, label.as_deref()).await
        }
        Commands::History { document } => commands::history(&api, document).await,
    };

    if config.credentials.is_some() {
        if let Err(e) = api.logout().await {
            warn!("Logout failed: {e}");
        }
    }
    result
}

fn spawn_notice_printer(api: &ApiClient) {
    let mut rx = api.notices().subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = rx.recv().await {
            match notice.detail {
                Some(detail) => eprintln!("! {}: {detail}", notice.message),
                None => eprintln!("! {}", notice.message),
            }
        }
    });
}

fn spawn_auth_watcher(api: &ApiClient) {
    let mut rx = api.auth().subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            if *rx.borrow_and_update() == AuthState::Invalid {
                eprintln!("! Session expired, sign in again");
            }
        }
    });
}
