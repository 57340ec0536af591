//! stdforum - university forum server.
//!
//! Q&A with reputation and badges, private and group chat, communities,
//! notifications and campus updates, served as a JSON API over SQLite.

mod config;
mod db;
mod error;
mod handlers;
mod http;
mod metrics;
mod security;
mod services;
mod telemetry;

use crate::config::Config;
use crate::db::{Database, NewAccount, UserType};
use crate::http::AppState;
use crate::services::link_preview;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How often expired login sessions are purged.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Parser)]
#[command(name = "stdforum", version)]
#[command(about = "University forum: Q&A, reputation, chat, communities and campus updates")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "STDFORUM_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create a staff superuser account
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "STDFORUM_ADMIN_PASSWORD")]
        password: String,
    },
    /// Mark every user with an email in DOMAIN as a teacher (and verified)
    MarkTeachers {
        /// Defaults to `auth.teacher_domain`
        #[arg(long)]
        domain: Option<String>,
    },
    /// Mark every user with an email in DOMAIN as a student
    MarkStudents {
        /// Defaults to `auth.student_domain`
        #[arg(long)]
        domain: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config).map_err(|e| {
        error!(path = %cli.config.display(), error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s), refusing to start", errors.len());
    }

    let db = Database::new(&config.database.path).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db).await,
        Command::CreateAdmin {
            username,
            email,
            password,
        } => create_admin(&db, &username, &email, &password).await,
        Command::MarkTeachers { domain } => {
            let domain = domain.unwrap_or_else(|| config.auth.teacher_domain.clone());
            mark_users(&db, &domain, UserType::Teacher).await
        }
        Command::MarkStudents { domain } => {
            let domain = domain.unwrap_or_else(|| config.auth.student_domain.clone());
            mark_users(&db, &domain, UserType::Student).await
        }
    }
}

async fn serve(config: Config, db: Database) -> anyhow::Result<()> {
    info!(server = %config.server.name, "Starting stdforum");

    if config.server.metrics {
        metrics::init();
        info!("Metrics initialized");
    }

    let previewer = link_preview::from_config(&config.link_preview)?;
    if !config.link_preview.enabled {
        info!("Link previews disabled");
    }

    {
        let db = db.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
            loop {
                interval.tick().await;
                match db.sessions().purge_expired().await {
                    Ok(removed) if removed > 0 => {
                        info!(removed, "Expired sessions purged");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Failed to purge expired sessions"),
                }
            }
        });
    }

    http::serve(AppState::new(db, config, previewer)).await
}

async fn create_admin(
    db: &Database,
    username: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    security::password::check_strength(password).map_err(anyhow::Error::msg)?;

    let user = db
        .accounts()
        .create(NewAccount {
            is_staff: true,
            is_superuser: true,
            ..NewAccount::student(username, email, password)
        })
        .await?;
    info!(user_id = user.id, username = %user.username, "Admin account created");
    println!("Created admin account '{}' (id {})", user.username, user.id);
    Ok(())
}

async fn mark_users(db: &Database, domain: &str, user_type: UserType) -> anyhow::Result<()> {
    let summary = db.accounts().mark_by_domain(domain, user_type).await?;

    println!("Users with @{domain} emails: {}", summary.found);
    println!("Updated to {user_type:?}: {}", summary.updated);
    println!("Already {user_type:?}: {}", summary.already);
    for username in &summary.updated_usernames {
        println!("  - {username}");
    }
    Ok(())
}
