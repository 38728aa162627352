//! `odoo-mirror` — mirror Odoo models into a local SQLite database.
//!
//! Usage:
//!   odoo-mirror -c <config.toml> schema
//!   odoo-mirror -c <config.toml> load res.partner 1 2 3
//!   odoo-mirror -c <config.toml> search res.partner --domain '[["is_company","=",true]]' --limit 10
//!   odoo-mirror -c <config.toml> push res.partner 4 --fields name,email
//!   odoo-mirror -c <config.toml> login alice --password secret

mod bootstrap;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use mirror_core::MirrorConfig;

/// Odoo model mirror.
#[derive(Parser, Debug)]
#[command(name = "odoo-mirror", about = "Mirror Odoo models into a local database")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", default_value = "odoo-mirror.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Finalize every configured model and print the mirrored columns.
    Schema,

    /// Read records from Odoo and store them locally.
    Load {
        /// Remote model, e.g. res.partner.
        model: String,
        /// Remote ids.
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Search Odoo and store the matches locally.
    Search {
        model: String,
        /// Domain as JSON, e.g. '[["name","ilike","acme"]]'.
        #[arg(long, default_value = "[]")]
        domain: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
        /// Sort, e.g. "name desc".
        #[arg(long)]
        order: Option<String>,
    },

    /// Send a local row to Odoo (update when it has a remote id, create otherwise).
    Push {
        model: String,
        /// Local row id.
        id: i64,
        /// Comma separated field names (default: every mirrored field).
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,
    },

    /// Check credentials against Odoo and cache them for per-user sessions.
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from {}", cli.config.display());
    let config = MirrorConfig::load(&cli.config)?;
    std::fs::create_dir_all(&config.storage.data_dir)?;

    match cli.command {
        Commands::Schema => commands::schema::run(&config),
        Commands::Load { model, ids } => commands::sync::load(&config, &model, &ids),
        Commands::Search {
            model,
            domain,
            offset,
            limit,
            order,
        } => commands::sync::search(&config, &model, &domain, offset, limit, order),
        Commands::Push { model, id, fields } => {
            commands::sync::push(&config, &model, id, fields.as_deref())
        }
        Commands::Login { username, password } => {
            commands::login::run(&config, &username, &password)
        }
    }
}
