//! meetsync CLI
//!
//! Command-line access to a meetsync data directory.
//!
//! # Commands
//!
//! - `add-meeting`, `add-stakeholder`, `add-category` - Create records
//! - `list` - Print the records of one kind
//! - `delete` - Soft-delete a record
//! - `sync` - Run one full sync pass against the cloud directory
//! - `inspect` - Show per-kind record and tombstone counts

mod commands;
mod session;

use clap::{Parser, Subcommand, ValueEnum};
use meetsync_engine::SyncEngine;
use meetsync_model::{EntityKind, RemoteStore};
use meetsync_storage::TableStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// meetsync command-line tools.
#[derive(Parser)]
#[command(name = "meetsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Path to the cloud directory; without it the remote replica is disabled
    #[arg(global = true, short, long)]
    cloud: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Entity kind selector.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Meeting,
    Stakeholder,
    Category,
}

impl From<Kind> for EntityKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Meeting => EntityKind::Meeting,
            Kind::Stakeholder => EntityKind::Stakeholder,
            Kind::Category => EntityKind::Category,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a meeting
    AddMeeting {
        /// Meeting title
        #[arg(short, long)]
        title: String,

        /// Free-form notes
        #[arg(short, long, default_value = "")]
        notes: String,

        /// Scheduled time, milliseconds since the epoch
        #[arg(long)]
        scheduled_at: Option<i64>,

        /// Stakeholder id (repeatable)
        #[arg(long = "stakeholder")]
        stakeholders: Vec<String>,

        /// Category id (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Audio file to attach; kept locally only
        #[arg(long)]
        audio: Option<PathBuf>,
    },

    /// Create a stakeholder
    AddStakeholder {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Email address
        #[arg(short, long)]
        email: Option<String>,

        /// Role or title
        #[arg(short, long)]
        role: Option<String>,

        /// Organization
        #[arg(short, long)]
        organization: Option<String>,
    },

    /// Create a category
    AddCategory {
        /// Stable key
        #[arg(short, long)]
        key: String,

        /// Display label
        #[arg(short, long)]
        label: String,

        /// Display color
        #[arg(long)]
        color: Option<String>,
    },

    /// List the records of one kind
    List {
        /// Kind to list
        #[arg(value_enum)]
        kind: Kind,

        /// Include deleted records
        #[arg(short, long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Soft-delete a record
    Delete {
        /// Kind of the record
        #[arg(value_enum)]
        kind: Kind,

        /// Record id
        id: String,
    },

    /// Run one full sync pass
    Sync {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show per-kind record counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("meetsync CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let path = cli.path.ok_or("Local data directory required (--path)")?;
    match cli.cloud {
        Some(cloud) => dispatch(&session::open_with_cloud(&path, &cloud)?, cli.command),
        None => dispatch(&session::open_local(&path)?, cli.command),
    }
}

fn dispatch<B: TableStore, S: RemoteStore>(
    engine: &SyncEngine<B, S>,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::AddMeeting {
            title,
            notes,
            scheduled_at,
            stakeholders,
            categories,
            audio,
        } => {
            let fields = commands::add::meeting_fields(
                title,
                notes,
                scheduled_at,
                stakeholders,
                categories,
                audio.as_deref(),
            )?;
            commands::add::run::<_, _, meetsync_model::Meeting>(engine, fields)?;
        }
        Commands::AddStakeholder {
            name,
            email,
            role,
            organization,
        } => {
            let fields = meetsync_model::StakeholderFields {
                name,
                email,
                role,
                organization,
                ..Default::default()
            };
            commands::add::run::<_, _, meetsync_model::Stakeholder>(engine, fields)?;
        }
        Commands::AddCategory { key, label, color } => {
            let fields = meetsync_model::CategoryFields {
                key,
                label,
                color,
                ..Default::default()
            };
            commands::add::run::<_, _, meetsync_model::Category>(engine, fields)?;
        }
        Commands::List { kind, all, format } => {
            commands::list::run(engine, kind.into(), all, &format)?;
        }
        Commands::Delete { kind, id } => {
            commands::delete::run(engine, kind.into(), &id)?;
        }
        Commands::Sync { format } => {
            commands::sync::run(engine, &format)?;
        }
        Commands::Inspect { format } => {
            commands::inspect::run(engine, &format)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
