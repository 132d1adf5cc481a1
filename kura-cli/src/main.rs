//! Kura CLI
//!
//! Command-line interface for the Kura dataset catalog. Thin glue: every
//! subcommand maps onto exactly one storage operation and prints the result
//! as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Create an organization and a dataset
//! kura org create city-lab --title "City Lab"
//! kura dataset create air-quality --title "Air Quality" \
//!     --description "Hourly PM2.5 readings" --license cc-by \
//!     --owner-org city-lab --tag environment --tag air
//!
//! # Inspect the catalog
//! kura dataset list --tag environment
//! kura dataset get air-quality
//!
//! # Run against Postgres instead of flat files
//! KURA_STORAGE_MODE=database KURA_DATABASE_URL=postgres://localhost/kura \
//!     kura dataset list
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kura_core::{
    config, Dataset, DatasetFilter, DatasetPatch, Organization, OrganizationPatch, Page,
    StorageBackend, StorageConfig, StorageError,
};

// =============================================================================
// CLI
// =============================================================================

/// Kura - dataset metadata catalog
#[derive(Parser)]
#[command(name = "kura")]
#[command(about = "Dataset metadata catalog CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Storage mode override: file | database
    #[arg(long, global = true)]
    storage: Option<String>,

    /// Data directory for flat-file storage
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Postgres connection string for database storage
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage datasets
    Dataset {
        #[command(subcommand)]
        command: DatasetCommands,
    },
    /// Manage organizations
    Org {
        #[command(subcommand)]
        command: OrgCommands,
    },
}

#[derive(Subcommand)]
enum DatasetCommands {
    /// Create a dataset
    Create {
        /// Identifier (URL-safe slug)
        id: String,
        /// Display title
        #[arg(long)]
        title: String,
        /// Free-text description
        #[arg(long)]
        description: String,
        /// License identifier, e.g. cc-by
        #[arg(long)]
        license: String,
        /// Owning organization identifier
        #[arg(long)]
        owner_org: Option<String>,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Show a dataset as JSON
    Get {
        /// Identifier
        id: String,
    },
    /// Update fields of a dataset
    Update {
        /// Identifier
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New description
        #[arg(long)]
        description: Option<String>,
        /// New license identifier
        #[arg(long)]
        license: Option<String>,
        /// New owning organization identifier
        #[arg(long, conflicts_with = "clear_owner_org")]
        owner_org: Option<String>,
        /// Remove the owning organization reference
        #[arg(long)]
        clear_owner_org: bool,
        /// Replacement tag (repeatable; replaces the whole tag list)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Delete a dataset and its resources
    Delete {
        /// Identifier
        id: String,
    },
    /// List datasets ordered by identifier
    List {
        /// Keep only datasets owned by this organization
        #[arg(long)]
        owner_org: Option<String>,
        /// Keep only datasets carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Entities to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Maximum entities to return
        #[arg(long, default_value_t = kura_core::LIST_LIMIT_DEFAULT)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum OrgCommands {
    /// Create an organization
    Create {
        /// Identifier (URL-safe slug)
        id: String,
        /// Display name
        #[arg(long)]
        title: String,
    },
    /// Show an organization as JSON
    Get {
        /// Identifier
        id: String,
    },
    /// Rename an organization
    Update {
        /// Identifier
        id: String,
        /// New display name
        #[arg(long)]
        title: String,
    },
    /// Delete an organization (its datasets are left in place)
    Delete {
        /// Identifier
        id: String,
    },
    /// List organizations ordered by identifier
    List {
        /// Entities to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Maximum entities to return
        #[arg(long, default_value_t = kura_core::LIST_LIMIT_DEFAULT)]
        limit: usize,
    },
}

// =============================================================================
// Command Handlers
// =============================================================================

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_dataset(
    backend: &Arc<dyn StorageBackend>,
    command: DatasetCommands,
) -> anyhow::Result<()> {
    match command {
        DatasetCommands::Create {
            id,
            title,
            description,
            license,
            owner_org,
            tags,
        } => {
            let mut builder = Dataset::builder(id, title)
                .with_description(description)
                .with_license_id(license)
                .with_tags(tags);
            if let Some(org) = owner_org {
                builder = builder.with_owner_org(org);
            }
            let dataset = builder.build().map_err(StorageError::from)?;
            print_json(&backend.create_dataset(&dataset).await?)
        }
        DatasetCommands::Get { id } => print_json(&backend.get_dataset(&id).await?),
        DatasetCommands::Update {
            id,
            title,
            description,
            license,
            owner_org,
            clear_owner_org,
            tags,
        } => {
            let patch = DatasetPatch {
                title,
                description,
                license_id: license,
                owner_org: if clear_owner_org {
                    Some(None)
                } else {
                    owner_org.map(Some)
                },
                tags: if tags.is_empty() { None } else { Some(tags) },
                resources: None,
            };
            print_json(&backend.update_dataset(&id, &patch).await?)
        }
        DatasetCommands::Delete { id } => {
            backend.delete_dataset(&id).await?;
            tracing::info!(dataset = %id, "deleted");
            Ok(())
        }
        DatasetCommands::List {
            owner_org,
            tag,
            offset,
            limit,
        } => {
            let filter = DatasetFilter { owner_org, tag };
            let page = Page::new(offset, limit);
            print_json(&backend.list_datasets(&filter, page).await?)
        }
    }
}

async fn run_org(backend: &Arc<dyn StorageBackend>, command: OrgCommands) -> anyhow::Result<()> {
    match command {
        OrgCommands::Create { id, title } => {
            let organization = Organization::builder(id, title)
                .build()
                .map_err(StorageError::from)?;
            print_json(&backend.create_organization(&organization).await?)
        }
        OrgCommands::Get { id } => print_json(&backend.get_organization(&id).await?),
        OrgCommands::Update { id, title } => {
            let patch = OrganizationPatch { title: Some(title) };
            print_json(&backend.update_organization(&id, &patch).await?)
        }
        OrgCommands::Delete { id } => {
            backend.delete_organization(&id).await?;
            tracing::info!(organization = %id, "deleted");
            Ok(())
        }
        OrgCommands::List { offset, limit } => {
            print_json(&backend.list_organizations(Page::new(offset, limit)).await?)
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    // Environment first, flags win.
    let mut storage_config = StorageConfig::from_env()?;
    if let Some(mode) = cli.storage {
        storage_config.mode = mode.parse()?;
    }
    if let Some(dir) = cli.data_dir {
        storage_config.data_dir = dir;
    }
    if let Some(url) = cli.database_url {
        storage_config.database_url = Some(url);
    }

    // The backend is resolved once; an unreachable target is fatal here.
    let backend = config::open(&storage_config).await?;

    match cli.command {
        Commands::Dataset { command } => run_dataset(&backend, command).await,
        Commands::Org { command } => run_org(&backend, command).await,
    }
}
