use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use folio::cli::{run_catalog, run_delete_workspace, run_tree};
use folio::config::StoreConfig;
use folio::store::{SqliteStore, Store};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Workspace, document and billing data store", long_about = None)]
struct Cli {
    /// Config file (defaults to ./folio.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the database, overrides the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply the schema
    Init,

    /// Print a workspace with its folders and files
    Tree {
        /// Workspace id
        workspace: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a workspace and everything under it
    DeleteWorkspace {
        /// Workspace id
        workspace: String,

        /// Delete without stopping at the summary
        #[arg(long, short)]
        yes: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List products and their prices
    Catalog {
        /// Include inactive products and prices
        #[arg(long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn run_init(config: &StoreConfig) -> anyhow::Result<()> {
    fs::create_dir_all(&config.data_dir)?;

    let db_path = config.db_path();
    let existed = db_path.exists();

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    if existed {
        println!("Schema checked at {}", db_path.display());
    } else {
        info!("Created database at {}", db_path.display());
        println!("Initialized database at {}", db_path.display());
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("folio=info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = StoreConfig::discover(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    match cli.command {
        Commands::Init => run_init(&config)?,
        Commands::Tree { workspace, json } => run_tree(&config, &workspace, json)?,
        Commands::DeleteWorkspace {
            workspace,
            yes,
            json,
        } => run_delete_workspace(&config, &workspace, yes, json)?,
        Commands::Catalog { all, json } => run_catalog(&config, all, json)?,
    }

    Ok(())
}
