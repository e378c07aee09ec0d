//! mccdb CLI - inspect and maintain the device inventory registry

use clap::{Parser, Subcommand};
use mccdb::config::{self, RegistryConfig};
use mccdb::ui::{self, Icons, ObjectTable};
use mccdb::{EntityKind, RegistryHub, RegistryService};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "mccdb")]
#[command(version)]
#[command(about = "Device inventory registry for ground-control stations")]
#[command(long_about = r#"
mccdb keeps the station's inventory: channels, devices, protocols, radars,
firmware images, device UIs and telemetry sessions.

Example usage:
  mccdb init --write-config
  mccdb list device
  mccdb show channel 3f2504e0-4f89-11d3-9a0c-0305e82c3301
  mccdb sessions
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or verify the database and print its schema hash
    Init {
        /// Also write the effective config to the config path
        #[arg(long)]
        write_config: bool,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// List every object of one kind
    List {
        /// channel, device, protocol, radar, firmware, device_ui or tm_session
        kind: EntityKind,
    },

    /// Show one object as JSON
    Show {
        kind: EntityKind,

        /// Object name (UUID)
        name: String,
    },

    /// Reconcile telemetry sessions with the sessions directory and list them
    Sessions,

    /// Show row counts per kind
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    if let Some(database) = cli.database {
        config.database = database;
    }

    let hub = match RegistryHub::open(&config) {
        Ok(hub) => hub,
        Err(e) if e.is_fatal() => {
            ui::error(&e.to_string());
            anyhow::bail!("refusing to use {}", config.database.display());
        }
        Err(e) => return Err(e.into()),
    };

    if let Commands::Init { write_config, force } = cli.command {
        return init(&config, hub, write_config, force, cli.config);
    }

    let (service, handle) = RegistryService::spawn(hub, config.mailbox_capacity)?;

    match cli.command {
        Commands::Init { .. } => {}

        Commands::List { kind } => {
            let all = handle.describe_all(kind).await?;
            ui::header(&format!("{} {}", all.len(), kind));
            let mut table = ObjectTable::new();
            for description in &all {
                table.add(description);
            }
            if table.is_empty() {
                ui::summary_row("none registered", "");
            } else {
                println!("{}", table.build());
            }
        }

        Commands::Show { kind, name } => {
            let description = handle.describe(kind, &name).await?;
            ui::section(&format!("{} {}", kind, ui::accent(&name)));
            println!("{}", description.to_json()?);
        }

        Commands::Sessions => {
            handle.sync_sessions().await?;
            let sessions = handle.describe_all(EntityKind::TmSession).await?;
            ui::status(Icons::FOLDER, "Sessions directory", &config.sessions_dir.display().to_string());
            let mut table = ObjectTable::new();
            for session in &sessions {
                table.add(session);
            }
            if table.is_empty() {
                ui::summary_row("no sessions recorded", "");
            } else {
                println!("{}", table.build());
            }
        }

        Commands::Stats => {
            let stats = handle.stats().await?;
            ui::status(Icons::STATS, "Rows in", &config.database.display().to_string());
            let rows: Vec<(String, usize)> = stats.into_iter().map(|(kind, n)| (kind.to_string(), n)).collect();
            println!("{}", ui::stats_table(&rows));
        }
    }

    drop(handle);
    service.join();
    Ok(())
}

fn init(
    config: &RegistryConfig,
    hub: RegistryHub,
    write_config: bool,
    force: bool,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    ui::header("Registry ready");
    ui::status(Icons::DATABASE, "Database", &config.database.display().to_string());
    ui::status(Icons::FOLDER, "Sessions", &config.sessions_dir.display().to_string());
    ui::status(Icons::KEY, "Schema hash", hub.store().schema_hash());

    for (kind, rows) in hub.stats()? {
        ui::summary_row(&format!("{:<12}", kind.to_string()), &rows.to_string());
    }

    if write_config {
        let path = config_path.unwrap_or_else(config::default_config_path);
        config::write_config(&path, config, force)?;
        ui::success(&format!("Config written to {}", path.display()));
    }
    Ok(())
}
