use caffeine_core::*;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "caftrak")]
#[command(about = "Caffeine intake tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the current caffeine level and today's intake (default)
    Status,

    /// Log a dose
    Add {
        /// Caffeine amount in milligrams
        #[arg(long, conflicts_with = "drink", required_unless_present = "drink")]
        mg: Option<f64>,

        /// Drink from the catalog (see `caftrak drinks`)
        #[arg(long)]
        drink: Option<String>,

        /// When the dose was consumed (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Remove a logged dose by id
    Remove {
        id: uuid::Uuid,
    },

    /// List doses from the last 24 hours
    List,

    /// List the drinks known to `add --drink`
    Drinks,

    /// Pull new doses from the health log
    Sync,

    /// Export the ledger as CSV
    Export {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    caffeine_core::logging::init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ Error::CorruptStore { .. }) => {
            tracing::error!("Refusing to touch a corrupted ledger");
            eprintln!("fatal: {}", e);
            eprintln!("The ledger file was left untouched. Move it aside to start over.");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        tracing::debug!("Using data directory {:?}", data_dir);
        config.data.data_dir = data_dir;
    }

    let command = cli.command.unwrap_or(Commands::Status);
    tracing::debug!("Running {:?}", command);
    if let Commands::Drinks = command {
        cmd_drinks();
        return Ok(());
    }

    let mut tracker = open_tracker(&config).await?;
    let synced = tracker.sync_from_health().await?;

    let result = match command {
        Commands::Status => {
            cmd_status(&tracker);
            Ok(())
        }
        Commands::Add { mg, drink, at } => cmd_add(&mut tracker, mg, drink, at),
        Commands::Remove { id } => cmd_remove(&mut tracker, id),
        Commands::List => {
            cmd_list(&tracker);
            Ok(())
        }
        Commands::Sync => {
            println!("✓ Synced {} new doses", synced);
            Ok(())
        }
        Commands::Export { path } => cmd_export(&tracker, &path),
        Commands::Drinks => Ok(()),
    };

    // Let background saves and reports finish before the process exits
    tracker.flush().await?;
    result
}

async fn open_tracker(config: &Config) -> Result<Tracker> {
    let store = DoseStore::new(config.data.ledger_path()).spawn()?;
    let health: Arc<dyn HealthRecordStore> = if config.health.enabled {
        Arc::new(JsonlHealthLog::new(config.data.health_log_path()))
    } else {
        Arc::new(LocalOnly)
    };

    let mut tracker = Tracker::start(store, health, TrackerSettings::from_config(config));
    tracker.ready().await?;
    Ok(tracker)
}

fn cmd_status(tracker: &Tracker) {
    let level = tracker.current_level();
    let cups = tracker.cups_today();

    println!(
        "Caffeine now: {} mg ({})",
        format_sig3(level),
        tracker.band_for_level(level)
    );
    println!(
        "Today:        {} cups ({})",
        format_sig3(cups),
        tracker.band_for_cups(cups)
    );
}

fn cmd_add(
    tracker: &mut Tracker,
    mg: Option<f64>,
    drink: Option<String>,
    at: Option<DateTime<Utc>>,
) -> Result<()> {
    let amount_mg = match (mg, drink) {
        (Some(mg), _) => mg,
        (None, Some(name)) => find_drink(&name)?.mg_per_serving,
        (None, None) => return Err(Error::Other("either --mg or --drink is required".into())),
    };

    let dose = tracker.add_dose(amount_mg, at.unwrap_or_else(Utc::now))?;
    println!("✓ Logged {} mg ({})", format_sig3(dose.amount_mg), dose.id);
    if !tracker.ledger().contains(&dose.id) {
        println!("  Note: outside the last 24 hours, so it does not count toward the level.");
    }
    cmd_status(tracker);
    Ok(())
}

fn cmd_remove(tracker: &mut Tracker, id: uuid::Uuid) -> Result<()> {
    if !tracker.remove_dose(id)? {
        return Err(Error::Other(format!("No dose with id {}", id)));
    }
    println!("✓ Removed {}", id);
    Ok(())
}

fn cmd_list(tracker: &Tracker) {
    let ledger = tracker.ledger();
    if ledger.is_empty() {
        println!("No doses in the last 24 hours.");
        return;
    }

    let model = &tracker.settings().model;
    let now = Utc::now();
    for dose in ledger.doses() {
        println!(
            "{}  {:>6} mg  {:>6} mg left  {}",
            dose.consumed_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            format_sig3(dose.amount_mg),
            format_sig3(model.remaining(dose, now)),
            dose.id
        );
    }
}

fn cmd_drinks() {
    for drink in get_default_catalog() {
        println!(
            "{:<16} {:>5} mg  {:<12} {}",
            drink.id,
            format_sig3(drink.mg_per_serving),
            drink.kind,
            drink.name
        );
    }
}

fn cmd_export(tracker: &Tracker, path: &std::path::Path) -> Result<()> {
    let count = caffeine_core::export::export_csv(tracker.ledger().doses(), path)?;
    println!("✓ Exported {} doses to {}", count, path.display());
    Ok(())
}
