//! ABOUTME: Command-line entry point for the stanbase server and its maintenance tasks
//! ABOUTME: `serve` is the default; `create-admin` and `seed` run once and exit

use clap::{Parser, Subcommand};
use sb_config::Config;
use sb_core::{telemetry, Result};
use sb_db::Db;
use stanbase::{admin::create_admin, seed::seed, server::serve};
use std::process;

#[derive(Parser, Debug)]
#[command(
    name = "stanbase",
    version,
    about = "Directory of Central Asian startups, investors and ecosystem news"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web and observability servers
    Serve,

    /// Create an administrator, or promote an existing account
    CreateAdmin {
        #[arg(long)]
        email: String,

        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Insert missing countries, cities, stages, categories, currencies and email templates
    Seed,
}

async fn open_db(config: &Config) -> Result<Db> {
    let db = Db::connect(&config.database.path, config.database.pool_size).await?;
    db.health_check().await?;
    Ok(db)
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::CreateAdmin { email, password } => {
            let password = match password {
                Some(p) => p,
                None => rpassword::prompt_password("Admin password: ")?,
            };
            let db = open_db(&config).await?;
            let (user, outcome) = create_admin(&db, &email, &password).await?;
            println!("{:?} admin {} ({})", outcome, user.email, user.id);
            Ok(())
        }
        Commands::Seed => {
            let db = open_db(&config).await?;
            let report = seed(&db).await?;
            println!("Seeded {} rows: {:?}", report.total(), report);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            // tracing is not up yet
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    telemetry::init_tracing(&config.environment, "stanbase");
    tracing::debug!(?config, "Configuration loaded");

    if let Err(e) = run(cli, config).await {
        tracing::error!("stanbase failed: {}", e);
        process::exit(1);
    }
}
