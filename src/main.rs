#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

mod cli;
mod config;
mod db;
mod report;
mod setup;
mod utils;

use cli::{Cli, Command};
use config::Config;
use db::DatabaseManager;
use setup::{Provisioner, SetupOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);
    utils::logging::init_tracing(&config.logging);
    config.validate().context("invalid configuration")?;

    let command = cli.selected_command();
    let options = SetupOptions::from_config(&config);

    let output = match command {
        Command::PrintSql | Command::Enable { dry_run: true } => {
            let plan = options.plan();
            if cli.json {
                serde_json::to_string_pretty(&plan)?
            } else {
                plan.join("\n")
            }
        }
        Command::Enable { dry_run: false } => {
            info!(database = ?options.database, "enabling postgis");
            let provisioner = connect(&config, options).await?;
            let report = provisioner.enable().await?;
            report::render(&report, cli.json)?
        }
        Command::Verify { .. } => {
            let provisioner = connect(&config, options).await?;
            let version = provisioner.verify().await?;
            report::render(&version, cli.json)?
        }
        Command::Status => {
            let provisioner = connect(&config, options).await?;
            let status = provisioner.status().await?;
            report::render(&status, cli.json)?
        }
    };

    println!("{output}");
    Ok(())
}

async fn connect(config: &Config, options: SetupOptions) -> Result<Provisioner> {
    let db_manager = DatabaseManager::new(&config.database)
        .await
        .context("could not connect to the database")?;
    Ok(Provisioner::new(db_manager.store(), options))
}
