use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(
    name = "postgis-setup",
    version,
    about = "Enable the PostGIS extension on a PostgreSQL database and report its version"
)]
pub struct Cli {
    /// YAML config file (defaults to ./postgis-setup.yaml when present).
    #[arg(short, long, global = true, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Print the report as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log level or filter directives; RUST_LOG still wins.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Default, Args)]
pub struct ConnectionArgs {
    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[arg(long, global = true)]
    pub dbname: Option<String>,

    #[arg(long, short = 'U', global = true)]
    pub user: Option<String>,

    /// Schema the extensions are created in.
    #[arg(long, global = true)]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create the configured extensions, apply settings and report the PostGIS version.
    Enable {
        /// Print the statements instead of running them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run `SELECT postgis_version()` and report the result.
    Verify {
        /// Also report `postgis_full_version()`.
        #[arg(long)]
        full: bool,
    },
    /// Show availability and installed version of the configured extensions.
    Status,
    /// Print the SQL `enable` would run without connecting.
    PrintSql,
}

impl Cli {
    pub fn selected_command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Enable { dry_run: false })
    }

    /// Flags win over the config file and environment.
    pub fn apply_overrides(&self, config: &mut Config) {
        let connection = &self.connection;
        if let Some(ref host) = connection.host {
            config.database.host = host.clone();
        }
        if let Some(port) = connection.port {
            config.database.port = port;
        }
        if let Some(ref dbname) = connection.dbname {
            config.database.name = dbname.clone();
        }
        if let Some(ref user) = connection.user {
            config.database.user = user.clone();
        }
        if let Some(ref schema) = connection.schema {
            config.postgis.schema = Some(schema.clone());
        }
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
        if let Command::Verify { full: true } = self.selected_command() {
            config.postgis.full_version = true;
        }
    }
}
