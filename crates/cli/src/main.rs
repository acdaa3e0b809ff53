use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    secrecy::Secret,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "encore", about = "Encore: Spotify token broker and now-playing relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Look for the config file only in this directory.
    #[arg(long, global = true, env = "ENCORE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Serve {
        /// Overrides `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
        /// Overrides `[server].port`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the path of the config file in use.
    Path,
    /// Print the effective config with secrets masked.
    Show,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn show_config() -> anyhow::Result<()> {
    let mut config = encore_config::discover_and_load();
    if config.spotify.client_secret.is_some() {
        config.spotify.client_secret = Some(Secret::new("********".into()));
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(dir) = &cli.config_dir {
        encore_config::set_config_dir(dir.clone());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "encore starting");

    match cli.command {
        Commands::Serve { bind, port } => {
            let config = encore_config::discover_and_load();
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let port = port.unwrap_or(config.server.port);
            encore_gateway::server::start_gateway(&config, &bind, port).await
        },
        Commands::Config { action } => match action {
            ConfigAction::Path => {
                println!("{}", encore_config::find_or_default_config_path().display());
                Ok(())
            },
            ConfigAction::Show => show_config(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_flags_are_optional() {
        let cli = Cli::try_parse_from(["encore", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve {
            bind: None,
            port: None
        }));
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "encore",
            "serve",
            "--port",
            "9000",
            "--json-logs",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Serve {
            port: Some(9000),
            ..
        }));
        assert!(cli.json_logs);
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn config_path_subcommand() {
        let cli = Cli::try_parse_from(["encore", "config", "path"]).unwrap();
        assert!(matches!(cli.command, Commands::Config {
            action: ConfigAction::Path
        }));
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["encore", "gateway"]).is_err());
    }
}
