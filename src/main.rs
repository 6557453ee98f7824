//! toplog - typed player event log
//!
//! Records player events into SQLite or MySQL and queries them by player,
//! type and time window.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toplog::console::{self, Command};
use toplog::{Config, EventLog};

#[derive(Parser)]
#[command(name = "toplog")]
#[command(about = "Typed player event log with time-windowed queries")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "toplog.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one event using the configured server name
    Log {
        player: String,
        #[arg(value_name = "TYPE")]
        event_type: String,
        custom_data: String,
    },

    /// Query events for a player and type between two times (yyyy-MM-dd-HH-mm-ss)
    Query {
        player: String,
        #[arg(value_name = "TYPE")]
        event_type: String,
        start: String,
        end: String,

        /// Print matching events as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the configured event types
    Types,

    /// Validate configuration, connect and ensure the event table
    Check,

    /// Read commands from stdin until EOF, `quit` or Ctrl-C
    Console,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config);
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("toplog={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config?;
    tracing::debug!(config = %cli.config, "Configuration loaded");

    match cli.command {
        Commands::Types => {
            print_lines(console::type_lines(&config));
            Ok(())
        }

        Commands::Check => {
            let log = EventLog::start(&config).await?;
            log.shutdown().await;
            println!(
                "Configuration OK: {} store, table '{}'",
                config.store().backend(),
                config.storage.table
            );
            Ok(())
        }

        Commands::Log {
            player,
            event_type,
            custom_data,
        } => {
            let log = EventLog::start(&config).await?;
            let command = Command::Log {
                player,
                event_type,
                custom_data,
            };
            print_lines(console::execute(&log, &config, command).await);
            log.shutdown().await;

            let stats = log.stats();
            if stats.failed > 0 || stats.dropped > 0 {
                anyhow::bail!("event was not stored, see log output");
            }
            Ok(())
        }

        Commands::Query {
            player,
            event_type,
            start,
            end,
            json,
        } => {
            // Bad boundaries are reported before the store is opened.
            let (start, end) = match console::parse_range(&start, &end, config.query.time_zone) {
                Ok(range) => range,
                Err(line) if json => anyhow::bail!(line),
                Err(line) => {
                    println!("{}", line);
                    return Ok(());
                }
            };

            let log = EventLog::start(&config).await?;
            if json {
                let result = log.query(&player, &event_type, start, end).await;
                log.shutdown().await;
                println!("{}", serde_json::to_string_pretty(&result?)?);
                return Ok(());
            }

            print_lines(console::query_lines(&log, &player, &event_type, start, end).await);
            log.shutdown().await;
            Ok(())
        }

        Commands::Console => {
            let log = EventLog::start(&config).await?;
            tracing::info!(server = %config.server_name, "Console ready, type 'help' for commands");

            let input = tokio::io::BufReader::new(tokio::io::stdin());
            let output = tokio::io::stdout();

            tokio::select! {
                result = console::run(&log, &config, input, output) => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Console I/O failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, shutting down");
                }
            }

            log.shutdown().await;
            Ok(())
        }
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}
