//! Line-oriented command layer over [`EventLog`].
//!
//! Used by the binary's one-shot subcommands and by its interactive console.

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::engine::EventLog;
use crate::event::TimeBasis;
use crate::timefmt::{self, BOUNDARY_PATTERN};

const LOG_USAGE: &str = "log <player> <type> <custom-data>";
const QUERY_USAGE: &str = "query <player> <type> <start> <end>";
const QUERY_EXAMPLE: &str = "query Steve large-transfer 2024-09-18-13-13-27 2024-09-18-13-15-00";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Log {
        player: String,
        event_type: String,
        custom_data: String,
    },
    Query {
        player: String,
        event_type: String,
        start: String,
        end: String,
    },
    Types,
    Help,
    Quit,
}

/// Why a line could not be turned into a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Usage: {usage}")]
    Usage {
        usage: &'static str,
        example: Option<&'static str>,
    },

    #[error("Unknown command '{0}'. Type 'help' for a list of commands.")]
    Unknown(String),
}

impl CommandError {
    /// Lines shown to the user.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.to_string()];
        if let CommandError::Usage {
            example: Some(example),
            ..
        } = self
        {
            lines.push(format!("Example: {}", example));
        }
        lines
    }
}

impl Command {
    /// Parse one input line. Blank lines parse to `None`.
    ///
    /// Everything after the type in a `log` line is the custom data.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = tokens.split_first() else {
            return Ok(None);
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "log" => {
                if args.len() < 3 {
                    return Err(CommandError::Usage {
                        usage: LOG_USAGE,
                        example: None,
                    });
                }
                Command::Log {
                    player: args[0].to_string(),
                    event_type: args[1].to_string(),
                    custom_data: args[2..].join(" "),
                }
            }
            "query" => {
                if args.len() != 4 {
                    return Err(CommandError::Usage {
                        usage: QUERY_USAGE,
                        example: Some(QUERY_EXAMPLE),
                    });
                }
                Command::Query {
                    player: args[0].to_string(),
                    event_type: args[1].to_string(),
                    start: args[2].to_string(),
                    end: args[3].to_string(),
                }
            }
            "types" => Command::Types,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(Some(command))
    }
}

/// Execute one command and return the lines to show.
///
/// `Quit` produces no output; the caller decides what ending the session means.
pub async fn execute(log: &EventLog, config: &Config, command: Command) -> Vec<String> {
    match command {
        Command::Log {
            player,
            event_type,
            custom_data,
        } => {
            log.log_event(&player, &event_type, &custom_data, &config.server_name);
            vec![format!("Logged: {}, {}, {}", player, event_type, custom_data)]
        }
        Command::Query {
            player,
            event_type,
            start,
            end,
        } => run_query(log, &player, &event_type, &start, &end).await,
        Command::Types => type_lines(config),
        Command::Help => help_lines(),
        Command::Quit => Vec::new(),
    }
}

/// Parse a query's time boundaries in `basis`.
///
/// The error is the line to show the user. Nothing here touches the store.
pub fn parse_range(
    start: &str,
    end: &str,
    basis: TimeBasis,
) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    timefmt::parse_boundary(start, basis)
        .and_then(|s| timefmt::parse_boundary(end, basis).map(|e| (s, e)))
        .map_err(|_| format!("Invalid time format, use {}.", BOUNDARY_PATTERN))
}

async fn run_query(log: &EventLog, player: &str, event_type: &str, start: &str, end: &str) -> Vec<String> {
    match parse_range(start, end, log.time_basis()) {
        Ok((start, end)) => query_lines(log, player, event_type, start, end).await,
        Err(line) => vec![line],
    }
}

/// Run a query over an already parsed range and render the reply.
pub async fn query_lines(
    log: &EventLog,
    player: &str,
    event_type: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<String> {
    // A console session should see the events it just logged.
    if let Err(e) = log.flush().await {
        tracing::debug!(error = %e, "Flush before query skipped");
    }

    match log.query_events(player, event_type, start, end).await {
        Ok(records) if records.is_empty() => vec!["No matching log entries found.".to_string()],
        Ok(records) => {
            let mut lines = Vec::with_capacity(records.len() + 1);
            lines.push("Query results:".to_string());
            lines.extend(records);
            lines
        }
        Err(e) => {
            tracing::error!(player = %player, event_type = %event_type, error = %e, "Events query failed");
            vec![format!("Query failed: {}", e)]
        }
    }
}

/// The configured event types, as shown by `types`.
pub fn type_lines(config: &Config) -> Vec<String> {
    if config.types.is_empty() {
        vec!["No event types configured.".to_string()]
    } else {
        vec![format!("Known event types: {}", config.types.join(", "))]
    }
}

fn help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        format!("  {}", LOG_USAGE),
        format!("  {}   (times as {})", QUERY_USAGE, BOUNDARY_PATTERN),
        "  types".to_string(),
        "  help".to_string(),
        "  quit".to_string(),
    ]
}

/// Read commands from `input` until EOF or `quit`, writing replies to `output`.
pub async fn run<R, W>(log: &EventLog, config: &Config, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let replies = match Command::parse(&line) {
            Ok(None) => continue,
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => execute(log, config, command).await,
            Err(e) => e.lines(),
        };

        for reply in replies {
            output.write_all(reply.as_bytes()).await?;
            output.write_all(b"\n").await?;
        }
        output.flush().await?;
    }

    Ok(())
}
