//! Integration tests for the console command layer.
//!
//! Feeds scripted input through `console::run` against a real engine on a
//! temp SQLite file and checks the replies.

use chrono::{Duration, Utc};
use tempfile::TempDir;

use toplog::console::{self, Command};
use toplog::{Config, EventLog, TimeBasis};

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.sqlite.path = dir.path().join("console.db");
    config.server_name = "lobby-1".to_string();
    config.types = vec!["large-transfer".to_string(), "ban".to_string()];
    config.query.time_zone = TimeBasis::Utc;
    config
}

/// Run a console session over `script` and return its output lines.
async fn run_script(log: &EventLog, config: &Config, script: &str) -> Vec<String> {
    let mut output: Vec<u8> = Vec::new();
    console::run(log, config, script.as_bytes(), &mut output)
        .await
        .expect("console I/O");
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn boundary(offset: Duration) -> String {
    (Utc::now() + offset).format("%Y-%m-%d-%H-%M-%S").to_string()
}

#[tokio::test]
async fn test_log_then_query_in_one_session() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let log = EventLog::start(&config).await.unwrap();

    let script = format!(
        "log Steve large-transfer amount=5000 to=Alex\nquery Steve large-transfer {} {}\n",
        boundary(Duration::minutes(-5)),
        boundary(Duration::minutes(5)),
    );
    let lines = run_script(&log, &config, &script).await;

    assert_eq!(lines[0], "Logged: Steve, large-transfer, amount=5000 to=Alex");
    assert_eq!(lines[1], "Query results:");
    assert_eq!(lines.len(), 3);
    assert!(lines[2].contains("Player: Steve, Type: large-transfer, Custom Data: amount=5000 to=Alex"));

    // The console stamps the configured server name
    let events = log
        .query(
            "Steve",
            "large-transfer",
            Utc::now() - Duration::minutes(5),
            Utc::now() + Duration::minutes(5),
        )
        .await
        .unwrap();
    assert_eq!(events[0].server_name, "lobby-1");

    log.shutdown().await;
}

#[tokio::test]
async fn test_query_with_no_matches() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let log = EventLog::start(&config).await.unwrap();

    let lines = run_script(
        &log,
        &config,
        "query Nobody ban 2024-01-01-00-00-00 2024-12-31-23-59-59\n",
    )
    .await;
    assert_eq!(lines, vec!["No matching log entries found."]);

    log.shutdown().await;
}

#[tokio::test]
async fn test_bad_time_format_does_not_query() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let log = EventLog::start(&config).await.unwrap();

    let lines = run_script(
        &log,
        &config,
        "query Steve ban 2024-09-18-13-13-27-00 2024-09-18-13-15-00\n",
    )
    .await;
    assert_eq!(lines, vec!["Invalid time format, use yyyy-MM-dd-HH-mm-ss."]);

    log.shutdown().await;
}

#[tokio::test]
async fn test_usage_unknown_and_types() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let log = EventLog::start(&config).await.unwrap();

    let lines = run_script(&log, &config, "log Steve\n\nteleport Steve\ntypes\n").await;
    assert_eq!(
        lines,
        vec![
            "Usage: log <player> <type> <custom-data>",
            "Unknown command 'teleport'. Type 'help' for a list of commands.",
            "Known event types: large-transfer, ban",
        ]
    );

    log.shutdown().await;
}

#[tokio::test]
async fn test_quit_stops_reading() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let log = EventLog::start(&config).await.unwrap();

    let lines = run_script(&log, &config, "help\nquit\nlog Steve ban never-logged\n").await;
    assert_eq!(lines[0], "Commands:");
    assert!(lines.iter().all(|l| !l.starts_with("Logged:")));

    log.shutdown().await;
    assert_eq!(log.stats().accepted, 0);
}

#[tokio::test]
async fn test_execute_query_after_shutdown_reports_failure() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let log = EventLog::start(&config).await.unwrap();
    log.shutdown().await;

    let lines = console::execute(
        &log,
        &config,
        Command::Query {
            player: "Steve".to_string(),
            event_type: "ban".to_string(),
            start: "2024-01-01-00-00-00".to_string(),
            end: "2024-01-02-00-00-00".to_string(),
        },
    )
    .await;
    assert_eq!(lines, vec!["Query failed: Event log is shut down"]);
}
