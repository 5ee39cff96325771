use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use collab_session::{
    CanvasStore, CollabClient, CollabEvent, Collaborators, ConfigError, Delivery, Dimensions, Point, SessionConfig,
    SessionError,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("could not open input {path}: {source}")]
    Input { path: String, source: io::Error },
    #[error("failed to read input: {0}")]
    Read(#[from] io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("{what} was not delivered ({delivery:?})")]
    NotDelivered { what: &'static str, delivery: Delivery },
}

#[derive(Parser, Debug)]
#[command(name = "collab-cli", about = "Drive a collaboration session from the terminal")]
struct Cli {
    #[arg(long, env = "COLLAB_SERVER_URL", default_value = "ws://127.0.0.1:3000/ws")]
    server_url: String,

    #[arg(long, env = "COLLAB_TOKEN", hide_env_values = true)]
    token: String,

    #[arg(long, env = "COLLAB_USER_ID")]
    user_id: String,

    #[arg(long, env = "COLLAB_USER_NAME")]
    user_name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join a canvas and print every session event as a JSON line.
    Watch(WatchArgs),
    /// Sweep the cursor across a canvas.
    Cursor(CursorArgs),
    /// Move one widget.
    Move(MoveArgs),
    /// Broadcast widgets read from a JSONL file, one object per line.
    Create(CreateArgs),
    /// Connect and print session diagnostics.
    Debug,
}

#[derive(Args, Debug)]
struct WatchArgs {
    canvas_id: String,

    #[arg(long, help = "Stop after this many seconds instead of waiting for Ctrl-C")]
    seconds: Option<u64>,
}

#[derive(Args, Debug)]
struct CursorArgs {
    canvas_id: String,

    #[arg(long, default_value_t = 0.0)]
    from_x: f64,
    #[arg(long, default_value_t = 0.0)]
    from_y: f64,
    #[arg(long, default_value_t = 500.0)]
    to_x: f64,
    #[arg(long, default_value_t = 500.0)]
    to_y: f64,

    #[arg(long, default_value_t = 100)]
    steps: u32,

    #[arg(long, default_value_t = 16)]
    interval_ms: u64,
}

#[derive(Args, Debug)]
struct MoveArgs {
    canvas_id: String,
    widget_id: String,

    #[arg(long)]
    x: f64,
    #[arg(long)]
    y: f64,
}

#[derive(Args, Debug)]
struct CreateArgs {
    canvas_id: String,

    #[arg(long, default_value = "-", help = "Input file path, or - for stdin")]
    input: String,

    #[arg(long, help = "Stop after this many created widgets")]
    max_widgets: Option<usize>,

    #[arg(long, default_value_t = 1000)]
    progress_every: usize,
}

/// Store that only reports what remote participants changed.
struct LoggingStore;

impl CanvasStore for LoggingStore {
    fn apply_create(&self, widget: Value) {
        info!(%widget, "remote widget created");
    }
    fn apply_update(&self, widget_id: &str, changes: Value) {
        info!(%widget_id, %changes, "remote widget updated");
    }
    fn apply_delete(&self, widget_id: &str) {
        info!(%widget_id, "remote widget deleted");
    }
    fn apply_move(&self, widget_id: &str, position: Point) {
        info!(%widget_id, x = position.x, y = position.y, "remote widget moved");
    }
    fn apply_resize(&self, widget_id: &str, dimensions: Dimensions) {
        info!(%widget_id, width = dimensions.width, height = dimensions.height, "remote widget resized");
    }
    fn apply_state(&self, widget_id: &str, state: Value, partial: bool) {
        info!(%widget_id, %state, partial, "remote widget state");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = session_config(&cli)?;
    let client = CollabClient::initialize(config, Collaborators::websocket(Arc::new(LoggingStore)))?;

    let result = match cli.command {
        Command::Watch(args) => run_watch(&client, args).await,
        Command::Cursor(args) => run_cursor(&client, args).await,
        Command::Move(args) => run_move(&client, args).await,
        Command::Create(args) => run_create(&client, args).await,
        Command::Debug => run_debug(&client).await,
    };
    client.disconnect().await?;
    result
}

/// CLI flags win; every other tunable comes from the `COLLAB_*` environment.
fn session_config(cli: &Cli) -> Result<SessionConfig, ConfigError> {
    SessionConfig::from_lookup(|key| match key {
        "COLLAB_SERVER_URL" => Some(cli.server_url.clone()),
        "COLLAB_TOKEN" => Some(cli.token.clone()),
        "COLLAB_USER_ID" => Some(cli.user_id.clone()),
        "COLLAB_USER_NAME" => cli.user_name.clone(),
        _ => std::env::var(key).ok(),
    })
}

async fn join(client: &CollabClient, canvas_id: &str) -> Result<(), CliError> {
    client.connect().await?;
    match client.join_canvas(canvas_id).await? {
        Delivery::Sent | Delivery::Queued => Ok(()),
        delivery => Err(CliError::NotDelivered {
            what: "join",
            delivery,
        }),
    }
}

async fn run_watch(client: &CollabClient, args: WatchArgs) -> Result<(), CliError> {
    let mut events = client.subscribe();
    join(client, &args.canvas_id).await?;
    eprintln!("watching {} (Ctrl-C to stop)", args.canvas_id);

    let deadline = args.seconds.map(Duration::from_secs);
    let stop = async {
        match deadline {
            Some(after) => tokio::time::sleep(after).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    eprintln!("ctrl-c handler unavailable: {e}");
                    std::future::pending::<()>().await;
                }
            }
        }
    };
    tokio::pin!(stop);

    loop {
        tokio::select! {
            () = &mut stop => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event)?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => eprintln!("skipped {skipped} events"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

async fn run_cursor(client: &CollabClient, args: CursorArgs) -> Result<(), CliError> {
    join(client, &args.canvas_id).await?;
    let steps = args.steps.max(1);
    let mut sent = 0_u32;
    let mut deferred = 0_u32;
    for step in 0..=steps {
        let t = f64::from(step) / f64::from(steps);
        let x = args.from_x + (args.to_x - args.from_x) * t;
        let y = args.from_y + (args.to_y - args.from_y) * t;
        match client.broadcast_cursor(x, y).await? {
            Delivery::Sent => sent += 1,
            Delivery::Deferred => deferred += 1,
            delivery => {
                return Err(CliError::NotDelivered {
                    what: "cursor",
                    delivery,
                });
            }
        }
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }
    // Let the throttle release the final position.
    tokio::time::sleep(Duration::from_millis(100)).await;
    eprintln!("cursor sweep complete: sent={sent} deferred={deferred}");
    Ok(())
}

async fn run_move(client: &CollabClient, args: MoveArgs) -> Result<(), CliError> {
    join(client, &args.canvas_id).await?;
    let delivery = client
        .broadcast_widget_move(&args.widget_id, Point::new(args.x, args.y))
        .await?;
    if delivery != Delivery::Sent {
        return Err(CliError::NotDelivered { what: "move", delivery });
    }
    eprintln!("moved {} to ({}, {})", args.widget_id, args.x, args.y);
    Ok(())
}

async fn run_create(client: &CollabClient, args: CreateArgs) -> Result<(), CliError> {
    join(client, &args.canvas_id).await?;

    let mut reader: Box<dyn BufRead> = if args.input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(&args.input).map_err(|source| CliError::Input {
            path: args.input.clone(),
            source,
        })?;
        Box::new(BufReader::new(file))
    };

    let mut created = 0_usize;
    let mut skipped = 0_usize;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let Some(widget) = parse_widget_line(&line)? else {
            skipped = skipped.saturating_add(1);
            continue;
        };
        match client.broadcast_widget_create(widget).await? {
            Delivery::Sent => created = created.saturating_add(1),
            delivery => {
                return Err(CliError::NotDelivered {
                    what: "widget create",
                    delivery,
                });
            }
        }
        if args.progress_every > 0 && created.is_multiple_of(args.progress_every) {
            eprintln!("created {created} widgets...");
        }
        if args.max_widgets.is_some_and(|limit| created >= limit) {
            break;
        }
    }

    eprintln!("create complete: canvas_id={} created={created} skipped={skipped}", args.canvas_id);
    Ok(())
}

async fn run_debug(client: &CollabClient) -> Result<(), CliError> {
    client.connect().await?;
    println!("{}", serde_json::to_string_pretty(&client.debug_info())?);
    Ok(())
}

fn print_event(event: &CollabEvent) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

/// One widget object per line. Blank lines and non-objects are skipped.
fn parse_widget_line(line: &str) -> Result<Option<Value>, CliError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str::<Value>(trimmed)?;
    Ok(value.is_object().then_some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_widget_line_skips_blank_and_non_objects() {
        assert!(parse_widget_line("   \n").expect("blank").is_none());
        assert!(parse_widget_line("[1,2]").expect("array").is_none());
        let widget = parse_widget_line(r#"{"id":"w1","kind":"sticky"}"#)
            .expect("object")
            .expect("some");
        assert_eq!(widget["kind"], "sticky");
    }

    #[test]
    fn parse_widget_line_rejects_bad_json() {
        assert!(matches!(parse_widget_line("{oops"), Err(CliError::InvalidJson(_))));
    }

    #[test]
    fn flags_override_environment() {
        let cli = Cli::parse_from([
            "collab-cli",
            "--server-url",
            "wss://collab.example.com/ws",
            "--token",
            "t",
            "--user-id",
            "u1",
            "debug",
        ]);
        let config = session_config(&cli).expect("config");
        assert_eq!(config.server_url, "wss://collab.example.com/ws");
        assert_eq!(config.user.id, "u1");
        assert_eq!(config.user.name, "u1");
    }
}
