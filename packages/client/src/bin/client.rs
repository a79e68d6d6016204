//! Interactive Pipedeck dashboard client.
//!
//! Signs in (or restores a saved session), subscribes to live rooms and prints
//! build/pipeline/notification events as they arrive. Reads commands from stdin.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin pipedeck-client -- --email dev@example.com --password secret --org acme
//! API_BASE_URL=https://ci.example.com SOCKET_URL=wss://ci.example.com/ws \
//!     cargo run --bin pipedeck-client -- --org acme --room pipeline:p-1
//! ```

use std::io::Write;
use std::str::FromStr;

use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use pipedeck_client::{
    ClientContext, ClientError,
    config::ClientConfig,
    domain::{RoomId, TaskDraft},
    formatter::EventFormatter,
    live::EventHandlers,
};
use pipedeck_shared::{logger::setup_logger, time::get_utc_timestamp};

const PROMPT: &str = "pipedeck> ";

#[derive(Parser, Debug)]
#[command(name = "pipedeck-client")]
#[command(about = "Pipedeck dashboard client with live build updates", long_about = None)]
struct Args {
    #[command(flatten)]
    config: ClientConfig,

    /// Account email; required unless a saved session can be restored
    #[arg(short = 'e', long, env = "PIPEDECK_EMAIL")]
    email: Option<String>,

    /// Account password
    #[arg(short = 'p', long, env = "PIPEDECK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Organization whose dashboard is shown
    #[arg(short = 'o', long)]
    org: String,

    /// Rooms to subscribe to on start (`pipeline:<id>`, `build:<id>`, `organization:<id>`)
    #[arg(short = 'r', long = "room")]
    rooms: Vec<RoomId>,
}

/// One line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Tasks,
    AddTask(String),
    Pipelines,
    Builds(Option<String>),
    Trigger(String),
    Subscribe(RoomId),
    Unsubscribe(RoomId),
    Status,
    Reconnect,
    Logout,
    Quit,
    Help,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.trim().splitn(2, ' ');
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        let room = |arg: Option<&str>| -> Result<RoomId, String> {
            arg.ok_or_else(|| format!("usage: {} <kind:id>", name))?
                .parse::<RoomId>()
                .map_err(|e| e.to_string())
        };

        match name {
            "tasks" => Ok(Command::Tasks),
            "add" => arg
                .map(|title| Command::AddTask(title.to_string()))
                .ok_or_else(|| "usage: add <title>".to_string()),
            "pipelines" => Ok(Command::Pipelines),
            "builds" => Ok(Command::Builds(arg.map(str::to_string))),
            "trigger" => arg
                .map(|id| Command::Trigger(id.to_string()))
                .ok_or_else(|| "usage: trigger <pipeline-id>".to_string()),
            "sub" | "subscribe" => room(arg).map(Command::Subscribe),
            "unsub" | "unsubscribe" => room(arg).map(Command::Unsubscribe),
            "status" => Ok(Command::Status),
            "reconnect" => Ok(Command::Reconnect),
            "logout" => Ok(Command::Logout),
            "quit" | "exit" => Ok(Command::Quit),
            "help" => Ok(Command::Help),
            other => Err(format!("unknown command '{}', type 'help'", other)),
        }
    }
}

const HELP: &str = "\
tasks | add <title> | pipelines | builds [pipeline-id] | trigger <pipeline-id>
sub <kind:id> | unsub <kind:id> | status | reconnect | logout | quit
";

/// Redisplay the prompt after printing an event
fn redisplay_prompt() {
    print!("{}", PROMPT);
    std::io::stdout().flush().ok();
}

fn print_event(text: String) {
    print!("{}", text);
    redisplay_prompt();
}

fn handlers() -> EventHandlers {
    EventHandlers::new()
        .on_build_update(|update| {
            print_event(EventFormatter::format_build_update(update, get_utc_timestamp()))
        })
        .on_pipeline_update(|update| {
            print_event(EventFormatter::format_pipeline_update(update, get_utc_timestamp()))
        })
        .on_notification(|notification| {
            print_event(EventFormatter::format_notification(notification, get_utc_timestamp()))
        })
        .on_system_event(|event| print_event(EventFormatter::format_system_event(event)))
}

async fn sign_in(ctx: &ClientContext, args: &Args) -> Result<(), ClientError> {
    if ctx.auth().restore()? {
        tracing::info!("Restored saved session");
        return Ok(());
    }
    match (&args.email, &args.password) {
        (Some(email), Some(password)) => {
            let user = ctx.auth().login(email, password).await?;
            println!("Signed in as {}", user.name.as_deref().unwrap_or(&user.email));
            Ok(())
        }
        _ => Err(ClientError::AuthInvalid(
            "no saved session; pass --email and --password".to_string(),
        )),
    }
}

/// Run one command; returns `false` when the session should end
async fn execute(ctx: &ClientContext, org: &str, command: Command) -> Result<bool, ClientError> {
    let dashboard = ctx.dashboard(org);
    match command {
        Command::Tasks => {
            print!("{}", EventFormatter::format_tasks(&dashboard.list_tasks().await?))
        }
        Command::AddTask(title) => {
            let task = dashboard
                .create_task(&TaskDraft {
                    title,
                    pipeline_id: None,
                })
                .await?;
            println!("created task {}", task.id);
        }
        Command::Pipelines => {
            print!("{}", EventFormatter::format_pipelines(&dashboard.list_pipelines().await?))
        }
        Command::Builds(pipeline) => {
            let builds = dashboard.list_builds(pipeline.as_deref()).await?;
            print!("{}", EventFormatter::format_builds(&builds));
        }
        Command::Trigger(pipeline_id) => {
            let build = dashboard.trigger_pipeline(&pipeline_id).await?;
            println!("triggered build #{} ({})", build.number, build.id);
            ctx.live().subscribe(RoomId::build(build.id));
        }
        Command::Subscribe(room) => ctx.live().subscribe(room),
        Command::Unsubscribe(room) => ctx.live().unsubscribe(&room),
        Command::Status => {
            print!(
                "{}",
                EventFormatter::format_status(ctx.live().status(), &ctx.live().subscriptions())
            );
        }
        Command::Reconnect => ctx.live().connect(ctx.session().get_token().as_deref())?,
        Command::Logout => {
            ctx.auth().logout().await;
            return Ok(false);
        }
        Command::Quit => return Ok(false),
        Command::Help => print!("{}", HELP),
    }
    print!("{}", EventFormatter::format_connectivity(&ctx.connectivity()));
    Ok(true)
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = ClientContext::from_config(args.config.clone(), handlers())?;
    sign_in(&ctx, &args).await?;

    for room in &args.rooms {
        ctx.live().subscribe(room.clone());
    }

    // Create channel for rustyline input
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();

    // Spawn a blocking thread for rustyline (synchronous readline)
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    while let Some(line) = input_rx.recv().await {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };
        match execute(&ctx, &args.org, command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) if e.requires_reauthentication() => {
                tracing::error!("Session ended: {}", e);
                break;
            }
            Err(e) => println!("error: {}", e),
        }
    }

    ctx.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
