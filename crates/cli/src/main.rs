//! `sdq`: operator CLI for the simdock queue.
//!
//! Subcommands map 1-to-1 to dispatcher commands; with no subcommand an
//! interactive prompt starts. Command lines are appended to
//! `~/.sdq/history`.

mod client;
mod commands;
mod history;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use client::CliClient;

#[derive(Parser, Debug)]
#[command(name = "sdq", version)]
#[command(about = "Operator CLI for the simdock simulation queue")]
struct Cli {
    /// Dispatcher base URL.
    #[arg(short = 'd', long, default_value = "http://localhost:8250")]
    dispatcher: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a new simulation config.
    Add {
        /// Path to the config file (.json5).
        file: PathBuf,
        /// Human-readable simulation name (defaults to the filename).
        #[arg(long)]
        name: Option<String>,
        /// Priority; smaller is more urgent.
        #[arg(long, default_value_t = simdock_core::protocol::DEFAULT_PRIORITY)]
        priority: i32,
        /// Free-form description.
        #[arg(long, default_value = "")]
        description: String,
        /// Optional callback URL recorded on the item.
        #[arg(long, default_value = "")]
        url: String,
    },
    /// List the active queue (queued, booked, executing).
    List,
    /// List completed simulations.
    Done,
    /// List a machine's incomplete items.
    Machine { machine_id: String },
    /// Show a single item.
    Sid { sid: i64 },
    /// Patch priority / description / URL of an item.
    Update {
        sid: i64,
        #[arg(long)]
        priority: Option<i32>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Delete an item and its staged config.
    Delete { sid: i64 },
    /// Re-queue a finished simulation from its archived results.
    Redo { sid: i64 },
    /// Query a worker agent's status.
    Status {
        /// Agent base URL.
        #[arg(default_value = "http://localhost:8251")]
        agent: String,
    },
    /// Ask the dispatcher to shut down gracefully.
    Shutdown,
}

fn username() -> String {
    std::env::var("USER").unwrap_or_else(|_| "operator".to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = CliClient::new(&cli.dispatcher, username());

    let result = match cli.command {
        Some(command) => run_command(&client, command).await,
        None => interactive(&client).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_command(client: &CliClient, command: Command) -> Result<(), client::CliError> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    history::append(&argv.join(" "));
    match command {
        Command::Add {
            file,
            name,
            priority,
            description,
            url,
        } => commands::add(client, &file, name, priority, description, url).await,
        Command::List => commands::list_active(client).await,
        Command::Done => commands::list_done(client).await,
        Command::Machine { machine_id } => commands::machine_queue(client, &machine_id).await,
        Command::Sid { sid } => commands::show_sid(client, sid).await,
        Command::Update {
            sid,
            priority,
            description,
            url,
        } => commands::update(client, sid, priority, description, url).await,
        Command::Delete { sid } => commands::delete(client, sid).await,
        Command::Redo { sid } => commands::redo(client, sid).await,
        Command::Status { agent } => commands::agent_status(client, &agent).await,
        Command::Shutdown => commands::shutdown(client).await,
    }
}

const HELP: &str = "\
Commands:
  add <file> [priority]   submit a config
  list                    show the active queue
  done                    show completed simulations
  machine <id>            show a machine's incomplete items
  sid <n>                 show one item
  update <n> priority <p> change an item's priority
  update <n> desc <text>  change an item's description
  delete <n>              delete an item
  redo <n>                re-queue a finished simulation
  status [url]            query a worker agent
  shutdown                stop the dispatcher
  help                    this text
  quit                    leave";

async fn interactive(client: &CliClient) -> Result<(), client::CliError> {
    println!(
        "sdq {} (type 'help' for a list of commands)",
        env!("CARGO_PKG_VERSION")
    );

    let stdin = std::io::stdin();
    loop {
        use std::io::Write;
        print!("sdq> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if std::io::BufRead::read_line(&mut stdin.lock(), &mut line).unwrap_or(0) == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        history::append(line);

        let args: Vec<&str> = line.split_whitespace().collect();
        let result = match args[0] {
            "help" => {
                println!("{HELP}");
                Ok(())
            }
            "quit" | "exit" => return Ok(()),
            "add" if args.len() >= 2 => {
                let priority = args
                    .get(2)
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(simdock_core::protocol::DEFAULT_PRIORITY);
                commands::add(
                    client,
                    std::path::Path::new(args[1]),
                    None,
                    priority,
                    String::new(),
                    String::new(),
                )
                .await
            }
            "list" => commands::list_active(client).await,
            "done" => commands::list_done(client).await,
            "machine" if args.len() >= 2 => commands::machine_queue(client, args[1]).await,
            "sid" if args.len() >= 2 => match args[1].parse() {
                Ok(sid) => commands::show_sid(client, sid).await,
                Err(_) => {
                    println!("sid requires a numeric simulation ID");
                    Ok(())
                }
            },
            "update" if args.len() >= 4 => match (args[1].parse(), args[2]) {
                (Ok(sid), "priority") => {
                    commands::update(client, sid, args[3].parse().ok(), None, None).await
                }
                (Ok(sid), "desc") => {
                    commands::update(client, sid, None, Some(args[3..].join(" ")), None).await
                }
                _ => {
                    println!("usage: update <sid> priority <p> | update <sid> desc <text>");
                    Ok(())
                }
            },
            "delete" if args.len() >= 2 => match args[1].parse() {
                Ok(sid) => commands::delete(client, sid).await,
                Err(_) => {
                    println!("delete requires a numeric simulation ID");
                    Ok(())
                }
            },
            "redo" if args.len() >= 2 => match args[1].parse() {
                Ok(sid) => commands::redo(client, sid).await,
                Err(_) => {
                    println!("redo requires a numeric simulation ID");
                    Ok(())
                }
            },
            "status" => {
                let agent = args.get(1).copied().unwrap_or("http://localhost:8251");
                commands::agent_status(client, agent).await
            }
            "shutdown" => commands::shutdown(client).await,
            other => {
                println!("unknown command: {other} (try 'help')");
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("Error: {e}");
        }
    }
}
