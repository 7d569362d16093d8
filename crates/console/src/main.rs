//! evalport-console - interactive console for a running evalport host
//!
//! Connects to a host's REPL server and evaluates each entered line as Lua
//! inside the host process.
//!
//! Usage:
//!   evalport-console                  # connect to 127.0.0.1:8172
//!   evalport-console --port 9000      # custom port
//!
//! Commands:
//!   :quit, :q               # Exit
//!   :help                   # Show help

use clap::Parser as ClapParser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::time::Duration;

mod client;

use client::Session;

#[derive(ClapParser)]
#[command(name = "evalport-console")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Interactive console for evalport hosts", long_about = None)]
struct Args {
    /// Host to connect to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port the host's REPL server listens on
    #[arg(long, default_value_t = evalport::DEFAULT_PORT)]
    port: u16,

    /// Seconds to wait for each response
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

/// What to do with one line of input
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    Help,
    Skip,
    Evaluate(&'a str),
}

fn classify(line: &str) -> Command<'_> {
    match line.trim() {
        "" => Command::Skip,
        ":quit" | ":q" => Command::Quit,
        ":help" | ":h" => Command::Help,
        expression => Command::Evaluate(expression),
    }
}

fn main() {
    let args = Args::parse();
    let timeout = Duration::from_secs(args.timeout.max(1));

    let addr = (args.host.as_str(), args.port);
    let (mut session, greeting) = match Session::connect(addr, timeout) {
        Ok(connected) => connected,
        Err(e) => {
            eprintln!("Error: {} ({}:{})", e, args.host, args.port);
            std::process::exit(1);
        }
    };
    println!("{}", greeting);

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Error initializing readline: {}", e);
            std::process::exit(1);
        }
    };

    // Load history if available
    let history_file = history_file();
    if let Some(ref path) = history_file {
        let _ = rl.load_history(path);
    }

    loop {
        match rl.readline("lua> ") {
            Ok(line) => match classify(&line) {
                Command::Skip => {}
                Command::Quit => break,
                Command::Help => print_help(),
                Command::Evaluate(expression) => {
                    let _ = rl.add_history_entry(expression);
                    match session.evaluate(expression) {
                        Ok(reply) if reply.success => println!("{}", reply.text),
                        Ok(reply) => println!("! {}", reply.text),
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            break;
                        }
                    }
                }
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    // Save history
    if let Some(ref path) = history_file {
        let _ = rl.save_history(path);
    }
}

fn print_help() {
    println!("Enter a Lua expression or statements; they run inside the host.");
    println!("  1 + 1            expressions print their value");
    println!("  x = 5            statements print nil");
    println!("  :quit, :q        exit");
}

/// Get history file path
fn history_file() -> Option<PathBuf> {
    home::home_dir().map(|d| d.join(".evalport_history"))
}
