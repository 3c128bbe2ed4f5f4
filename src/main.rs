//! # Folio - A Rich-Document Editing Engine
//!
//! Command-line driver: loads an HTML document, runs engine commands on
//! it, optionally undoes some of them, and prints the result.
//!
//! ## Quick Start
//!
//! ```bash
//! # Insert a table and a column into a file
//! cargo run -- page.html -c 'insertTable=[2,2]' -c insertColumnEnd
//!
//! # Type some text, undo it, and print the word count
//! cargo run -- -c 'insertText="hello world"' --undo 1 --stats
//! ```

mod word_count;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use folio_core::{Config, Engine};
use folio_plugin::PluginHost;
use word_count::WordCountPlugin;

/// Folio - run editing commands over an HTML document
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTML file to load (an empty document if omitted)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Config file (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Command to run, in order; arguments are a JSON value or array
    #[arg(
        short = 'c',
        long = "command",
        value_name = "NAME[=JSON_ARGS]",
        value_parser = parse_command
    )]
    commands: Vec<CommandSpec>,

    /// Number of undo steps to apply after the commands
    #[arg(long, value_name = "N", default_value_t = 0)]
    undo: usize,

    /// Print the word count after the content
    #[arg(long)]
    stats: bool,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// A command name with its arguments.
#[derive(Debug, Clone, PartialEq)]
struct CommandSpec {
    name: String,
    args: Vec<Value>,
}

/// Parses `NAME` or `NAME=JSON`; a JSON array supplies several arguments.
fn parse_command(spec: &str) -> Result<CommandSpec, String> {
    let (name, args) = match spec.split_once('=') {
        Some((name, json)) => {
            let value: Value =
                serde_json::from_str(json).map_err(|e| format!("invalid JSON arguments: {e}"))?;
            let args = match value {
                Value::Array(items) => items,
                other => vec![other],
            };
            (name, args)
        }
        None => (spec, Vec::new()),
    };
    let name = name.trim();
    if name.is_empty() {
        return Err("command name is empty".to_string());
    }
    Ok(CommandSpec {
        name: name.to_string(),
        args,
    })
}

/// Runs the session described by `args` and returns what to print.
fn run(args: &Args) -> anyhow::Result<String> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load(),
    };
    let content = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let mut host = PluginHost::new(Engine::with_config(&content, config)?);
    host.register(Box::new(WordCountPlugin::new()), None)?;
    host.activate(WordCountPlugin::NAME)?;

    for command in &args.commands {
        let executed = host
            .execute(&command.name, &command.args)
            .with_context(|| format!("Command '{}' failed", command.name))?;
        if !executed {
            tracing::warn!(command = %command.name, "Unknown command skipped");
        }
    }

    let mut undone = 0;
    while undone < args.undo && host.engine_mut().undo() {
        undone += 1;
    }
    if undone < args.undo {
        tracing::warn!(requested = args.undo, undone, "History exhausted");
    }

    let engine = host.engine();
    let mut output = engine.state().content;
    if args.stats {
        output.push_str(&format!("\nwords: {}", engine.query_value("wordCount")));
    }
    Ok(output)
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging: RUST_LOG wins over -v
    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    tracing::info!("Starting Folio v{}", env!("CARGO_PKG_VERSION"));

    let output = run(&args)?;
    println!("{output}");

    Ok(())
}
