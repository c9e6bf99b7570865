use anyhow::{Context, Result};
use clap::Parser;
use engine::{restore_snapshot, Db, EngineError};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "silt")]
#[command(about = "SiltKV - embedded LSM key-value store shell", long_about = None)]
struct Cli {
    /// Path of the write-ahead log; SSTable and snapshot files are kept in
    /// the same directory.
    #[arg(default_value = "wal.log")]
    wal: PathBuf,
}

fn print_help() {
    println!("SiltKV Interactive Shell");
    println!();
    println!("Commands:");
    println!("  put <key> <value>         Insert or overwrite a key");
    println!("  get <key>                 Read a key (memtable, then SSTables)");
    println!("  get-all                   List the memtable contents");
    println!("  delete <key>              Delete a key");
    println!("  create-snapshot [path]    Capture and save a snapshot (default snapshot.dat)");
    println!("  restore-snapshot <path>   Load a snapshot file and print its contents");
    println!("  help                      Show this help message");
    println!("  exit                      Exit the shell");
    println!();
}

enum CommandResult {
    Continue,
    Exit,
}

fn execute_command(db: &mut Db, line: &str) -> CommandResult {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();
    let command = parts[0].to_lowercase();

    match command.as_str() {
        "help" => print_help(),

        "exit" => {
            println!("Goodbye!");
            return CommandResult::Exit;
        }

        "put" => {
            if parts.len() < 3 {
                println!("Usage: put <key> <value>");
                return CommandResult::Continue;
            }
            match db.put(parts[1], parts[2]) {
                Ok(()) => println!("OK"),
                Err(e) => print_error(&e),
            }
        }

        "get" => {
            if parts.len() < 2 {
                println!("Usage: get <key>");
                return CommandResult::Continue;
            }
            match db.lookup(parts[1]) {
                Ok(Some(value)) => println!("{}", value),
                Ok(None) => println!("(nil)"),
                Err(e) => print_error(&e),
            }
        }

        "get-all" => {
            let all = db.memtable_snapshot_as_map();
            if all.is_empty() {
                println!("(empty memtable)");
            }
            for (k, v) in all {
                println!("{} => {}", k, v);
            }
        }

        "delete" => {
            if parts.len() < 2 {
                println!("Usage: delete <key>");
                return CommandResult::Continue;
            }
            match db.delete(parts[1]) {
                Ok(()) => println!("OK"),
                Err(EngineError::NotFound) => println!("(not found)"),
                Err(e) => print_error(&e),
            }
        }

        "create-snapshot" => {
            let path = parts.get(1).copied().unwrap_or("snapshot.dat");
            let snap = db.create_snapshot();
            match snap.save_to_file(path) {
                Ok(()) => println!("snapshot (seq {}) saved to {}", snap.sequence(), path),
                Err(e) => print_error(&e),
            }
        }

        "restore-snapshot" => {
            if parts.len() < 2 {
                println!("Usage: restore-snapshot <path>");
                return CommandResult::Continue;
            }
            match restore_snapshot(parts[1]) {
                Ok(snap) => {
                    println!("restored sequence: {}", snap.sequence());
                    for (k, v) in snap.memtable().iter() {
                        println!("memtable: {} => {}", k, v);
                    }
                    for (i, group) in snap.sstables().iter().enumerate() {
                        println!("sstable group {} ({} entries)", i, group.len());
                        for e in group {
                            println!("  {} => {}", e.key, e.value);
                        }
                    }
                }
                Err(e) => print_error(&e),
            }
        }

        _ => println!("Unknown command: {} (try 'help')", command),
    }

    CommandResult::Continue
}

fn print_error(e: &EngineError) {
    match e {
        EngineError::NotFound => println!("error: not found"),
        EngineError::InvalidArgument(msg) => println!("error: invalid argument: {}", msg),
        other => println!("error: {}", other),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut db = Db::open(&cli.wal)
        .with_context(|| format!("failed to open database at {}", cli.wal.display()))?;

    println!("SiltKV version 0.1.0");
    println!("WAL: {}", cli.wal.display());
    println!("Type 'help' for usage hints");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline("silt> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match execute_command(&mut db, line) {
                    CommandResult::Continue => {}
                    CommandResult::Exit => break,
                }
            }
            Err(ReadlineError::Interrupted) => println!("^C"),
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
