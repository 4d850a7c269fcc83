use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, Level};
use walkdir::WalkDir;

use greplet::Regex;

/// Search files or standard input for lines matching a pattern.
#[derive(clap::Parser)]
#[command(name = "greplet", version, about)]
struct Cli {
    /// The pattern to match lines against
    #[arg(short = 'E', value_name = "PATTERN")]
    pattern: String,

    /// Descend into directories
    #[arg(short = 'r')]
    recursive: bool,

    /// Files, or directories with -r; standard input when absent
    #[arg(value_name = "PATH")]
    paths: Vec<String>,
}

struct Outcome {
    matched: bool,
    errors: usize,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let engine = match Regex::new(&cli.pattern) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("greplet: invalid pattern: {err}");
            return ExitCode::from(2);
        }
    };

    let outcome = search(&cli, &engine);
    if outcome.errors > 0 {
        ExitCode::from(2)
    } else if outcome.matched {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn init_tracing() {
    let level = std::env::var("GREPLET_LOG")
        .ok()
        .and_then(|v| v.parse::<Level>().ok())
        .unwrap_or(Level::WARN);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .try_init();
}

fn search(cli: &Cli, engine: &Regex) -> Outcome {
    let mut outcome = Outcome {
        matched: false,
        errors: 0,
    };

    if cli.paths.is_empty() && !cli.recursive {
        if let Err(err) = scan_reader(io::stdin().lock(), engine, None, &mut outcome) {
            eprintln!("greplet: stdin: {err}");
            outcome.errors += 1;
        }
        return outcome;
    }

    let roots = if cli.paths.is_empty() {
        vec![String::from(".")]
    } else {
        cli.paths.clone()
    };
    let targets = collect_targets(&roots, cli.recursive, &mut outcome);
    let prefixed = cli.recursive || targets.len() > 1;
    for path in &targets {
        let label = prefixed.then_some(path.as_str());
        if let Err(err) = scan_file(Path::new(path), engine, label, &mut outcome) {
            eprintln!("greplet: {path}: {err}");
            outcome.errors += 1;
        }
    }
    outcome
}

/// Expands the command-line paths into the list of files to scan, walking
/// directories when `-r` was given.
fn collect_targets(roots: &[String], recursive: bool, outcome: &mut Outcome) -> Vec<String> {
    let mut targets = Vec::new();
    for root in roots {
        if Path::new(root).is_dir() {
            if !recursive {
                eprintln!("greplet: {root}: is a directory");
                outcome.errors += 1;
                continue;
            }
            for entry in WalkDir::new(root).sort_by_file_name() {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        targets.push(slashed(entry.path()));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        eprintln!("greplet: {root}: {err}");
                        outcome.errors += 1;
                    }
                }
            }
        } else {
            targets.push(root.clone());
        }
    }
    debug!(files = targets.len(), "collected search targets");
    targets
}

// Matched paths are printed with forward slashes regardless of platform.
fn slashed(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn scan_file(path: &Path, engine: &Regex, label: Option<&str>, outcome: &mut Outcome) -> Result<()> {
    let file = File::open(path)?;
    scan_reader(BufReader::new(file), engine, label, outcome)
}

fn scan_reader<R: BufRead>(
    reader: R,
    engine: &Regex,
    label: Option<&str>,
    outcome: &mut Outcome,
) -> Result<()> {
    for line in reader.lines() {
        let line = line?;
        if engine.is_match(&line) {
            outcome.matched = true;
            match label {
                Some(path) => println!("{path}:{line}"),
                None => println!("{line}"),
            }
        }
    }
    Ok(())
}
