use std::io::{IsTerminal, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use beget::diagnostic::{ansi::AnsiRenderer, json, registry};
use beget::{Diagnostic, Error, Library, Vm};

#[derive(Parser)]
#[command(name = "beget", version, about = "Run programs in a small prototype-based language")]
struct Cli {
    /// Source file to run
    file: Option<String>,

    /// Run inline source instead of a file
    #[arg(short, long, value_name = "CODE", conflicts_with = "file")]
    eval: Option<String>,

    /// Print the parsed program as JSON and exit
    #[arg(long, conflicts_with = "disassemble")]
    ast: bool,

    /// Print the compiled bytecode and exit
    #[arg(long)]
    disassemble: bool,

    /// Report errors as JSON, one object per line
    #[arg(long)]
    json: bool,

    /// Never colour error output
    #[arg(long)]
    no_color: bool,

    /// Explain an error code, e.g. B-R001
    #[arg(long, value_name = "CODE")]
    explain: Option<String>,

    /// Log pipeline phases to stderr (repeat for instruction traces)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(code) = &cli.explain {
        return match registry::lookup(code) {
            Some(entry) => {
                print!("{}", entry.long);
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("unknown error code: {code}");
                ExitCode::FAILURE
            }
        };
    }

    let source = match (&cli.eval, &cli.file) {
        (Some(code), _) => code.clone(),
        (None, Some(path)) => match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error reading {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        (None, None) => {
            eprintln!("Usage: beget <FILE> | beget -e <CODE>");
            return ExitCode::FAILURE;
        }
    };

    match execute(&cli, &source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&cli, e.to_diagnostic().with_source(source.as_str()));
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    // -v and -vv take precedence over RUST_LOG.
    let filter = match verbose {
        0 => EnvFilter::from_default_env(),
        1 => EnvFilter::new("beget=debug"),
        _ => EnvFilter::new("beget=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn execute(cli: &Cli, source: &str) -> Result<(), Error> {
    let program = beget::parse_source(source)?;
    if cli.ast {
        match serde_json::to_string_pretty(&program) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Serialization error: {e}"),
        }
        return Ok(());
    }

    let lib = Library::new();
    let chunk = beget::compile(&program, &lib)?;
    if cli.disassemble {
        print!("{}", chunk.disassemble());
        return Ok(());
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    Vm::new(&chunk, &lib, &mut out).run()?;
    let _ = out.flush();
    Ok(())
}

fn report(cli: &Cli, d: Diagnostic) {
    if cli.json {
        eprintln!("{}", json::render(&d));
        return;
    }
    let use_color = !cli.no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    eprint!("{}", AnsiRenderer { use_color }.render(&d));
}
