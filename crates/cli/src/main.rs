//! buildstash command line interface

mod cli;
mod commands;
mod errors;
mod tracing;

use crate::cli::{Cli, Commands, parse};
use crate::commands::lookup::MISS_EXIT_CODE;
use crate::commands::{CacheContext, load_config, lookup, maintenance, store};
use crate::errors::{CliError, CliResult};
use crate::tracing::TracingConfig;
use std::io::Write;

#[allow(clippy::print_stderr)]
fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with --level debug for more information.");
    }));

    match run_main() {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("{error:?}");
            std::process::exit(1);
        }
    }
}

fn run_main() -> miette::Result<i32> {
    let cli = parse();

    let tracing_config = TracingConfig {
        format: cli.tracing_format(),
        level: cli.level.into(),
        ..Default::default()
    };
    crate::tracing::init_tracing(tracing_config)
        .map_err(|e| miette::miette!("Failed to initialize tracing: {e}"))?;

    Ok(execute_command(cli)?)
}

fn write_stdout(data: &[u8]) -> CliResult<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(data).map_err(CliError::output_error)?;
    stdout.flush().map_err(CliError::output_error)
}

fn write_stderr(data: &[u8]) -> CliResult<()> {
    let mut stderr = std::io::stderr().lock();
    stderr.write_all(data).map_err(CliError::output_error)?;
    stderr.flush().map_err(CliError::output_error)
}

fn write_line(line: &str) -> CliResult<()> {
    write_stdout(format!("{line}\n").as_bytes())
}

fn execute_command(cli: Cli) -> CliResult<i32> {
    let config = load_config(cli.dir.as_deref())?;
    let command_name = match &cli.command {
        Commands::Stats => "stats",
        Commands::ZeroStats => "zero-stats",
        Commands::Clear => "clear",
        Commands::Config => "config",
        Commands::Lookup(_) => "lookup",
        Commands::Store(_) => "store",
    };
    let _span = crate::command_span!(command_name).entered();

    if matches!(cli.command, Commands::Config) {
        write_line(&maintenance::execute_config(&config)?)?;
        return Ok(0);
    }

    let context = CacheContext::open(config)?;
    match cli.command {
        Commands::Stats => write_stdout(maintenance::execute_stats(&context.local)?.as_bytes())?,
        Commands::ZeroStats => write_line(&maintenance::execute_zero_stats(&context.local)?)?,
        Commands::Clear => write_line(&maintenance::execute_clear(&context.local)?)?,
        Commands::Config => {} // Handled above
        Commands::Lookup(args) => {
            let Some(hit) = lookup::execute_lookup(&context.engine, &args)? else {
                write_stderr(format!("buildstash: cache miss for {}\n", args.hash).as_bytes())?;
                return Ok(MISS_EXIT_CODE);
            };
            write_stdout(&hit.std_out)?;
            write_stderr(&hit.std_err)?;
            return Ok(hit.return_code);
        }
        Commands::Store(args) => store::execute_store(&context.engine, &args)?,
    }
    Ok(0)
}
