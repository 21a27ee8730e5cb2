// ABOUTME: Entry point for the rolling-replacer CLI application.
// ABOUTME: Parses arguments, installs logging, and maps the run result to an exit code.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use rolling_replacer::output::{Output, OutputMode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mode = cli.output_mode();

    // -v wins over RUST_LOG; progress logs stay off stdout in quiet/json mode
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| match mode {
            OutputMode::Normal => EnvFilter::new("warn,rolling_replacer=info"),
            OutputMode::Quiet | OutputMode::Json => EnvFilter::new("warn"),
        })
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut output = Output::new(mode);
    if let Err(e) = commands::run(cli, &mut output).await {
        output.error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}
