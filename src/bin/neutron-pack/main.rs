//! neutron-pack CLI - builds and packages the Neutron toolchain

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands, MessageFormat};
use neutron_pack::util::Shell;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("neutron_pack=debug")
    } else if cli.quiet {
        EnvFilter::new("neutron_pack=error")
    } else {
        EnvFilter::new("neutron_pack=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let shell = Shell::from_flags(
        cli.quiet,
        cli.verbose,
        cli.color,
        cli.message_format == MessageFormat::Json,
    );

    match cli.command {
        Commands::Package(args) => commands::package::execute(args, &shell),
        Commands::Clean(args) => commands::clean::execute(args, &shell),
        Commands::CheckDeps(args) => commands::check_deps::execute(args, &shell),
    }
}
