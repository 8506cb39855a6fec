//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use neutron_pack::util::shell::ColorChoice;

/// neutron-pack - build and package the Neutron toolchain
#[derive(Parser)]
#[command(name = "neutron-pack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (check-deps: show every check's path and version)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Print only warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Output format for status messages
    #[arg(long, global = true, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build Neutron and box, then assemble a distributable package
    Package(PackageArgs),

    /// Remove build trees and build artifacts
    Clean(CleanArgs),

    /// Check that the native build toolchain is installed
    CheckDeps(CheckDepsArgs),
}

#[derive(Args)]
pub struct PackageArgs {
    /// Package directory (defaults to <product>-<os>-<arch>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also build the Windows installer (requires NSIS)
    #[arg(long)]
    pub installer: bool,

    /// Skip the Windows preflight checks and vcpkg bootstrap
    #[arg(long, env = "NEUTRON_SKIP_VCPKG")]
    pub skip_vcpkg: bool,

    /// Build the Debug configuration
    #[arg(long)]
    pub debug: bool,

    /// Link the language server statically (Linux)
    #[arg(long)]
    pub static_lsp: bool,

    /// Configure attempts per target
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct CleanArgs {}

#[derive(Args)]
pub struct CheckDepsArgs {}
