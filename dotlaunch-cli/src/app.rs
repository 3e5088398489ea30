use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// dotlaunch - run pre-built managed programs with load-time compatibility patches
#[derive(Debug, Parser)]
#[command(name = "dotlaunch", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Host configuration file (TOML).
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a managed program through the host runtime.
    Launch {
        /// Path to the managed module whose entry point runs.
        #[arg(value_name = "MODULE")]
        module: PathBuf,

        /// Arguments passed to the program.
        #[arg(value_name = "ARGS", trailing_var_arg = true)]
        args: Vec<String>,

        /// Patch to install (repeatable). Defaults to the configured patch set.
        #[arg(short, long, value_name = "ID")]
        patch: Vec<String>,

        /// Install no patches at all.
        #[arg(long, conflicts_with = "patch")]
        no_patches: bool,

        /// Allow the device compatibility overlay.
        #[arg(long)]
        overlay: bool,
    },

    /// List the registered compatibility patches.
    Patches {
        /// Show a single patch by id.
        #[arg(value_name = "ID")]
        id: Option<String>,
    },

    /// Stage native libraries, patch modules and assets into a staging directory.
    Extract {
        /// Directory artifacts are read from.
        #[arg(long, value_name = "DIR")]
        source: PathBuf,

        /// Directory artifacts are staged into.
        #[arg(long, value_name = "DIR")]
        staging: PathBuf,

        /// Native library file name to stage (repeatable).
        #[arg(long, value_name = "NAME")]
        native: Vec<String>,

        /// Directory of the native libraries below the roots (default: lib).
        #[arg(long, value_name = "DIR")]
        native_dir: Option<String>,

        /// Managed patch module file name to stage (repeatable).
        #[arg(long, value_name = "NAME")]
        patch_module: Vec<String>,

        /// Asset directory below the source root to stage (repeatable).
        #[arg(long, value_name = "DIR")]
        assets: Vec<PathBuf>,

        /// Rewrite files even when they are already identical.
        #[arg(long)]
        overwrite: bool,
    },

    /// Show the compatibility overlay decision for a module on a device.
    Overlay {
        /// Path to the managed module.
        #[arg(value_name = "MODULE")]
        module: PathBuf,

        /// Device manufacturer (default: from the environment).
        #[arg(long)]
        manufacturer: Option<String>,

        /// Device brand (default: from the environment).
        #[arg(long)]
        brand: Option<String>,

        /// Evaluate with the user preference turned off.
        #[arg(long)]
        disabled: bool,
    },
}
