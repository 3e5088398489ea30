mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // Show dotlaunch info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("dotlaunch", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Launch {
            module,
            args,
            patch,
            no_patches,
            overlay,
        } => {
            let code = commands::launch::run(
                module,
                args,
                &commands::launch::LaunchOptions {
                    patches: patch,
                    no_patches: *no_patches,
                    overlay: *overlay,
                    global: &cli.global,
                },
            )?;
            std::process::exit(code);
        }
        Command::Patches { id } => commands::patches::run(id.as_deref(), &cli.global),
        Command::Extract {
            source,
            staging,
            native,
            native_dir,
            patch_module,
            assets,
            overwrite,
        } => commands::extract::run(&commands::extract::ExtractOptions {
            source,
            staging,
            native,
            native_dir: native_dir.as_deref(),
            patch_modules: patch_module,
            assets,
            overwrite: *overwrite,
            global: &cli.global,
        }),
        Command::Overlay {
            module,
            manufacturer,
            brand,
            disabled,
        } => commands::overlay::run(
            module,
            manufacturer.as_deref(),
            brand.as_deref(),
            !*disabled,
            &cli.global,
        ),
    }
}
