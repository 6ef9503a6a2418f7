#![allow(clippy::multiple_crate_versions)]
#![doc = include_str!("../../README.md")]

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use log::{debug, error, info, LevelFilter};
use types::{Compression, HidslError};

mod archive;
mod beep;
mod boot;
mod config;
mod device;
mod exec;
mod glob;
mod identity;
mod image;
mod interrupt;
mod mkfs;
mod mount;
mod pacman;
mod partitioner;
mod passwd;
mod reset;
mod restore;
mod systemd;
#[cfg(test)]
mod testing;
mod utils;

use crate::{
    config::Config,
    exec::SystemRunner,
    image::{make_image, prompt_password, ImageOptions},
    mount::{SysMounter, ToolMounter},
    reset::{reset, ResetOptions},
    restore::{restore, RestoreOptions, RestoreTarget},
};

#[derive(Debug, Subcommand)]
enum CliSubcommand {
    /// Restores an image onto a device or a mounted root
    Restore {
        #[arg(help = "Target device")]
        device: Option<PathBuf>,

        #[arg(short, long, help = "Image file")]
        image: Option<PathBuf>,

        #[arg(short, long, help = "Already mounted target root, no partitioning")]
        root: Option<PathBuf>,

        #[arg(short, long, help = "Wipe file system signatures before partitioning")]
        wipefs: bool,

        #[arg(short, long, help = "Perform an MBR instead of an EFI installation")]
        mbr: bool,

        #[arg(short = 'k', long, help = "JSON file of authorized keys per user")]
        authorized_keys: Option<PathBuf>,
    },

    /// Resets a mounted system for image creation
    Reset {
        #[arg(default_value = "/mnt", help = "The target system's root")]
        root: PathBuf,

        #[arg(short, long, help = "Don't require the root to be a mount point")]
        force: bool,

        #[arg(short, long, help = "Keep the users' home directories")]
        skip_homes: bool,
    },

    /// Creates an image from a mounted reference system
    Image {
        #[arg(help = "Reference system root")]
        root: PathBuf,

        #[arg(short, long, help = "Image file name template")]
        file: Option<String>,

        #[arg(short, long, help = "CIFS share to write the image to")]
        cifs: Option<String>,

        #[arg(short, long, help = "CIFS user name")]
        user: Option<String>,

        #[arg(short = 'x', long, value_enum, help = "Compression algorithm")]
        compression: Option<Compression>,

        #[arg(short, long, help = "Compression level")]
        level: Option<u8>,
    },
}

#[derive(Parser)]
#[command(version, about = "Digital Signage Imaging Utility")]
struct Cli {
    #[arg(long, global = true, help = "Configuration file")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Don't beep after completion")]
    quiet: bool,

    #[arg(short, long, global = true, help = "Show the output of subprocesses")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    debug: bool,

    #[clap(subcommand)]
    command: CliSubcommand,
}

fn run(cli: Cli) -> Result<(), anyhow::Error> {
    let config = Config::load(cli.config.as_deref()).context("Couldn't load configuration")?;

    interrupt::install()?;

    let runner = SystemRunner::new(cli.verbose);

    match cli.command {
        CliSubcommand::Restore {
            device,
            image,
            root,
            wipefs,
            mbr,
            authorized_keys,
        } => {
            let device = device.unwrap_or(config.restore.device);
            let target = RestoreTarget::resolve(&device, root.as_deref())?;

            let options = RestoreOptions {
                image: image.unwrap_or(config.restore.image),
                efi: !mbr,
                efi_size: config.restore.efi_size,
                wipe: wipefs,
                authorized_keys: authorized_keys.or(config.restore.authorized_keys),
                dsa_host_key: config.restore.dsa_host_key,
                verbose: cli.verbose,
            };

            restore(&runner, &SysMounter, &target, &options).context("Restore failed")?;

            info!("Image restored.");
            if !cli.quiet {
                beep::beep(&runner);
            }
        }
        CliSubcommand::Reset {
            root,
            force,
            skip_homes,
        } => {
            let options = ResetOptions {
                root,
                force,
                clean_homes: !skip_homes,
            };

            reset(&runner, &options, &config.reset).context("Reset failed")?;

            info!("System reset.");
            if !cli.quiet {
                beep::beep(&runner);
            }
        }
        CliSubcommand::Image {
            root,
            file,
            cifs,
            user,
            compression,
            level,
        } => {
            let options = ImageOptions {
                root,
                filename: file.unwrap_or(config.image.filename),
                share: cifs,
                user: user.unwrap_or(config.image.cifs_user),
                compression: compression.unwrap_or(config.image.compression),
                level: level.unwrap_or(config.image.level),
                verbose: cli.verbose,
            };

            let today = jiff::Zoned::now().date();
            let share_mounter = ToolMounter::new(&runner);
            let file = make_image(&runner, &share_mounter, &options, today, || {
                prompt_password("CIFS password: ")
            })
            .context("Image creation failed")?;

            info!("Image written to {}", file.display());
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    info!(
        "Running {} {}",
        env!("CARGO_CRATE_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");

            let Some(err) = e.downcast_ref::<HidslError>() else {
                return ExitCode::FAILURE;
            };

            if let HidslError::Subprocess { stderr, .. } = err {
                if !stderr.is_empty() {
                    debug!("{stderr}");
                }
            }

            ExitCode::from(err.exit_code())
        }
    }
}
