use std::{error::Error, time::Duration};

use clap::Parser;
use env_logger::Env;
use log::warn;
use modpin::{
    cli::args::{CliArgs, Command},
    model::lock::LockFile,
    LockMode, Modpin, ModpinConfig,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli_args = CliArgs::parse();
    let config = ModpinConfig::load()?;

    let mut builder = Modpin::builder()
        .module_file_name(&cli_args.module_location)
        .lock_file_name(&cli_args.lockfile_location)
        .timeout(
            cli_args
                .timeout
                .map(Duration::from_secs)
                .or(config.resolve_timeout),
        );
    if let Some(cache_directory) = cli_args
        .cache_directory
        .map(Into::into)
        .or(config.cache_dir)
    {
        builder = builder.cache_directory(cache_directory);
    }
    if let Some(protocol) = config.default_protocol {
        builder = builder.default_protocol(protocol);
    }
    let modpin = builder.try_build()?;

    let cancel = CancellationToken::new();
    let interrupted = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling resolution");
            interrupted.cancel();
        }
    });

    match cli_args.cmd {
        Command::Resolve { references } => {
            let pins = modpin.resolve(&references, &cancel).await?;
            print!("{}", LockFile::from_pins(&pins).to_string()?);
        }
        Command::ResolveLocal { references } => {
            let candidates = modpin.resolve_local(&references, &cancel).await?;
            for candidate in candidates.values().flatten() {
                println!(
                    "{} via {}, {}",
                    candidate.pin, candidate.reference, candidate.provenance
                );
            }
        }
        Command::Lock { locked, recreate } => {
            let lock_mode = if locked {
                LockMode::Locked
            } else if recreate {
                LockMode::Recreate
            } else {
                LockMode::Update
            };
            modpin.lock(lock_mode, &cancel).await?;
        }
        Command::ClearCache => modpin.clear_cache()?,
    }

    Ok(())
}
