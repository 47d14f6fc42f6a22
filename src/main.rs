use chrono::Utc;
use clap::Parser;
use cloud_backup::backup::backup_config::{BackupConfig, ConfigOverrides};
use cloud_backup::backup::logging::init_logging;
use cloud_backup::backup::result_error::result::Result;
use cloud_backup::backup::result_error::WithMsg;
use cloud_backup::backup::run::{run_backup, RunOutcome};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info, warn};

/// Back up a directory to a cloud bucket, skipping unchanged content and removing old backups
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory to back up
    #[arg(short, long)]
    path: Option<PathBuf>,
    /// Name of this backup series
    #[arg(short, long)]
    tag: Option<String>,
    /// Number of backups to keep
    #[arg(short, long)]
    keep: Option<NonZeroUsize>,
    /// Bucket name, defaults to `<project id>-backups`
    #[arg(short, long)]
    bucket: Option<String>,
    /// Also append status lines to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Use this machine id instead of asking the metadata server, requires --project-id
    #[arg(long, requires = "project_id")]
    machine_id: Option<String>,
    /// Use this project id instead of asking the metadata server, requires --machine-id
    #[arg(long, requires = "machine_id")]
    project_id: Option<String>,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        ConfigOverrides {
            path: args.path,
            tag: args.tag,
            keep: args.keep,
            bucket: args.bucket,
            log_file: args.log_file,
            machine_id: args.machine_id,
            project_id: args.project_id,
        }
    }
}

fn load_config(args: Args) -> Result<BackupConfig> {
    let config_path = args.config.clone();
    Ok(BackupConfig::load(config_path.as_deref())?.apply_overrides(args.into()))
}

fn run(config: &BackupConfig) -> Result<()> {
    config
        .validate_all()
        .with_msg("Config validation failed")?;

    match run_backup(config, config.host(), config.store(), Utc::now())? {
        RunOutcome::Unchanged { latest_key } => {
            info!("No changes since {latest_key}, backup finished");
        }
        RunOutcome::Uploaded { record, rotation } => {
            info!(
                "Backup finished: uploaded {}, removed {} old backups",
                record.storage_key(),
                rotation.deleted.len()
            );
            if let Some(e) = rotation.failed {
                warn!("{e}");
            }
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let res = load_config(args).and_then(|config| {
        init_logging(config.log_file().as_deref())?;
        run(&config)
    });

    if let Err(e) = res {
        if tracing::dispatcher::has_been_set() {
            error!("{e}");
        } else {
            eprintln!("{e}");
        }
        exit(1);
    }
}
