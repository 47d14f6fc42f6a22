//! # cloud_backup
//!
//! Archives a local directory, uploads it to a cloud bucket when its content
//! changed since the last upload, and keeps only the newest backups.
//!
//! ## Features
//!
//! - **Change Detection**: SHA-256 fingerprint stored with every object, unchanged content is not uploaded again
//! - **Retention**: Keep the newest `keep` backups per host, path and tag
//! - **Compression**: Optional XZ (LZMA)
//! - **Stores**: Google Cloud Storage through `gsutil`, or a local directory
//! - **Host Identity**: From the GCE metadata server or supplied explicitly
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::Utc;
//! use cloud_backup::backup::backup_config::BackupConfig;
//! use cloud_backup::backup::run::run_backup;
//!
//! let config = BackupConfig::load(Some("config.yml".as_ref()))?;
//! config.validate_all()?;
//! run_backup(&config, config.host(), config.store(), Utc::now())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
