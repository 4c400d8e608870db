//! `meteo-sync`: run a sync pass, read documents back, export the collection.
//!
//! ```bash
//! # Merge the latest observations into the local JSON store
//! meteo-sync sync
//!
//! # Rebuild two documents in Firestore from scratch
//! meteo-sync --store firestore --project my-project sync --abbr HTDRY --abbr HRLH --replace
//!
//! # Inspect what is stored
//! meteo-sync get HTDRY --out exports/
//! meteo-sync times HTDRY
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use meteo_sync::config::DEFAULT_COLLECTION;
use meteo_sync::store::key_order::to_ordered_map;
use meteo_sync::{
    default_data_dir, AbbreviationOutcome, CredentialChain, DocumentCollection, FileCollection,
    FirestoreCollection, MemoryCollection, MeteoSync, MeteoSyncError, SourceSettings, StoreError,
    StoreSettings, SyncConfig, WriteMode,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
    /// In-process only; nothing survives the run
    Memory,
    /// One JSON file per document under the data directory
    File,
    /// Firestore REST API
    Firestore,
}

#[derive(Parser, Debug)]
#[command(name = "meteo-sync")]
#[command(about = "Synchronise Latvian meteorological observations into a document store", long_about = None)]
struct Cli {
    /// Document store backend
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::File, env = "METEO_SYNC_STORE")]
    store: StoreKind,

    /// Root directory of the file store
    #[arg(long, global = true, env = "METEO_SYNC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Project id for the firestore store
    #[arg(long, global = true, env = "GOOGLE_CLOUD_PROJECT")]
    project: Option<String>,

    /// Collection holding one document per abbreviation
    #[arg(long, global = true, default_value = DEFAULT_COLLECTION, env = "METEO_SYNC_COLLECTION")]
    collection: String,

    /// CKAN datastore_search endpoint
    #[arg(long, global = true, env = "METEO_SYNC_SOURCE_URL")]
    source_url: Option<String>,

    /// Hours of history kept per station
    #[arg(long, global = true, env = "METEO_SYNC_PRUNE_HOURS")]
    prune_hours: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, compose and write every configured abbreviation
    Sync {
        /// Only these abbreviations (repeatable)
        #[arg(long = "abbr")]
        abbreviations: Vec<String>,

        /// Overwrite stored documents instead of merging into them
        #[arg(long)]
        replace: bool,
    },
    /// Print one document, or save it as <OUT>/<ABBR>.json
    Get {
        abbreviation: String,

        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write the whole collection to one JSON file
    Export {
        /// Defaults to ./<collection>.json
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the distinct observation times stored for a metric
    Times { abbreviation: String },
}

impl Cli {
    fn config(&self) -> SyncConfig {
        let mut source = SourceSettings::default();
        if let Some(url) = &self.source_url {
            source.base_url = url.clone();
        }
        let mut store = StoreSettings::default();
        if let Some(hours) = self.prune_hours {
            store.prune_window = Duration::from_secs(hours.saturating_mul(3600));
        }
        SyncConfig::builder().source(source).store(store).build()
    }

    async fn open_collection(&self) -> Result<Box<dyn DocumentCollection>, MeteoSyncError> {
        Ok(match self.store {
            StoreKind::Memory => Box::new(MemoryCollection::new(self.collection.as_str())),
            StoreKind::File => {
                let root = match &self.data_dir {
                    Some(dir) => dir.clone(),
                    None => default_data_dir().map_err(MeteoSyncError::DataDirResolution)?,
                };
                Box::new(FileCollection::open(&root, &self.collection).await?)
            }
            StoreKind::Firestore => {
                let project = self
                    .project
                    .clone()
                    .ok_or_else(|| MeteoSyncError::MissingProject("firestore".to_string()))?;
                let credentials = CredentialChain::standard()?.resolve().await?;
                Box::new(
                    FirestoreCollection::builder()
                        .project(project)
                        .collection(self.collection.as_str())
                        .credentials(credentials)
                        .build()?,
                )
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), MeteoSyncError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let collection = cli.open_collection().await?;
    let sync = MeteoSync::new(cli.config(), collection)?;

    match cli.command {
        Command::Sync {
            abbreviations,
            replace,
        } => {
            let mode = if replace {
                WriteMode::Replace
            } else {
                WriteMode::Incremental
            };
            let report = sync
                .sync()
                .maybe_abbreviations((!abbreviations.is_empty()).then_some(abbreviations))
                .mode(mode)
                .call()
                .await;
            for (abbreviation, outcome) in &report.outcomes {
                match outcome {
                    AbbreviationOutcome::Written(written) => println!(
                        "{:<8} {:>6} kept {:>5} new {:>4} stations {:>4} {:>8} bytes{}",
                        abbreviation,
                        written.mode,
                        written.retained,
                        written.admitted,
                        written.total_stations,
                        written.estimated_bytes,
                        if written.size_warning { " (over budget)" } else { "" }
                    ),
                    AbbreviationOutcome::NoData => println!("{:<8} no data", abbreviation),
                    AbbreviationOutcome::Failed(e) => println!("{:<8} failed: {}", abbreviation, e),
                }
            }
            if !report.is_success() {
                error!("{} abbreviations failed", report.failed());
                std::process::exit(1);
            }
        }
        Command::Get { abbreviation, out } => match out {
            Some(folder) => {
                let path = sync.store().save_json(&abbreviation, &folder).await?;
                println!("{}", path.display());
            }
            None => {
                let document = sync.reader().get(&abbreviation).await?;
                let text = to_ordered_map(&document)
                    .and_then(|map| serde_json::to_string_pretty(&map))
                    .map_err(|e| StoreError::Encode {
                        id: abbreviation.clone(),
                        source: e,
                    })?;
                println!("{}", text);
            }
        },
        Command::Export { out } => {
            let path = out.unwrap_or_else(|| PathBuf::from(format!("{}.json", cli.collection)));
            let count = sync.store().export_to_file(&path).await?;
            info!("Wrote {} documents to {}", count, path.display());
        }
        Command::Times { abbreviation } => {
            for timestamp in sync.reader().timestamps(&abbreviation).await? {
                println!("{}", timestamp);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_hours_to_window() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from(["meteo-sync", "--prune-hours", "6", "times", "HTDRY"])?;
        assert_eq!(cli.config().store.prune_window, Duration::from_secs(6 * 3600));

        let huge = u64::MAX.to_string();
        let cli = Cli::try_parse_from(["meteo-sync", "--prune-hours", huge.as_str(), "times", "HTDRY"])?;
        assert_eq!(cli.config().store.prune_window, Duration::from_secs(u64::MAX));
        Ok(())
    }
}
