//! The sync orchestrator: one pass fetches the source once, then composes, merges
//! and writes every configured abbreviation in turn.

use crate::compose::composer::Composer;
use crate::compose::error::ComposeError;
use crate::config::SyncConfig;
use crate::error::MeteoSyncError;
use crate::query::facade::MetricReader;
use crate::source::ckan_client::CkanClient;
use crate::source::snapshot::{ObservationSource, SourceSnapshot};
use crate::store::collection::DocumentCollection;
use crate::store::gateway::{DocumentStore, WriteMode, WriteReport};
use bon::bon;
use log::{error, info};
use std::sync::Arc;

/// What happened to one abbreviation during a pass.
#[derive(Debug, Clone)]
pub enum AbbreviationOutcome {
    Written(WriteReport),
    /// The source had no rows for the abbreviation; nothing was written.
    NoData,
    /// Composition or the write failed. The stored document is untouched. When the
    /// source itself could not be fetched every abbreviation shares that error.
    Failed(Arc<MeteoSyncError>),
}

/// Per-abbreviation results of a pass, in processing order.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub outcomes: Vec<(String, AbbreviationOutcome)>,
}

impl SyncReport {
    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, AbbreviationOutcome::Written(_)))
    }

    pub fn no_data(&self) -> usize {
        self.count(|o| matches!(o, AbbreviationOutcome::NoData))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, AbbreviationOutcome::Failed(_)))
    }

    /// `true` when no abbreviation failed. Missing data is not a failure.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn outcome(&self, abbreviation: &str) -> Option<&AbbreviationOutcome> {
        self.outcomes
            .iter()
            .find(|(abbr, _)| abbr == abbreviation)
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, predicate: impl Fn(&AbbreviationOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }
}

/// Synchronises metric documents from the open-data portal into a collection.
///
/// # Examples
///
/// ```no_run
/// # use meteo_sync::{MeteoSync, MeteoSyncError, SyncConfig, WriteMode};
/// # use meteo_sync::store::collection::MemoryCollection;
/// # async fn run() -> Result<(), MeteoSyncError> {
/// let sync = MeteoSync::new(SyncConfig::default(), Box::new(MemoryCollection::new("metrics")))?;
///
/// // Merge the latest observations into every configured document.
/// let report = sync.sync().call().await;
/// println!("{} written, {} failed", report.written(), report.failed());
///
/// // Rebuild a single document from scratch.
/// let report = sync
///     .sync()
///     .abbreviations(vec!["HTDRY".to_string()])
///     .mode(WriteMode::Replace)
///     .call()
///     .await;
/// assert!(report.is_success());
/// # Ok(())
/// # }
/// ```
pub struct MeteoSync {
    source: Box<dyn ObservationSource>,
    store: DocumentStore,
    composer: Composer,
    abbreviations: Vec<String>,
}

#[bon]
impl MeteoSync {
    /// A sync reading from the CKAN portal configured in `config.source`.
    pub fn new(
        config: SyncConfig,
        collection: Box<dyn DocumentCollection>,
    ) -> Result<Self, MeteoSyncError> {
        let client = CkanClient::new(config.source.clone())?;
        Ok(Self::with_source()
            .source(Box::new(client))
            .collection(collection)
            .config(config)
            .call())
    }

    /// A sync over any [`ObservationSource`]. Uses `SyncConfig::default()` when
    /// no config is given.
    #[builder]
    pub fn with_source(
        source: Box<dyn ObservationSource>,
        collection: Box<dyn DocumentCollection>,
        config: Option<SyncConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();
        Self {
            source,
            store: DocumentStore::from_boxed(collection, config.store),
            composer: Composer::new(config.source.timezone),
            abbreviations: config.abbreviations,
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn abbreviations(&self) -> &[String] {
        &self.abbreviations
    }

    /// A read facade over this sync's store.
    pub fn reader(&self) -> MetricReader<'_> {
        MetricReader::builder().store(&self.store).build()
    }

    /// Runs one pass.
    ///
    /// * `.abbreviations(Vec<String>)`: Optional. Defaults to the configured list.
    /// * `.mode(WriteMode)`: Optional. Defaults to [`WriteMode::Incremental`].
    ///
    /// Never fails as a whole: each abbreviation's result is in the report.
    #[builder]
    pub async fn sync(
        &self,
        abbreviations: Option<Vec<String>>,
        mode: Option<WriteMode>,
    ) -> SyncReport {
        let abbreviations = abbreviations.unwrap_or_else(|| self.abbreviations.clone());
        let mode = mode.unwrap_or_default();
        info!(
            "Starting {} sync of {} abbreviations into {}",
            mode,
            abbreviations.len(),
            self.store.collection_name()
        );

        let snapshot = match SourceSnapshot::fetch(self.source.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Fetching source data failed: {}", e);
                let shared = Arc::new(MeteoSyncError::from(e));
                return SyncReport {
                    outcomes: abbreviations
                        .into_iter()
                        .map(|abbr| (abbr, AbbreviationOutcome::Failed(shared.clone())))
                        .collect(),
                };
            }
        };

        let mut report = SyncReport::default();
        for abbreviation in abbreviations {
            let outcome = match self.sync_one(&snapshot, &abbreviation, mode).await {
                Ok(written) => AbbreviationOutcome::Written(written),
                Err(MeteoSyncError::Compose(ComposeError::NoData(_))) => {
                    info!("No data for {}, skipping", abbreviation);
                    AbbreviationOutcome::NoData
                }
                Err(e) => {
                    error!("Sync of {} failed: {}", abbreviation, e);
                    AbbreviationOutcome::Failed(Arc::new(e))
                }
            };
            report.outcomes.push((abbreviation, outcome));
        }

        info!(
            "Sync finished: {} written, {} without data, {} failed",
            report.written(),
            report.no_data(),
            report.failed()
        );
        report
    }

    async fn sync_one(
        &self,
        snapshot: &SourceSnapshot,
        abbreviation: &str,
        mode: WriteMode,
    ) -> Result<WriteReport, MeteoSyncError> {
        let document = self.composer.compose_from(snapshot, abbreviation)?;
        Ok(self.store.put(abbreviation, document, mode).await?)
    }
}
