//! The incremental merge: reconciles a freshly composed document with the stored
//! one so repeated runs never duplicate, lose or reorder data.
//!
//! Staleness is judged against the stored document as it was before this merge;
//! pruning runs afterwards on the combined set, on every merge.

use crate::types::metric_document::MetricDocument;
use crate::types::observation::Observation;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// The merged document plus what happened to the incoming rows.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub document: MetricDocument,
    /// Incoming observations added to the document.
    pub admitted: usize,
    /// Incoming observations rejected as invalid, duplicate or stale.
    pub skipped: usize,
    /// Stored observations removed by the retention window, for lacking an identity
    /// or for repeating a (station, epoch) pair.
    pub pruned: usize,
}

/// Merges `incoming` into `existing`.
///
/// Without an existing document the incoming one is taken as is, minus rows lacking
/// a station id or epoch and repeated (station, epoch) pairs; nothing is pruned.
///
/// With an existing document, an incoming row is admitted only if its
/// (station, epoch) pair is new and its epoch is strictly later than the newest
/// epoch stored for that station. Repeated pairs already in `existing` are
/// collapsed to their first occurrence. The combined rows are then pruned so each
/// station keeps only the `prune_window` before its own newest epoch, station
/// totals are recounted, rows re-sorted and metadata refreshed from `incoming`.
pub fn merge(
    existing: Option<MetricDocument>,
    incoming: MetricDocument,
    prune_window: Duration,
) -> MergeOutcome {
    match existing {
        None => admit_all(incoming),
        Some(existing) => merge_into(existing, incoming, window_seconds(prune_window)),
    }
}

/// Prepares a document for a first write or a full replace: drops rows without an
/// identity and repeated identities (first occurrence wins), recounts and sorts.
pub fn admit_all(mut incoming: MetricDocument) -> MergeOutcome {
    let received = incoming.observations.len();
    let mut seen: HashSet<(String, i64)> = HashSet::with_capacity(received);
    incoming.observations.retain(|o| match o.identity() {
        Some((station, epoch)) => seen.insert((station.to_string(), epoch)),
        None => false,
    });

    let admitted = incoming.observations.len();
    incoming.refresh_total_stations();
    incoming.sort_observations();
    MergeOutcome {
        document: incoming,
        admitted,
        skipped: received - admitted,
        pruned: 0,
    }
}

fn merge_into(mut existing: MetricDocument, incoming: MetricDocument, window: i64) -> MergeOutcome {
    let latest = latest_by_station(&existing.observations);

    // Stored repeats of a pair keep their first occurrence.
    let stored = existing.observations.len();
    let mut seen: HashSet<(String, i64)> = HashSet::with_capacity(stored);
    existing.observations.retain(|o| match o.identity() {
        Some((station, epoch)) => seen.insert((station.to_string(), epoch)),
        None => true,
    });
    let repeated = stored - existing.observations.len();

    existing.overwrite_metadata(&incoming);

    let received = incoming.observations.len();
    let mut admitted = Vec::new();
    for observation in incoming.observations {
        let Some((station, epoch)) = observation.identity() else {
            continue;
        };
        let key = (station.to_string(), epoch);
        if seen.contains(&key) {
            continue;
        }
        if latest.get(station).is_some_and(|&last| epoch <= last) {
            continue;
        }
        seen.insert(key);
        admitted.push(observation);
    }

    let admitted_count = admitted.len();
    existing.observations.extend(admitted);

    let combined = existing.observations.len();
    existing.observations = prune_by_station_window(std::mem::take(&mut existing.observations), window);
    let pruned = repeated + combined - existing.observations.len();

    existing.refresh_total_stations();
    existing.sort_observations();
    MergeOutcome {
        document: existing,
        admitted: admitted_count,
        skipped: received - admitted_count,
        pruned,
    }
}

/// Newest epoch per station; rows without a station id or epoch are ignored.
pub fn latest_by_station(observations: &[Observation]) -> HashMap<String, i64> {
    let mut latest: HashMap<String, i64> = HashMap::new();
    for (station, epoch) in observations.iter().filter_map(Observation::identity) {
        latest
            .entry(station.to_string())
            .and_modify(|current| *current = (*current).max(epoch))
            .or_insert(epoch);
    }
    latest
}

/// Keeps rows with `epoch >= newest epoch of their station - window_seconds`.
/// Rows lacking a station id or epoch are dropped.
pub fn prune_by_station_window(observations: Vec<Observation>, window_seconds: i64) -> Vec<Observation> {
    let latest = latest_by_station(&observations);
    observations
        .into_iter()
        .filter(|o| match o.identity() {
            Some((station, epoch)) => latest
                .get(station)
                .map_or(true, |&newest| epoch >= newest.saturating_sub(window_seconds)),
            None => false,
        })
        .collect()
}

fn window_seconds(window: Duration) -> i64 {
    i64::try_from(window.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::metric_document::ScalarValue;

    fn obs(station: &str, epoch: i64) -> Observation {
        Observation {
            station_id: station.to_string(),
            station_name: format!("Station {}", station),
            datetime_epoch: Some(epoch),
            value: Some(epoch as f64 / 10.0),
            ..Default::default()
        }
    }

    fn doc(observations: Vec<Observation>) -> MetricDocument {
        let mut doc = MetricDocument::new("HTDRY");
        doc.observations = observations;
        doc.refresh_total_stations();
        doc.sort_observations();
        doc
    }

    fn epochs_of(doc: &MetricDocument, station: &str) -> Vec<i64> {
        doc.observations
            .iter()
            .filter(|o| o.station_id == station)
            .filter_map(|o| o.datetime_epoch)
            .collect()
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_stale_row_rejected_and_window_applied() {
        let existing = doc(vec![obs("A", 100), obs("A", 200), obs("A", 300)]);
        let incoming = doc(vec![obs("A", 250)]);

        let outcome = merge(Some(existing), incoming, secs(100));
        assert_eq!(epochs_of(&outcome.document, "A"), vec![300, 200]);
        assert_eq!(outcome.admitted, 0);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.pruned, 1);
    }

    #[test]
    fn test_empty_incoming_still_prunes() {
        let existing = doc(vec![obs("B", 100), obs("B", 200)]);
        let outcome = merge(Some(existing), MetricDocument::new("HTDRY"), secs(50));
        assert_eq!(epochs_of(&outcome.document, "B"), vec![200]);
        assert_eq!(outcome.pruned, 1);
        assert_eq!(outcome.document.total_stations, 1);
    }

    #[test]
    fn test_duplicates_only_leave_document_unchanged() {
        let existing = doc(vec![obs("A", 100), obs("A", 160), obs("B", 150)]);
        let incoming = doc(vec![obs("A", 160), obs("B", 150)]);

        let outcome = merge(Some(existing.clone()), incoming, secs(3600));
        assert_eq!(outcome.document, existing);
        assert_eq!(outcome.admitted, 0);
        assert_eq!(outcome.skipped, 2);
    }

    #[test]
    fn test_stored_repeats_collapsed() {
        let mut first = obs("A", 200);
        first.value = Some(1.0);
        let mut repeat = obs("A", 200);
        repeat.value = Some(2.0);
        let existing = doc(vec![first, repeat, obs("A", 100), obs("B", 200)]);

        let outcome = merge(Some(existing), doc(vec![obs("A", 200), obs("A", 300)]), secs(1000));
        assert_eq!(epochs_of(&outcome.document, "A"), vec![300, 200, 100]);
        let kept: Vec<Option<f64>> = outcome
            .document
            .observations
            .iter()
            .filter(|o| o.identity() == Some(("A", 200)))
            .map(|o| o.value)
            .collect();
        assert_eq!(kept, vec![Some(1.0)]);
        assert_eq!((outcome.admitted, outcome.skipped, outcome.pruned), (1, 1, 1));
        assert_eq!(outcome.document.total_stations, 2);
    }

    #[test]
    fn test_gap_fill_is_not_admitted() {
        // 150 was never stored, but it is older than the newest stored row.
        let existing = doc(vec![obs("A", 100), obs("A", 200)]);
        let incoming = doc(vec![obs("A", 150), obs("A", 200), obs("A", 260)]);

        let outcome = merge(Some(existing), incoming, secs(3600));
        assert_eq!(epochs_of(&outcome.document, "A"), vec![260, 200, 100]);
        assert_eq!(outcome.admitted, 1);
    }

    #[test]
    fn test_new_station_admitted_and_counted() {
        let existing = doc(vec![obs("A", 100)]);
        let incoming = doc(vec![obs("C", 50), obs("C", 70)]);

        let outcome = merge(Some(existing), incoming, secs(3600));
        assert_eq!(outcome.document.total_stations, 2);
        assert_eq!(epochs_of(&outcome.document, "C"), vec![70, 50]);
        assert_eq!(outcome.admitted, 2);
    }

    #[test]
    fn test_staleness_judged_before_pruning() {
        // Both incoming rows beat the stored 100; the window is applied afterwards
        // relative to the new newest row, so 120 and 100 fall out.
        let existing = doc(vec![obs("A", 100)]);
        let incoming = doc(vec![obs("A", 200), obs("A", 120)]);

        let outcome = merge(Some(existing), incoming, secs(50));
        assert_eq!(epochs_of(&outcome.document, "A"), vec![200]);
        assert_eq!(outcome.admitted, 2);
        assert_eq!(outcome.pruned, 2);
    }

    #[test]
    fn test_station_stops_reporting_keeps_its_window() {
        let existing = doc(vec![obs("A", 100), obs("A", 110), obs("B", 10_000)]);
        let incoming = doc(vec![obs("B", 20_000)]);

        let outcome = merge(Some(existing), incoming, secs(60));
        assert_eq!(epochs_of(&outcome.document, "A"), vec![110, 100]);
        assert_eq!(epochs_of(&outcome.document, "B"), vec![20_000]);
    }

    #[test]
    fn test_repeated_pair_within_batch_admitted_once() {
        let existing = doc(vec![obs("A", 100)]);
        let mut second = obs("A", 200);
        second.value = Some(-1.0);
        let incoming = MetricDocument {
            observations: vec![obs("A", 200), second],
            ..MetricDocument::new("HTDRY")
        };

        let outcome = merge(Some(existing), incoming, secs(3600));
        assert_eq!(epochs_of(&outcome.document, "A"), vec![200, 100]);
        assert_eq!(outcome.document.observations[0].value, Some(20.0));
    }

    #[test]
    fn test_invalid_rows_never_persisted() {
        let mut blank = obs(" ", 300);
        blank.station_name = "Blank".to_string();
        let mut undated = obs("A", 0);
        undated.datetime_epoch = None;

        let existing = doc(vec![obs("A", 100), undated.clone()]);
        let incoming = doc(vec![blank, undated]);

        let outcome = merge(Some(existing), incoming, secs(3600));
        assert_eq!(outcome.document.observations.len(), 1);
        assert!(outcome
            .document
            .observations
            .iter()
            .all(|o| o.identity().is_some()));
    }

    #[test]
    fn test_first_write_filters_but_does_not_prune() {
        let mut undated = obs("A", 0);
        undated.datetime_epoch = None;
        let incoming = MetricDocument {
            observations: vec![obs("A", 10), obs("A", 1_000_000), undated, obs("A", 10), obs("", 5)],
            total_stations: 99,
            ..MetricDocument::new("HTDRY")
        };

        let outcome = merge(None, incoming, secs(1));
        assert_eq!(epochs_of(&outcome.document, "A"), vec![1_000_000, 10]);
        assert_eq!(outcome.document.total_stations, 1);
        assert_eq!(outcome.admitted, 2);
        assert_eq!(outcome.skipped, 3);
        assert_eq!(outcome.pruned, 0);
    }

    #[test]
    fn test_metadata_refreshed_abbreviation_kept() {
        let mut existing = doc(vec![obs("A", 100)]);
        existing.en_description = Some("old".to_string());
        existing.lv_description = Some("vecs".to_string());
        existing
            .extra
            .insert("NOTE".to_string(), serde_json::json!("keep me"));

        let mut incoming = MetricDocument::new("OTHER");
        incoming.en_description = Some("new".to_string());
        incoming.upper_limit = Some(ScalarValue::Float(55.5));

        let merged = merge(Some(existing), incoming, secs(3600)).document;
        assert_eq!(merged.abbreviation, "HTDRY");
        assert_eq!(merged.en_description.as_deref(), Some("new"));
        assert_eq!(merged.lv_description.as_deref(), Some("vecs"));
        assert_eq!(merged.upper_limit, Some(ScalarValue::Float(55.5)));
        assert_eq!(merged.extra.get("NOTE"), Some(&serde_json::json!("keep me")));
    }

    #[test]
    fn test_result_sorted_by_name_then_epoch() {
        let existing = doc(vec![obs("A", 100), obs("Z", 100)]);
        let incoming = doc(vec![obs("A", 150), obs("M", 120), obs("Z", 130)]);

        let merged = merge(Some(existing), incoming, secs(3600)).document;
        let order: Vec<(&str, i64)> = merged
            .observations
            .iter()
            .map(|o| (o.station_id.as_str(), o.datetime_epoch.unwrap_or_default()))
            .collect();
        assert_eq!(
            order,
            vec![("Z", 130), ("Z", 100), ("M", 120), ("A", 150), ("A", 100)]
        );
        assert_eq!(merged.total_stations, 3);
    }

    #[test]
    fn test_latest_by_station() {
        let latest = latest_by_station(&[obs("A", 5), obs("A", 9), obs("B", 1), obs("", 100)]);
        assert_eq!(latest.get("A"), Some(&9));
        assert_eq!(latest.get("B"), Some(&1));
        assert_eq!(latest.len(), 2);
    }
}
