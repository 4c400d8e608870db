//! Normalizes the portal's timestamps, which are published as naive local civil
//! time, into a UTC epoch plus an ISO-8601 rendering in the same civil timezone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

/// The civil timezone the Latvian portal reports in.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Riga;

/// Formats tried first, in order. The first one that parses wins.
const PRIMARY_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";

/// Looser ISO-8601 shapes tried after the primary formats.
const ISO_OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
];
const ISO_NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A timestamp in both representations stored on an observation.
///
/// Either both fields are set or neither is: `local_iso` is always derived from
/// `epoch`, never copied from the input string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedTime {
    pub epoch: Option<i64>,
    pub local_iso: Option<String>,
}

/// Converts local-time strings into [`NormalizedTime`] values for one civil timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTimeNormalizer {
    tz: Tz,
}

impl Default for LocalTimeNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}

impl LocalTimeNormalizer {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Parses `raw` and returns its epoch and local ISO rendering.
    /// Unparseable input gives an empty [`NormalizedTime`]; this never fails.
    pub fn normalize(&self, raw: &str) -> NormalizedTime {
        let epoch = self.to_epoch(raw);
        NormalizedTime {
            epoch,
            local_iso: epoch.and_then(|e| self.epoch_to_local_iso(e)),
        }
    }

    /// Parses `raw` into UTC epoch seconds. Naive inputs are read as local civil time.
    pub fn to_epoch(&self, raw: &str) -> Option<i64> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }

        for fmt in PRIMARY_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return self.resolve_local(naive).map(|dt| dt.timestamp());
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, DATE_ONLY_FORMAT) {
            return date
                .and_hms_opt(0, 0, 0)
                .and_then(|midnight| self.resolve_local(midnight))
                .map(|dt| dt.timestamp());
        }

        // General ISO-8601: explicit offsets are honoured, naive values are local.
        if let Ok(aware) = DateTime::parse_from_rfc3339(s) {
            return Some(aware.timestamp());
        }
        for fmt in ISO_OFFSET_FORMATS {
            if let Ok(aware) = DateTime::parse_from_str(s, fmt) {
                return Some(aware.timestamp());
            }
        }
        for fmt in ISO_NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return self.resolve_local(naive).map(|dt| dt.timestamp());
            }
        }
        None
    }

    /// Renders `epoch` as RFC 3339 in the civil timezone, e.g. `2024-05-01T15:00:00+03:00`.
    pub fn epoch_to_local_iso(&self, epoch: i64) -> Option<String> {
        let utc: DateTime<Utc> = DateTime::from_timestamp(epoch, 0)?;
        Some(
            utc.with_timezone(&self.tz)
                .fixed_offset()
                .to_rfc3339_opts(SecondsFormat::Secs, false),
        )
    }

    /// Attaches the civil timezone to a naive local time.
    ///
    /// A repeated wall-clock time (autumn fold) resolves to its earlier instant. A
    /// skipped one (spring gap) is read with the offset in force before the jump.
    fn resolve_local(&self, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
        if let Some(dt) = self.tz.from_local_datetime(&naive).earliest() {
            return Some(dt);
        }
        let hour = TimeDelta::hours(1);
        let before = naive.checked_sub_signed(hour)?;
        self.tz
            .from_local_datetime(&before)
            .earliest()
            .and_then(|dt| dt.checked_add_signed(hour))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn riga() -> LocalTimeNormalizer {
        LocalTimeNormalizer::default()
    }

    #[test]
    fn test_summer_and_winter_offsets() {
        let summer = riga().normalize("2024-05-01 15:00:00");
        assert_eq!(summer.epoch, Some(1_714_564_800));
        assert_eq!(summer.local_iso.as_deref(), Some("2024-05-01T15:00:00+03:00"));

        let winter = riga().normalize("2024-01-15T10:00:00");
        assert_eq!(winter.epoch, Some(1_705_305_600));
        assert_eq!(winter.local_iso.as_deref(), Some("2024-01-15T10:00:00+02:00"));
    }

    #[test]
    fn test_date_only_is_local_midnight() {
        assert_eq!(riga().to_epoch("2024-05-01"), Some(1_714_510_800));
    }

    #[test]
    fn test_fold_and_gap_resolution() {
        // Clocks go back at 04:00 EEST, so 03:30 happens twice; take the first.
        assert_eq!(riga().to_epoch("2024-10-27 03:30:00"), Some(1_729_989_000));

        // 03:30 does not exist on the spring-forward day; read it as EET.
        let gap = riga().normalize("2024-03-31 03:30:00");
        assert_eq!(gap.epoch, Some(1_711_848_600));
        assert_eq!(gap.local_iso.as_deref(), Some("2024-03-31T04:30:00+03:00"));
    }

    #[test]
    fn test_iso_fallbacks() {
        assert_eq!(riga().to_epoch("2024-05-01T12:00:00Z"), Some(1_714_564_800));
        assert_eq!(riga().to_epoch("2024-05-01T15:00:00+03:00"), Some(1_714_564_800));
        assert_eq!(riga().to_epoch("2024-05-01T15:00:00.000"), Some(1_714_564_800));
        assert_eq!(riga().to_epoch("2024-05-01 15:00"), Some(1_714_564_800));
    }

    #[test]
    fn test_unparseable_input_gives_nothing() {
        for raw in ["", "   ", "yesterday", "2024-13-45 99:00:00"] {
            assert_eq!(riga().normalize(raw), NormalizedTime::default(), "input {:?}", raw);
        }
    }

    #[test]
    fn test_local_iso_is_derived_from_epoch() {
        // Surrounding whitespace and a trailing fraction are not echoed back.
        let normalized = riga().normalize("  2024-05-01T15:00:00.5 ");
        assert_eq!(normalized.local_iso.as_deref(), Some("2024-05-01T15:00:00+03:00"));
    }

    #[test]
    fn test_other_timezone() {
        let utc = LocalTimeNormalizer::new(chrono_tz::UTC);
        assert_eq!(utc.to_epoch("2024-05-01 12:00:00"), Some(1_714_564_800));
        assert_eq!(
            utc.epoch_to_local_iso(1_714_564_800).as_deref(),
            Some("2024-05-01T12:00:00+00:00")
        );
    }
}
