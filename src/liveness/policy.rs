use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

/// Format written by workers predating RFC 3339 beats, e.g.
/// `2024-03-01 12:00:00 +0000`.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Encode a beat time the way the emitter stores it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decode a stored beat time. Accepts RFC 3339 and the legacy format.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, LEGACY_TIMESTAMP_FORMAT))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Decides whether a worker is dead from its recorded timestamps alone.
///
/// The heartbeat value wins when present. Without one, the worker's start
/// time stands in as an implicit first beat so a worker that has not beaten
/// yet gets a full threshold of grace. When neither is usable the worker is
/// reported dead: leaking bookkeeping for a dead worker is worse than pruning
/// a live one with garbage in its keys, which re-registers on its next beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    threshold: Duration,
}

impl StalenessPolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_dead(
        &self,
        last_beat: Option<&str>,
        started_at: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        match last_beat.or(started_at) {
            Some(raw) => self.is_stale(raw, now),
            None => true,
        }
    }

    /// True when `raw` is unparsable or older than the threshold.
    pub fn is_stale(&self, raw: &str, now: DateTime<Utc>) -> bool {
        let Some(beat) = parse_timestamp(raw) else {
            return true;
        };
        // A beat from the future (clock skew) has no age yet
        match (now - beat).to_std() {
            Ok(age) => age > self.threshold,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn policy() -> StalenessPolicy {
        StalenessPolicy::new(Duration::from_secs(5))
    }

    #[test]
    fn recent_beat_is_alive() {
        let beat = format_timestamp(t0());
        let now = t0() + chrono::Duration::seconds(4);
        assert!(!policy().is_dead(Some(&beat), None, now));
    }

    #[test]
    fn beat_exactly_at_threshold_is_alive() {
        let beat = format_timestamp(t0());
        let now = t0() + chrono::Duration::seconds(5);
        assert!(!policy().is_dead(Some(&beat), None, now));
    }

    #[test]
    fn beat_past_threshold_is_dead() {
        let beat = format_timestamp(t0());
        let now = t0() + chrono::Duration::milliseconds(5001);
        assert!(policy().is_dead(Some(&beat), None, now));
    }

    #[test]
    fn heartbeat_takes_precedence_over_start_time() {
        let started = format_timestamp(t0());
        let beat = format_timestamp(t0() + chrono::Duration::seconds(20));
        let now = t0() + chrono::Duration::seconds(22);
        assert!(!policy().is_dead(Some(&beat), Some(&started), now));
    }

    #[test]
    fn start_time_grants_grace_before_first_beat() {
        let started = format_timestamp(t0());
        assert!(!policy().is_dead(None, Some(&started), t0() + chrono::Duration::seconds(3)));
        assert!(!policy().is_dead(None, Some(&started), t0() + chrono::Duration::seconds(5)));
        assert!(policy().is_dead(None, Some(&started), t0() + chrono::Duration::seconds(6)));
    }

    #[test]
    fn nothing_recorded_is_dead() {
        assert!(policy().is_dead(None, None, t0()));
    }

    #[test]
    fn malformed_beat_is_dead_regardless_of_time() {
        let started = format_timestamp(t0());
        for raw in ["", "yesterday", "2024-13-45T99:00:00Z", "1709294400"] {
            assert!(policy().is_dead(Some(raw), None, t0()), "{raw:?}");
            // A bad heartbeat does not fall back to the start time
            assert!(policy().is_dead(Some(raw), Some(&started), t0()), "{raw:?}");
        }
    }

    #[test]
    fn malformed_start_time_is_dead() {
        assert!(policy().is_dead(None, Some("not a time"), t0()));
    }

    #[test]
    fn future_beat_is_alive() {
        let beat = format_timestamp(t0() + chrono::Duration::seconds(30));
        assert!(!policy().is_dead(Some(&beat), None, t0()));
    }

    #[test]
    fn legacy_timestamps_are_understood() {
        let beat = "2024-03-01 13:00:00 +0100";
        assert_eq!(parse_timestamp(beat), Some(t0()));
        assert!(!policy().is_dead(Some(beat), None, t0() + chrono::Duration::seconds(2)));
        assert!(policy().is_dead(Some(beat), None, t0() + chrono::Duration::seconds(6)));
    }

    #[test]
    fn rfc3339_with_offset_is_normalized_to_utc() {
        assert_eq!(parse_timestamp("2024-03-01T07:00:00-05:00"), Some(t0()));
        assert_eq!(parse_timestamp("  2024-03-01T12:00:00Z \n"), Some(t0()));
    }

    #[test]
    fn format_round_trips() {
        let at = t0() + chrono::Duration::milliseconds(123);
        let raw = format_timestamp(at);
        assert_eq!(raw, "2024-03-01T12:00:00.123Z");
        assert_eq!(parse_timestamp(&raw), Some(at));
    }

    #[test]
    fn threshold_is_configurable() {
        let beat = format_timestamp(t0());
        let now = t0() + chrono::Duration::seconds(8);
        assert!(StalenessPolicy::new(Duration::from_secs(5)).is_dead(Some(&beat), None, now));
        assert!(!StalenessPolicy::new(Duration::from_secs(10)).is_dead(Some(&beat), None, now));
    }
}
