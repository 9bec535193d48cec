use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Abstracts wall-clock time so scheduling logic can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for deterministic testing -- time only advances when told to.
/// Uses std::sync::RwLock (not tokio) so it can be called from both sync
/// and async contexts without panicking.
pub struct FakeClock {
    time: std::sync::RwLock<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(time: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            time: std::sync::RwLock::new(time),
        })
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.write().unwrap() = time;
    }

    pub fn advance(&self, duration: Duration) {
        let mut t = self.time.write().unwrap();
        *t += duration;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read().unwrap()
    }
}

/// Convert a civil date+time in `zone` to a UTC instant.
///
/// DST gaps (`LocalResult::None`) are normalized forward minute-by-minute
/// until a valid instant is found. DST overlaps (`LocalResult::Ambiguous`)
/// resolve to the earlier of the two candidates.
pub fn local_to_utc(zone: chrono_tz::Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match zone.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _latest) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => {
            // Non-existent local time (DST spring-forward gap). Search forward
            // minute by minute for the first valid instant, bounded to 4 hours
            // which comfortably covers every real-world DST transition.
            let mut candidate = naive;
            for _ in 0..240 {
                candidate += Duration::minutes(1);
                if let chrono::LocalResult::Single(dt) = zone.from_local_datetime(&candidate) {
                    return dt.with_timezone(&Utc);
                }
            }
            // Unreachable in practice; fall back to UTC interpretation.
            Utc.from_utc_datetime(&naive)
        }
    }
}
