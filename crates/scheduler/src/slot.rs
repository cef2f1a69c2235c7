use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};
use common::config::SchedulerConfig;
use common::models::SlotKey;

/// Maps instants to slots. A day (UTC) is cut into `slots_per_day` equal windows
/// and slot `i` covers `[i * period, (i + 1) * period)` from midnight.
#[derive(Debug, Clone)]
pub struct SlotClock {
    config: SchedulerConfig,
}

impl SlotClock {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn period(&self) -> Duration {
        self.config.slot_period()
    }

    pub fn slot_for(&self, now: DateTime<Utc>) -> SlotKey {
        let minutes = i64::from(now.hour() * 60 + now.minute());
        let period = self.period().num_minutes().max(1);
        let index = (minutes / period) as u32;
        SlotKey::new(now.date_naive(), index.min(self.config.slots_per_day.saturating_sub(1)))
    }

    pub fn slot_start(&self, key: SlotKey) -> DateTime<Utc> {
        let midnight = Utc.from_utc_datetime(&key.date.and_time(NaiveTime::MIN));
        midnight + self.period() * key.index as i32
    }

    /// Start of the slot after the one `now` falls in.
    pub fn next_slot_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.slot_start(self.slot_for(now)) + self.period()
    }

    /// Lease lifetime for one slot: the slot period.
    pub fn lease_ttl(&self) -> std::time::Duration {
        self.period()
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn clock(slots_per_day: u32) -> SlotClock {
        SlotClock::new(SchedulerConfig {
            capacity: 5,
            slots_per_day,
        })
    }

    #[test]
    fn test_hourly_slots() {
        let clock = clock(24);
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 13, 59, 59).unwrap();
        let key = clock.slot_for(t);

        assert_eq!(key, SlotKey::new(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), 13));
        assert_eq!(clock.slot_start(key), Utc.with_ymd_and_hms(2025, 3, 1, 13, 0, 0).unwrap());
        assert_eq!(clock.next_slot_start(t), Utc.with_ymd_and_hms(2025, 3, 1, 14, 0, 0).unwrap());
        assert_eq!(clock.lease_ttl(), std::time::Duration::from_secs(3600));
    }

    #[test]
    fn test_four_hour_slots_and_day_rollover() {
        let clock = clock(6);
        let first = clock.slot_for(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        let last = clock.slot_for(Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 0).unwrap());

        assert_eq!(first.index, 0);
        assert_eq!(last.index, 5);
        assert_eq!(
            clock.next_slot_start(Utc.with_ymd_and_hms(2025, 3, 1, 22, 0, 0).unwrap()),
            Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap()
        );
    }
}
