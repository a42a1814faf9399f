use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Week view slot layout: a daily window split into fixed-length slots,
/// read in the user's IANA timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekGrid {
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    pub slot_minutes: u32,
    pub timezone: Tz,
}

impl Default for WeekGrid {
    fn default() -> Self {
        Self {
            day_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            day_end: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_minutes: 30,
            timezone: Tz::UTC,
        }
    }
}

impl WeekGrid {
    pub fn validate(&self) -> Result<(), String> {
        if self.slot_minutes == 0 || 60 % self.slot_minutes != 0 {
            return Err("grid.slot_minutes must divide an hour".to_string());
        }
        if self.day_end <= self.day_start {
            return Err("grid.end must be after grid.start".to_string());
        }
        Ok(())
    }

    /// Resolves a local wall-clock slot start to an instant, rejecting times
    /// that are off the grid or outside the daily window.
    pub fn slot_start(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, String> {
        let time = local.time();
        if time < self.day_start || time >= self.day_end {
            return Err(format!(
                "slot {} is outside the {}-{} window",
                time.format("%H:%M"),
                self.day_start.format("%H:%M"),
                self.day_end.format("%H:%M")
            ));
        }
        let minutes_from_start = (time - self.day_start).num_minutes();
        if time.second() != 0
            || time.nanosecond() != 0
            || minutes_from_start % i64::from(self.slot_minutes) != 0
        {
            return Err(format!(
                "slot {} is not aligned to {}-minute steps",
                time.format("%H:%M:%S"),
                self.slot_minutes
            ));
        }

        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .map(|value| value.with_timezone(&Utc))
            .ok_or_else(|| format!("{local} does not exist in {}", self.timezone.name()))
    }

    pub fn to_local(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.timezone)
    }

    pub fn slots_per_day(&self) -> i64 {
        (self.day_end - self.day_start).num_minutes() / i64::from(self.slot_minutes.max(1))
    }
}

pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(date: &str, time: &str) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .expect("valid date")
            .and_time(parse_hhmm(time).expect("valid time"))
    }

    #[test]
    fn default_grid_has_twenty_half_hour_slots() {
        let grid = WeekGrid::default();
        assert!(grid.validate().is_ok());
        assert_eq!(grid.slots_per_day(), 20);
    }

    #[test]
    fn slot_start_accepts_aligned_times_inside_window() {
        let grid = WeekGrid::default();
        let start = grid
            .slot_start(local("2026-02-16", "08:00"))
            .expect("first slot");
        assert_eq!(start.to_rfc3339(), "2026-02-16T08:00:00+00:00");
        assert!(grid.slot_start(local("2026-02-16", "17:30")).is_ok());
    }

    #[test]
    fn slot_start_rejects_off_grid_times() {
        let grid = WeekGrid::default();
        assert!(grid.slot_start(local("2026-02-16", "07:30")).is_err());
        assert!(grid.slot_start(local("2026-02-16", "18:00")).is_err());
        assert!(grid.slot_start(local("2026-02-16", "09:15")).is_err());
    }

    #[test]
    fn slot_start_converts_from_configured_timezone() {
        let grid = WeekGrid {
            timezone: chrono_tz::Asia::Tokyo,
            ..WeekGrid::default()
        };
        let start = grid
            .slot_start(local("2026-02-16", "09:00"))
            .expect("tokyo slot");
        assert_eq!(start.to_rfc3339(), "2026-02-16T00:00:00+00:00");
        assert_eq!(grid.to_local(start).format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn validate_rejects_uneven_slot_length() {
        let grid = WeekGrid {
            slot_minutes: 25,
            ..WeekGrid::default()
        };
        assert!(grid.validate().is_err());
    }
}
