//! Canonical sample instants.
//!
//! A [`TargetSchedule`] is a fixed set of UTC times of day (e.g. 00:00,
//! 06:00, 12:00, 18:00). Every day carries the same instants, so all queries
//! reduce to arithmetic on the offset into the day.

use std::str::FromStr;

/// Seconds in a UTC day.
pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Seconds in an hour.
pub const SECONDS_PER_HOUR: i64 = 60 * 60;

/// Default canonical hours (UTC).
pub const DEFAULT_CANONICAL_HOURS: &[u32] = &[0, 6, 12, 18];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("schedule has no canonical instants")]
    Empty,

    #[error("hour {0} is outside 0..=23")]
    HourOutOfRange(u32),

    #[error("interval of {0} hours does not fit in a day")]
    BadInterval(u32),

    #[error("invalid hour {0:?}")]
    Unparseable(String),
}

/// Canonical sample instants, as offsets (seconds) into each UTC day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSchedule {
    offsets: Vec<i64>,
}

impl TargetSchedule {
    /// Instants at the given whole UTC hours.
    pub fn from_hours(hours: &[u32]) -> Result<Self, ScheduleError> {
        if let Some(&bad) = hours.iter().find(|&&h| h > 23) {
            return Err(ScheduleError::HourOutOfRange(bad));
        }
        let mut offsets: Vec<i64> = hours.iter().map(|&h| h as i64 * SECONDS_PER_HOUR).collect();
        offsets.sort_unstable();
        offsets.dedup();
        if offsets.is_empty() {
            return Err(ScheduleError::Empty);
        }
        Ok(Self { offsets })
    }

    /// Instants every `interval_hours`, starting at midnight.
    pub fn every_hours(interval_hours: u32) -> Result<Self, ScheduleError> {
        if interval_hours == 0 || interval_hours > 24 {
            return Err(ScheduleError::BadInterval(interval_hours));
        }
        let hours: Vec<u32> = (0..24).step_by(interval_hours as usize).collect();
        Self::from_hours(&hours)
    }

    /// Offsets into the day, ascending.
    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }

    /// Midnight UTC of the day containing `timestamp`.
    pub fn day_start(timestamp: i64) -> i64 {
        timestamp.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
    }

    /// The canonical instants of the day starting at `day_start`.
    pub fn instants_for_day(&self, day_start: i64) -> impl Iterator<Item = i64> + '_ {
        self.offsets.iter().map(move |offset| day_start + offset)
    }

    /// Canonical instants in `[from, until)`, ascending.
    pub fn instants_between(&self, from: i64, until: i64) -> Vec<i64> {
        let mut instants = Vec::new();
        let mut day = Self::day_start(from);
        while day < until {
            instants.extend(
                self.instants_for_day(day)
                    .filter(|&t| t >= from && t < until),
            );
            day += SECONDS_PER_DAY;
        }
        instants
    }

    /// Smallest canonical instant strictly after `now`.
    pub fn next_after(&self, now: i64) -> i64 {
        let today = Self::day_start(now);
        self.instants_for_day(today)
            .find(|&t| t > now)
            .unwrap_or(today + SECONDS_PER_DAY + self.offsets[0])
    }

    /// Distance in seconds from `timestamp` to the nearest canonical time of
    /// day, measured around the clock (23:50 is 10 minutes from 00:00).
    pub fn distance_to_nearest(&self, timestamp: i64) -> i64 {
        let second_of_day = timestamp.rem_euclid(SECONDS_PER_DAY);
        self.offsets
            .iter()
            .map(|&offset| {
                let d = (second_of_day - offset).abs();
                d.min(SECONDS_PER_DAY - d)
            })
            .min()
            .unwrap_or(SECONDS_PER_DAY)
    }

    /// Whether `timestamp` is within `tolerance` seconds of a canonical time.
    pub fn is_canonical(&self, timestamp: i64, tolerance: i64) -> bool {
        self.distance_to_nearest(timestamp) <= tolerance
    }
}

impl Default for TargetSchedule {
    fn default() -> Self {
        Self {
            offsets: DEFAULT_CANONICAL_HOURS
                .iter()
                .map(|&h| h as i64 * SECONDS_PER_HOUR)
                .collect(),
        }
    }
}

/// Parses a comma-separated hour list such as `"0,6,12,18"`.
impl FromStr for TargetSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hours = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| ScheduleError::Unparseable(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_hours(&hours)
    }
}

impl std::fmt::Display for TargetSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let times: Vec<String> = self
            .offsets
            .iter()
            .map(|o| format!("{:02}:{:02}", o / SECONDS_PER_HOUR, (o % SECONDS_PER_HOUR) / 60))
            .collect();
        write!(f, "{} UTC", times.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = SECONDS_PER_DAY;
    const HOUR: i64 = SECONDS_PER_HOUR;

    #[test]
    fn test_default_is_four_times_a_day() {
        let schedule = TargetSchedule::default();
        assert_eq!(schedule.offsets(), &[0, 6 * HOUR, 12 * HOUR, 18 * HOUR]);
        assert_eq!(schedule, TargetSchedule::every_hours(6).unwrap());
        assert_eq!(schedule.to_string(), "00:00/06:00/12:00/18:00 UTC");
    }

    #[test]
    fn test_from_hours_validates() {
        assert_eq!(TargetSchedule::from_hours(&[]), Err(ScheduleError::Empty));
        assert_eq!(TargetSchedule::from_hours(&[3, 24]), Err(ScheduleError::HourOutOfRange(24)));
        assert_eq!(TargetSchedule::every_hours(0), Err(ScheduleError::BadInterval(0)));

        let schedule = TargetSchedule::from_hours(&[18, 6, 6]).unwrap();
        assert_eq!(schedule.offsets(), &[6 * HOUR, 18 * HOUR]);
    }

    #[test]
    fn test_parse_hour_list() {
        let schedule: TargetSchedule = " 0, 12 ".parse().unwrap();
        assert_eq!(schedule.offsets(), &[0, 12 * HOUR]);
        assert!(matches!("0,x".parse::<TargetSchedule>(), Err(ScheduleError::Unparseable(_))));
    }

    #[test]
    fn test_day_start_handles_negative_time() {
        assert_eq!(TargetSchedule::day_start(DAY + 5), DAY);
        assert_eq!(TargetSchedule::day_start(-5), -DAY);
    }

    #[test]
    fn test_instants_between_spans_days() {
        let schedule = TargetSchedule::default();
        let instants = schedule.instants_between(10 * DAY + 13 * HOUR, 11 * DAY + 7 * HOUR);
        assert_eq!(
            instants,
            vec![10 * DAY + 18 * HOUR, 11 * DAY, 11 * DAY + 6 * HOUR]
        );
    }

    #[test]
    fn test_next_after_rolls_to_next_day() {
        let schedule = TargetSchedule::default();
        assert_eq!(schedule.next_after(10 * DAY), 10 * DAY + 6 * HOUR);
        assert_eq!(schedule.next_after(10 * DAY + 5 * HOUR), 10 * DAY + 6 * HOUR);
        assert_eq!(schedule.next_after(10 * DAY + 19 * HOUR), 11 * DAY);
    }

    #[test]
    fn test_distance_wraps_around_midnight() {
        let schedule = TargetSchedule::default();
        let ten_to_midnight = 10 * DAY + 23 * HOUR + 50 * 60;

        assert_eq!(schedule.distance_to_nearest(ten_to_midnight), 10 * 60);
        assert!(schedule.is_canonical(ten_to_midnight, 30 * 60));
        assert!(!schedule.is_canonical(10 * DAY + 3 * HOUR, 30 * 60));
    }
}
