//! Clock & Timezone service: pure functions mapping a (month, day, zone,
//! reference instant, delivery-of-day) tuple to the next UTC instant at
//! which the owning user's local wall clock hits the configured delivery
//! time.

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::scheduling::event::EventType;

/// An hour:minute pair in the owning user's local timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl DeliveryOfDay {
    pub const fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }

    /// Per-event-type delivery-of-day constant table.
    pub fn for_event_type(event_type: EventType) -> Self {
        match event_type {
            EventType::Birthday => Self::new(9, 0),
        }
    }
}

/// Process-wide override of the delivery-of-day, parsed once at startup
/// from `deliveryTimeOverride` (`Ns` or `Nm`). Passed explicitly into the
/// service at construction rather than read as a global, per the
/// "delivery-time override is process-wide configuration, not a global
/// singleton" design note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryTimeOverride {
    /// No override: use the per-event-type constant table.
    None,
    /// Fire `offset` after the reference instant, regardless of zone.
    OffsetFromNow { offset_secs: i64 },
}

impl DeliveryTimeOverride {
    /// Parses `Ns` or `Nm` (seconds/minutes). Malformed values are
    /// reported as `None` rather than erroring; the caller logs and
    /// falls back to the default table.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let (digits, unit) = raw.split_at(raw.len() - 1);
        let n: i64 = digits.parse().ok()?;
        let secs = match unit {
            "s" => n,
            "m" => n.checked_mul(60)?,
            _ => return None,
        };
        Some(DeliveryTimeOverride::OffsetFromNow { offset_secs: secs })
    }
}

/// Timezone/next-occurrence service. Stateless except for the override,
/// which is captured at construction.
#[derive(Debug, Clone)]
pub struct TimezoneService {
    override_: DeliveryTimeOverride,
}

impl TimezoneService {
    pub fn new(override_: DeliveryTimeOverride) -> Self {
        Self { override_ }
    }

    /// The smallest instant >= `reference` such that its wall-clock
    /// representation in `zone` equals (month, day, delivery_hour,
    /// delivery_minute, 0). Applies the leap-day and DST policies from
    /// the component design.
    pub fn next_occurrence(
        &self,
        month: u32,
        day: u32,
        zone: Tz,
        reference: DateTime<Utc>,
        event_type: EventType,
    ) -> DateTime<Utc> {
        if let DeliveryTimeOverride::OffsetFromNow { offset_secs } = self.override_ {
            return reference + chrono::Duration::seconds(offset_secs);
        }
        let dod = DeliveryOfDay::for_event_type(event_type);
        next_occurrence_raw(month, day, zone, reference, dod)
    }
}

/// Substitutes Feb 29 -> Mar 1 when `year` is not a leap year.
fn leap_safe_date(year: i32, month: u32, day: u32) -> NaiveDate {
    if month == 2 && day == 29 && !is_leap_year(year) {
        NaiveDate::from_ymd_opt(year, 3, 1).expect("march 1 is always valid")
    } else {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, 3, 1).expect("march 1 is always valid"))
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Resolves `naive_date` at `dod` in `zone` to a UTC instant, handling the
/// DST spring-forward (advance to the next valid instant) and fall-back
/// (pick the earlier occurrence) cases explicitly.
fn resolve_local(naive_date: NaiveDate, dod: DeliveryOfDay, zone: Tz) -> DateTime<Utc> {
    let naive_time = NaiveTime::from_hms_opt(dod.hour, dod.minute, 0).expect("valid delivery time");
    let naive_dt = naive_date.and_time(naive_time);
    match zone.from_local_datetime(&naive_dt) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _later) => earlier.with_timezone(&Utc),
        LocalResult::None => {
            // Spring-forward: the local instant doesn't exist. Walk forward
            // minute-by-minute until one resolves; the gap is at most the
            // DST shift (typically one hour).
            let mut probe = naive_dt;
            loop {
                probe += chrono::Duration::minutes(1);
                if let LocalResult::Single(dt) = zone.from_local_datetime(&probe) {
                    return dt.with_timezone(&Utc);
                }
            }
        }
    }
}

fn next_occurrence_raw(
    month: u32,
    day: u32,
    zone: Tz,
    reference: DateTime<Utc>,
    dod: DeliveryOfDay,
) -> DateTime<Utc> {
    let reference_local = reference.with_timezone(&zone);
    let mut year = reference_local.year();

    loop {
        let candidate_date = leap_safe_date(year, month, day);
        let candidate_instant = resolve_local(candidate_date, dod, zone);
        if candidate_instant >= reference {
            return candidate_instant;
        }
        year += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    #[test]
    fn birthday_mid_year_nonexistent_dst_shift() {
        let svc = TimezoneService::new(DeliveryTimeOverride::None);
        let got = svc.next_occurrence(
            6,
            15,
            chrono_tz::America::New_York,
            utc(2025, 1, 1, 0, 0),
            EventType::Birthday,
        );
        assert_eq!(got, utc(2025, 6, 15, 13, 0));
    }

    #[test]
    fn next_year_rollover_is_dst_aware() {
        let svc = TimezoneService::new(DeliveryTimeOverride::None);
        let got = svc.next_occurrence(
            3,
            15,
            chrono_tz::America::New_York,
            utc(2025, 6, 1, 0, 0),
            EventType::Birthday,
        );
        assert_eq!(got, utc(2026, 3, 15, 13, 0));
    }

    #[test]
    fn leap_day_substitutes_march_first_in_non_leap_year() {
        // 2025-03-01 falls before the US DST transition (2025-03-09), so
        // America/New_York is still at UTC-5 (EST) on this date.
        let svc = TimezoneService::new(DeliveryTimeOverride::None);
        let got = svc.next_occurrence(
            2,
            29,
            chrono_tz::America::New_York,
            utc(2025, 1, 1, 0, 0),
            EventType::Birthday,
        );
        assert_eq!(got, utc(2025, 3, 1, 14, 0));
    }

    #[test]
    fn leap_day_in_leap_year_keeps_feb_29() {
        let svc = TimezoneService::new(DeliveryTimeOverride::None);
        let got = svc.next_occurrence(
            2,
            29,
            chrono_tz::America::New_York,
            utc(2024, 1, 1, 0, 0),
            EventType::Birthday,
        );
        assert_eq!(got, utc(2024, 2, 29, 14, 0));
    }

    #[test]
    fn override_offset_ignores_event_type_table() {
        let svc = TimezoneService::new(DeliveryTimeOverride::OffsetFromNow { offset_secs: 5 });
        let reference = utc(2025, 1, 1, 12, 0);
        let got = svc.next_occurrence(1, 1, chrono_tz::UTC, reference, EventType::Birthday);
        assert_eq!(got, reference + chrono::Duration::seconds(5));
    }

    #[test]
    fn parse_seconds_and_minutes() {
        assert_eq!(
            DeliveryTimeOverride::parse("5s"),
            Some(DeliveryTimeOverride::OffsetFromNow { offset_secs: 5 })
        );
        assert_eq!(
            DeliveryTimeOverride::parse("2m"),
            Some(DeliveryTimeOverride::OffsetFromNow { offset_secs: 120 })
        );
    }

    #[test]
    fn parse_rejects_malformed_values() {
        assert_eq!(DeliveryTimeOverride::parse("garbage"), None);
        assert_eq!(DeliveryTimeOverride::parse(""), None);
        assert_eq!(DeliveryTimeOverride::parse("5h"), None);
    }
}
