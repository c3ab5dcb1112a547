//! Recurrence resolution: pure calendar math, no side effects.
//!
//! Given a rule, a baseline (last acknowledgment or creation time) and the
//! current time, compute the trigger timestamp the scheduler should compare
//! against. Deterministic; malformed rules resolve to "no trigger" with a
//! warning rather than an error, and calendar dead-ends (a day set with no
//! valid candidate in the lookback window) return `None`.
//!
//! Generic over [`chrono::TimeZone`] so production resolves wall-clock
//! rules in local time while tests pin fixed UTC instants.

use std::collections::BTreeSet;

use carrel_core::{ClockTime, Item, Recurrence};
use chrono::{DateTime, Datelike, Days, Duration, Local, NaiveDate, TimeZone, Utc};

/// Compute the next trigger. Recurrence takes precedence over the one-shot
/// `scheduled_time`; a disabled or malformed rule yields no trigger at all
/// (no silent fallback to the one-shot).
pub fn next_trigger<Tz: TimeZone>(
    recurrence: Option<&Recurrence>,
    scheduled_time: Option<&DateTime<Tz>>,
    baseline: &DateTime<Tz>,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    if let Some(rule) = recurrence {
        if !rule.enabled() {
            return None;
        }
        if let Err(e) = rule.validate() {
            tracing::warn!("ignoring malformed recurrence rule: {e}");
            return None;
        }
        return match rule {
            Recurrence::Interval { minutes, .. } => {
                // Purely additive; never catches up against day boundaries.
                Some(baseline.clone() + Duration::minutes(i64::from(*minutes)))
            }
            Recurrence::Daily { time, .. } => {
                // Today's candidate, past or future; the caller compares
                // against now and last_notified.
                candidate(now, now.date_naive(), *time)
            }
            Recurrence::Weekly { time, days, .. } => weekly(now, *time, days),
            Recurrence::Monthly { time, days, .. } => monthly(now, *time, days),
        };
    }
    // One-shot: the trigger is the timestamp itself.
    scheduled_time.cloned()
}

/// The de-duplicated due decision shared by every trigger kind:
/// due once `now` reaches the trigger, unless this cycle was already
/// notified. One-shot tasks fire exactly once through the same predicate.
pub fn is_due<Tz: TimeZone>(
    trigger: &DateTime<Tz>,
    last_notified: Option<&DateTime<Tz>>,
    now: &DateTime<Tz>,
) -> bool {
    *now >= *trigger && last_notified.is_none_or(|ln| *ln < *trigger)
}

/// Resolve an item's trigger in local wall-clock time, reported in UTC.
pub fn next_trigger_utc(item: &Item, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local_now = now.with_timezone(&Local);
    let baseline = item.baseline().with_timezone(&Local);
    let scheduled = item.scheduled_time.map(|t| t.with_timezone(&Local));
    next_trigger(
        item.recurrence.as_ref(),
        scheduled.as_ref(),
        &baseline,
        &local_now,
    )
    .map(|t| t.with_timezone(&Utc))
}

/// Most recent matching weekday at `time`: today if it matches, else scan
/// backward up to a week. Day numbering is 0 = Sunday .. 6 = Saturday; an
/// empty set means every day.
fn weekly<Tz: TimeZone>(
    now: &DateTime<Tz>,
    time: ClockTime,
    days: &BTreeSet<u8>,
) -> Option<DateTime<Tz>> {
    let today = now.date_naive();
    for back in 0..7u64 {
        let date = today.checked_sub_days(Days::new(back))?;
        let weekday = date.weekday().num_days_from_sunday() as u8;
        if days.is_empty() || days.contains(&weekday) {
            return candidate(now, date, time);
        }
    }
    None
}

/// Most recent matching day-of-month at `time`: today if it matches, else
/// the largest earlier day in the set this month, else the largest day in
/// the set that exists in the previous month. An empty set means every day.
fn monthly<Tz: TimeZone>(
    now: &DateTime<Tz>,
    time: ClockTime,
    days: &BTreeSet<u8>,
) -> Option<DateTime<Tz>> {
    let today = now.date_naive();
    if days.is_empty() || days.contains(&(today.day() as u8)) {
        return candidate(now, today, time);
    }

    // Backward within the current month. Days before today always exist.
    if let Some(day) = days.iter().rev().find(|d| u32::from(**d) < today.day()) {
        let date = NaiveDate::from_ymd_opt(today.year(), today.month(), u32::from(*day))?;
        return candidate(now, date, time);
    }

    // Previous month, skipping days it does not have (e.g. 31 in February).
    let (prev_year, prev_month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };
    for day in days.iter().rev() {
        if let Some(date) = NaiveDate::from_ymd_opt(prev_year, prev_month, u32::from(*day)) {
            return candidate(now, date, time);
        }
    }
    None
}

/// `date` at `time` in the reference zone. A nonexistent local time (DST
/// spring-forward gap) is a calendar edge case: no trigger.
fn candidate<Tz: TimeZone>(
    reference: &DateTime<Tz>,
    date: NaiveDate,
    time: ClockTime,
) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_opt(u32::from(time.hour), u32::from(time.minute), 0)?;
    reference.timezone().from_local_datetime(&naive).earliest()
}
