use chrono::{DateTime, Days, LocalResult, NaiveDateTime, Offset, TimeZone, Timelike};

use crate::alarm::model::TimeOfDay;

/// Next instant at which `target` occurs on the wall clock of `now`'s zone.
///
/// Today if `target` is still ahead of `now` (compared to the second),
/// tomorrow otherwise, so an alarm set for the current second waits a full
/// day instead of firing immediately. The result is always after `now`: when
/// the chosen date only offers instants already passed (the first pass of a
/// repeated hour), the earliest later one wins, falling through to the next
/// date if needed.
pub fn resolve<Tz>(now: &DateTime<Tz>, target: TimeOfDay) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let timezone = now.timezone();
    let now_clock = now.time().with_nanosecond(0)?;
    let first_day = if target.as_naive() > now_clock { 0 } else { 1 };
    (first_day..=first_day + 1).find_map(|day_offset| {
        let date = now.date_naive().checked_add_days(Days::new(day_offset))?;
        local_candidates(&timezone, date.and_time(target.as_naive()))
            .into_iter()
            .find(|candidate| candidate > now)
    })
}

/// Instants showing `naive` on the wall clock, earliest first.
fn local_candidates<Tz>(timezone: &Tz, naive: NaiveDateTime) -> Vec<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => vec![dt],
        LocalResult::Ambiguous(earlier, later) => vec![earlier, later],
        LocalResult::None => resolve_gap(timezone, naive).into_iter().collect(),
    }
}

/// Inside a spring-forward gap: read the wall clock with the offset that
/// applied before the jump.
fn resolve_gap<Tz>(timezone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let before_gap = naive.checked_sub_signed(chrono::Duration::hours(3))?;
    let offset = timezone
        .offset_from_local_datetime(&before_gap)
        .earliest()?
        .fix();
    let utc = naive.checked_sub_signed(chrono::Duration::seconds(i64::from(
        offset.local_minus_utc(),
    )))?;
    Some(timezone.from_utc_datetime(&utc))
}

/// Time left until `fire_at`, clamped to zero for instants already passed.
pub fn delay_until<Tz: TimeZone>(
    now: &DateTime<Tz>,
    fire_at: &DateTime<Tz>,
) -> std::time::Duration {
    fire_at
        .clone()
        .signed_duration_since(now.clone())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}
