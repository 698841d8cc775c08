//! Weekly program lookups. Pure computation over already-fetched config;
//! the caller supplies the device-reported local time.

use chrono::{Datelike, NaiveDateTime, NaiveTime};

use crate::types::{ActivityId, DayProgram, Period, ZoneConfig};
use crate::{Error, Result};

const DAYS_PER_WEEK: usize = 7;

/// The activity the weekly program calls for at `local`, or `None` if no
/// enabled period has started yet today. Callers fall back to the zone's
/// device-reported `currentActivity`, never silently to `home`.
pub fn current_activity(zone: &ZoneConfig, local: NaiveDateTime) -> Result<Option<ActivityId>> {
    let week = week(zone)?;
    let day = &week[local.weekday().num_days_from_sunday() as usize];
    let now = local.time();

    // Periods are ordered ascending by time; the last one at or before
    // `now` wins, overriding earlier periods in the same day.
    let mut current = None;
    for period in day.period.iter().filter(|p| p.is_enabled()) {
        if period_time(zone, period)? <= now {
            current = Some(period_activity(zone, period)?);
        }
    }
    Ok(current)
}

/// Time of the next enabled period transition, scanning forward from
/// `local` and wrapping Saturday to Sunday for at most one full week.
/// `None` means no enabled period exists anywhere; a hold taken now must
/// be open-ended.
pub fn next_transition(zone: &ZoneConfig, local: NaiveDateTime) -> Result<Option<NaiveTime>> {
    let week = week(zone)?;
    let today = local.weekday().num_days_from_sunday() as usize;
    let now = local.time();

    for offset in 0..=DAYS_PER_WEEK {
        let day = &week[(today + offset) % DAYS_PER_WEEK];
        for period in day.period.iter().filter(|p| p.is_enabled()) {
            let time = period_time(zone, period)?;
            // Offset 7 revisits today one week out, where periods earlier
            // than `now` are reachable again.
            if offset == 0 && time <= now {
                continue;
            }
            return Ok(Some(time));
        }
    }
    Ok(None)
}

fn week(zone: &ZoneConfig) -> Result<&[DayProgram]> {
    let program = zone
        .program
        .first()
        .ok_or_else(|| Error::Schedule(format!("zone {} has no program", zone.id)))?;
    if program.day.len() != DAYS_PER_WEEK {
        return Err(Error::Schedule(format!(
            "zone {}: expected {DAYS_PER_WEEK} program days, found {}",
            zone.id,
            program.day.len()
        )));
    }
    Ok(&program.day)
}

fn period_time(zone: &ZoneConfig, period: &Period) -> Result<NaiveTime> {
    let raw = period
        .time
        .as_deref()
        .ok_or_else(|| Error::Schedule(format!("zone {}: enabled period without a time", zone.id)))?;
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|e| Error::Schedule(format!("zone {}: period time {raw:?}: {e}", zone.id)))
}

fn period_activity(zone: &ZoneConfig, period: &Period) -> Result<ActivityId> {
    period.activity.ok_or_else(|| {
        Error::Schedule(format!("zone {}: enabled period without an activity", zone.id))
    })
}
