// Recurrence math - pure due-date computation for billing schedules

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use remit_shared::{Frequency, RecurringSchedule};

/// One frequency step forward from `date`, calendar-aware.
///
/// Month and year steps keep the anchor's day-of-month where it exists in
/// the target month and clamp to that month's last day otherwise, so a
/// schedule anchored on the 31st lands on Feb 28/29 or Apr 30 instead of
/// drifting or failing.
pub fn advance(date: NaiveDate, frequency: Frequency) -> NaiveDate {
    match frequency {
        Frequency::Weekly => date + Duration::weeks(1),
        Frequency::Monthly => shift_months(date, 1),
        Frequency::Quarterly => shift_months(date, 3),
        Frequency::Yearly => shift_months(date, 12),
    }
}

/// The date this schedule next owes an invoice: one interval past the last
/// generation, or one interval past `start_date` if nothing has been
/// generated yet.
pub fn next_due_date(schedule: &RecurringSchedule) -> NaiveDate {
    let anchor = schedule
        .last_generated
        .map(|at| at.date_naive())
        .unwrap_or(schedule.start_date);
    advance(anchor, schedule.frequency)
}

/// Whether the schedule owes an invoice at `now`.
///
/// `now` is always caller-supplied; this never reads the wall clock, so
/// repeated evaluation with the same inputs gives the same answer.
pub fn is_due(schedule: &RecurringSchedule, now: DateTime<Utc>) -> bool {
    if !schedule.is_active {
        return false;
    }
    let today = now.date_naive();
    if let Some(end) = schedule.end_date {
        if end < today {
            return false;
        }
    }
    next_due_date(schedule) <= today
}

fn shift_months(date: NaiveDate, months: i32) -> NaiveDate {
    let mut year = date.year();
    let mut month = date.month() as i32 + months;
    while month > 12 {
        month -= 12;
        year += 1;
    }
    let day = date.day().min(days_in_month(year, month as u32));
    NaiveDate::from_ymd_opt(year, month as u32, day).unwrap_or(date)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match NaiveDate::from_ymd_opt(next_year, next_month, 1) {
        Some(first_of_next) => (first_of_next - Duration::days(1)).day(),
        None => 28,
    }
}
