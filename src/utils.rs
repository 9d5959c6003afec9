use crate::error::{MarketContextError, Result, SchemaViolation};
use chrono::{Datelike, Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

/// Parses a reporting period in the format "Q# YYYY" or "YYYY-MM-DD to YYYY-MM-DD".
/// Returns the inclusive (start_date, end_date).
pub fn period_bounds(period: &str) -> Result<(NaiveDate, NaiveDate)> {
    let period = period.trim();

    if let Some((start, end)) = period.split_once(" to ") {
        let start = parse_iso_date(start.trim(), period)?;
        let end = parse_iso_date(end.trim(), period)?;
        if end < start {
            return Err(MarketContextError::schema(
                SchemaViolation::InvalidFormat,
                "period",
                format!("range start {} is after end {}", start, end),
            ));
        }
        return Ok((start, end));
    }

    let (quarter, year) = parse_quarter_label(period)?;
    let start_month = 3 * (quarter - 1) + 1;
    let start = NaiveDate::from_ymd_opt(year, start_month, 1);
    let end = last_day_of_month(year, start_month + 2);

    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(invalid_period(period)),
    }
}

/// Validates the period label without returning its bounds.
pub fn validate_period(period: &str) -> Result<()> {
    period_bounds(period).map(|_| ())
}

fn parse_quarter_label(period: &str) -> Result<(u32, i32)> {
    let mut parts = period.split_whitespace();
    let (Some(q), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid_period(period));
    };

    let quarter = q
        .strip_prefix('Q')
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| (1..=4).contains(n))
        .ok_or_else(|| invalid_period(period))?;

    let year = y
        .parse::<i32>()
        .ok()
        .filter(|_| y.len() == 4)
        .filter(|year| (2000..=2099).contains(year))
        .ok_or_else(|| invalid_period(period))?;

    Ok((quarter, year))
}

fn parse_iso_date(raw: &str, period: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        MarketContextError::schema(
            SchemaViolation::InvalidFormat,
            "period",
            format!("invalid date '{}' in period '{}'. Expected YYYY-MM-DD", raw, period),
        )
    })
}

fn invalid_period(period: &str) -> MarketContextError {
    MarketContextError::schema(
        SchemaViolation::InvalidFormat,
        "period",
        format!(
            "invalid period '{}'. Expected 'Q# YYYY' or 'YYYY-MM-DD to YYYY-MM-DD'",
            period
        ),
    )
}

/// Lists quarter labels from `newest` back to `oldest` inclusive, newest first.
pub fn quarters_desc(newest: &str, oldest: &str) -> Result<Vec<String>> {
    let (mut q, mut y) = parse_quarter_label(newest)?;
    let (q_end, y_end) = parse_quarter_label(oldest)?;

    let mut out = Vec::new();
    while y > y_end || (y == y_end && q >= q_end) {
        out.push(format!("Q{} {}", q, y));
        if q > 1 {
            q -= 1;
        } else {
            q = 4;
            y -= 1;
        }
    }
    Ok(out)
}

/// Quarter label ("Q# YYYY") containing the given date.
pub fn quarter_label(date: NaiveDate) -> String {
    format!("Q{} {}", (date.month() - 1) / 3 + 1, date.year())
}

/// Label of the latest quarter that ended before `today`.
pub fn last_complete_quarter(today: NaiveDate) -> String {
    let first_month = (today.month() - 1) / 3 * 3 + 1;
    let previous_end = NaiveDate::from_ymd_opt(today.year(), first_month, 1)
        .and_then(|start| start.pred_opt())
        .unwrap_or(today);
    quarter_label(previous_end)
}
