//! Natural-language temporal expression parsing.
//!
//! Maps expressions like "this week", "last month", "past 7 days", or
//! "Feb 10" to inclusive `[start, end]` date ranges against a reference
//! date, and records the matched span so the orchestrator can strip it
//! from the query before keyword and semantic search.

use chrono::{Datelike, Days, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

/// An inclusive date range extracted from a query.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    /// `YYYY-MM-DD`.
    pub start: String,
    /// `YYYY-MM-DD`.
    pub end: String,
    /// The expression text that matched.
    pub matched: String,
    /// Byte span of the match in the original query.
    pub span: (usize, usize),
}

fn fmt(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn month_number(name: &str) -> Option<u32> {
    Some(match name {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sept" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    })
}

fn weekday_number(name: &str) -> Option<u32> {
    // 0 = Monday, matching `Datelike::weekday().num_days_from_monday()`.
    Some(match name {
        "monday" | "mon" => 0,
        "tuesday" | "tues" | "tue" => 1,
        "wednesday" | "wed" => 2,
        "thursday" | "thurs" | "thu" => 3,
        "friday" | "fri" => 4,
        "saturday" | "sat" => 5,
        "sunday" | "sun" => 6,
        _ => return None,
    })
}

const MONTH_ALT: &str = "january|february|march|april|august|september|october|november|december|june|july|sept|may|jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec";
const WEEKDAY_ALT: &str =
    "monday|tuesday|tues|wednesday|thursday|thurs|friday|saturday|sunday|mon|tue|wed|thu|fri|sat|sun";

macro_rules! cached_regex {
    ($pattern:expr) => {{
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new($pattern).unwrap())
    }};
}

fn range_of(m: &regex::Match<'_>, start: NaiveDate, end: NaiveDate) -> DateRange {
    DateRange {
        start: fmt(start),
        end: fmt(end),
        matched: m.as_str().to_string(),
        span: (m.start(), m.end()),
    }
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    } - Days::new(1);
    Some((first, last))
}

/// Parse the first temporal expression in `query` against `reference`.
pub fn parse_temporal(query: &str, reference: NaiveDate) -> Option<DateRange> {
    // today / yesterday
    if let Some(m) = cached_regex!(r"(?i)\btoday\b").find(query) {
        return Some(range_of(&m, reference, reference));
    }
    if let Some(m) = cached_regex!(r"(?i)\byesterday\b").find(query) {
        let d = reference - Days::new(1);
        return Some(range_of(&m, d, d));
    }

    // this week (Monday through the reference day)
    if let Some(m) = cached_regex!(r"(?i)\bthis\s+week\b").find(query) {
        let monday = reference - Days::new(reference.weekday().num_days_from_monday() as u64);
        return Some(range_of(&m, monday, reference));
    }

    // last week (previous Monday through Sunday)
    if let Some(m) = cached_regex!(r"(?i)\blast\s+week\b").find(query) {
        let this_monday = reference - Days::new(reference.weekday().num_days_from_monday() as u64);
        let last_monday = this_monday - Days::new(7);
        let last_sunday = this_monday - Days::new(1);
        return Some(range_of(&m, last_monday, last_sunday));
    }

    // past N days / last N days
    if let Some(caps) = cached_regex!(r"(?i)\b(?:past|last)\s+(\d+)\s+days?\b").captures(query) {
        let m = caps.get(0).unwrap();
        let days: u64 = caps[1].parse().ok()?;
        return Some(range_of(&m, reference - Days::new(days), reference));
    }

    // this month
    if let Some(m) = cached_regex!(r"(?i)\bthis\s+month\b").find(query) {
        let first = reference.with_day(1).unwrap();
        return Some(range_of(&m, first, reference));
    }

    // last month
    if let Some(m) = cached_regex!(r"(?i)\blast\s+month\b").find(query) {
        let first_of_this = reference.with_day(1).unwrap();
        let last_of_prev = first_of_this - Days::new(1);
        let first_of_prev = last_of_prev.with_day(1).unwrap();
        return Some(range_of(&m, first_of_prev, last_of_prev));
    }

    // Standalone month name: whole calendar month, current year unless the
    // month lies ahead of the reference
    let month_pattern = format!(r"(?i)\b(?:(?:in|from)\s+)?({})\b", MONTH_ALT);
    static MONTH: OnceLock<Regex> = OnceLock::new();
    let month_re = MONTH.get_or_init(|| Regex::new(&month_pattern).unwrap());
    if let Some(caps) = month_re.captures(query) {
        let m = caps.get(0).unwrap();
        if let Some(month) = month_number(&caps[1].to_lowercase()) {
            let year = if month > reference.month() {
                reference.year() - 1
            } else {
                reference.year()
            };
            if let Some((first, last)) = month_bounds(year, month) {
                return Some(range_of(&m, first, last));
            }
        }
    }

    // last <weekday>: most recent strictly-prior occurrence
    let last_wd = cached_regex!(
        r"(?i)\blast\s+(monday|tuesday|tues|wednesday|thursday|thurs|friday|saturday|sunday|mon|tue|wed|thu|fri|sat|sun)\b"
    );
    if let Some(caps) = last_wd.captures(query) {
        let m = caps.get(0).unwrap();
        if let Some(target) = weekday_number(&caps[1].to_lowercase()) {
            let mut days_ago =
                (reference.weekday().num_days_from_monday() + 7 - target) % 7;
            if days_ago == 0 {
                days_ago = 7;
            }
            let d = reference - Days::new(days_ago as u64);
            return Some(range_of(&m, d, d));
        }
    }

    // on <weekday>: most recent occurrence, same-day allowed
    let on_wd_pattern = format!(r"(?i)\bon\s+({})\b", WEEKDAY_ALT);
    static ON_WD: OnceLock<Regex> = OnceLock::new();
    let on_wd = ON_WD.get_or_init(|| Regex::new(&on_wd_pattern).unwrap());
    if let Some(caps) = on_wd.captures(query) {
        let m = caps.get(0).unwrap();
        if let Some(target) = weekday_number(&caps[1].to_lowercase()) {
            let days_ago = (reference.weekday().num_days_from_monday() + 7 - target) % 7;
            let d = reference - Days::new(days_ago as u64);
            return Some(range_of(&m, d, d));
        }
    }

    // ISO date
    if let Some(caps) =
        cached_regex!(r"(?i)\b(?:(?:on|from)\s+)?(\d{4}-\d{2}-\d{2})\b").captures(query)
    {
        let m = caps.get(0).unwrap();
        let date = caps[1].to_string();
        return Some(DateRange {
            start: date.clone(),
            end: date,
            matched: m.as_str().to_string(),
            span: (m.start(), m.end()),
        });
    }

    // <month> <day>, rolling back a year when the date would be in the future
    let month_day_pattern = format!(
        r"(?i)\b(?:(?:on|in|from)\s+)?({})\s+(\d{{1,2}})\b",
        MONTH_ALT
    );
    static MONTH_DAY: OnceLock<Regex> = OnceLock::new();
    let month_day = MONTH_DAY.get_or_init(|| Regex::new(&month_day_pattern).unwrap());
    if let Some(caps) = month_day.captures(query) {
        let m = caps.get(0).unwrap();
        if let (Some(month), Ok(day)) = (
            month_number(&caps[1].to_lowercase()),
            caps[2].parse::<u32>(),
        ) {
            let mut target = NaiveDate::from_ymd_opt(reference.year(), month, day);
            if let Some(t) = target {
                if t > reference {
                    target = NaiveDate::from_ymd_opt(reference.year() - 1, month, day);
                }
            }
            if let Some(t) = target {
                return Some(range_of(&m, t, t));
            }
        }
    }

    None
}

/// Remove the matched temporal span and collapse surrounding whitespace.
pub fn strip_temporal(query: &str, range: &DateRange) -> String {
    let (start, end) = range.span;
    if start > query.len() || end > query.len() || start > end {
        return query.trim().to_string();
    }
    let cleaned = format!("{} {}", &query[..start], &query[end..]);
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> NaiveDate {
        // A Sunday.
        NaiveDate::from_ymd_opt(2026, 2, 15).unwrap()
    }

    fn parse(q: &str) -> DateRange {
        parse_temporal(q, reference()).unwrap()
    }

    #[test]
    fn today_and_yesterday() {
        let r = parse("what did I write today");
        assert_eq!((r.start.as_str(), r.end.as_str()), ("2026-02-15", "2026-02-15"));
        let r = parse("notes from yesterday");
        assert_eq!((r.start.as_str(), r.end.as_str()), ("2026-02-14", "2026-02-14"));
    }

    #[test]
    fn this_week_runs_monday_to_reference() {
        let r = parse("highlights this week");
        assert_eq!(r.start, "2026-02-09");
        assert_eq!(r.end, "2026-02-15");
    }

    #[test]
    fn this_week_strips_to_clean_query() {
        let r = parse("highlights this week");
        assert_eq!(strip_temporal("highlights this week", &r), "highlights");
    }

    #[test]
    fn last_week_is_previous_monday_to_sunday() {
        let r = parse("meetings last week");
        assert_eq!(r.start, "2026-02-02");
        assert_eq!(r.end, "2026-02-08");
    }

    #[test]
    fn past_n_days() {
        let r = parse("action items past 7 days");
        assert_eq!(r.start, "2026-02-08");
        assert_eq!(r.end, "2026-02-15");
        let r = parse("last 1 day of notes");
        assert_eq!(r.start, "2026-02-14");
    }

    #[test]
    fn this_and_last_month() {
        let r = parse("reviews this month");
        assert_eq!(r.start, "2026-02-01");
        assert_eq!(r.end, "2026-02-15");
        let r = parse("reviews last month");
        assert_eq!(r.start, "2026-01-01");
        assert_eq!(r.end, "2026-01-31");
    }

    #[test]
    fn standalone_month_rolls_back_for_future_months() {
        let r = parse("performance reviews in January");
        assert_eq!(r.start, "2026-01-01");
        assert_eq!(r.end, "2026-01-31");
        // September is ahead of a February reference, so the prior year.
        let r = parse("offsite notes from September");
        assert_eq!(r.start, "2025-09-01");
        assert_eq!(r.end, "2025-09-30");
    }

    #[test]
    fn month_strip_removes_preposition() {
        let q = "performance reviews in January";
        let r = parse(q);
        assert_eq!(strip_temporal(q, &r), "performance reviews");
    }

    #[test]
    fn last_weekday_is_strictly_prior() {
        // Reference is Sunday; "last sunday" means a full week back.
        let r = parse("notes from last sunday");
        assert_eq!(r.start, "2026-02-08");
        let r = parse("notes from last monday");
        assert_eq!(r.start, "2026-02-09");
    }

    #[test]
    fn on_weekday_allows_same_day() {
        let r = parse("what happened on sunday");
        assert_eq!(r.start, "2026-02-15");
        let r = parse("what happened on tuesday");
        assert_eq!(r.start, "2026-02-10");
    }

    #[test]
    fn iso_date_single_day() {
        let q = "standup notes 2026-02-03";
        let r = parse(q);
        assert_eq!((r.start.as_str(), r.end.as_str()), ("2026-02-03", "2026-02-03"));
        assert_eq!(strip_temporal(q, &r), "standup notes");
    }

    #[test]
    fn bare_month_outranks_weekday_iso_and_month_day() {
        // A month name resolves before the weekday branch sees the query.
        let r = parse("notes from February on Monday");
        assert_eq!(r.start, "2026-02-01");
        assert_eq!(r.end, "2026-02-28");

        // A month followed by a day still resolves as the whole month.
        let r = parse("retro notes feb 10");
        assert_eq!(r.start, "2026-02-01");
        assert_eq!(r.end, "2026-02-28");

        // December is ahead of a February reference, so the prior year.
        let r = parse("planning dec 1");
        assert_eq!(r.start, "2025-12-01");
        assert_eq!(r.end, "2025-12-31");
    }

    #[test]
    fn no_temporal_expression() {
        assert!(parse_temporal("database migration plan", reference()).is_none());
    }

    #[test]
    fn purely_temporal_query_strips_to_empty() {
        let q = "this week";
        let r = parse(q);
        assert_eq!(strip_temporal(q, &r), "");
    }

    #[test]
    fn december_month_bounds() {
        let r = parse_temporal("december recap", NaiveDate::from_ymd_opt(2026, 12, 20).unwrap())
            .unwrap();
        assert_eq!(r.start, "2026-12-01");
        assert_eq!(r.end, "2026-12-31");
    }
}
