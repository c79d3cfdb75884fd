use crate::models::{DailyPoint, Record, StatsResponse, WeeklyAveragePoint, WeeklyPoint};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;

pub fn build_stats_at(today: NaiveDate, records: &[Record]) -> StatsResponse {
    const WEEK_COUNT: usize = 8;

    let by_date: BTreeMap<NaiveDate, &Record> =
        records.iter().map(|record| (record.date, record)).collect();

    let mut last_7_days = Vec::with_capacity(7);
    for offset in (0..7).rev() {
        let date = today - Duration::days(offset);
        let record = by_date.get(&date);
        last_7_days.push(DailyPoint {
            date: date.to_string(),
            value: record.map(|r| r.value),
            delta: record.map(|r| r.delta).unwrap_or(0),
        });
    }

    let current_week_start = week_start(today);
    let mut weekly_totals = Vec::with_capacity(WEEK_COUNT);
    let mut weekly_averages = Vec::with_capacity(WEEK_COUNT);

    for offset in (0..WEEK_COUNT).rev() {
        let start = current_week_start - Duration::weeks(offset as i64);
        let end = start + Duration::days(6);

        let mut logged = 0u8;
        let mut net_delta = 0i64;
        let mut value_sum = 0u64;
        for (_, record) in by_date.range(start..=end) {
            logged += 1;
            net_delta = net_delta.saturating_add(record.delta);
            value_sum = value_sum.saturating_add(record.value);
        }

        let denom = if logged == 0 { 1.0 } else { f64::from(logged) };

        weekly_totals.push(WeeklyPoint {
            week: week_label(start),
            start_date: start.to_string(),
            end_date: end.to_string(),
            records: logged,
            net_delta,
        });

        weekly_averages.push(WeeklyAveragePoint {
            week: week_label(start),
            days_counted: logged,
            avg_value: value_sum as f64 / denom,
        });
    }

    StatsResponse {
        last_7_days,
        weekly_totals,
        weekly_averages,
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn week_label(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}
