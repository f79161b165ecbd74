use crate::models::{Bucket, DatedRecord, KpiResult, PeriodType, Subject};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

pub const SUBJECT_TAG: &str = "subject";

/// Time resolution of bucket keys. Every key format sorts in date order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// `YYYY-MM-DD`
    Day,
    /// Monday of the week, `YYYY-MM-DD`
    Week,
    /// `YYYY-Www`
    IsoWeek,
    /// `YYYY-MM`
    Month,
}

impl Granularity {
    pub fn bucket_key(self, date: NaiveDate) -> String {
        match self {
            Granularity::Day => date_key(date),
            Granularity::Week => date_key(week_start(date)),
            Granularity::IsoWeek => week_label(date),
            Granularity::Month => date.format("%Y-%m").to_string(),
        }
    }
}

impl From<PeriodType> for Granularity {
    fn from(period: PeriodType) -> Self {
        match period {
            PeriodType::Weekly => Granularity::Week,
            PeriodType::Monthly => Granularity::Month,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub granularity: Granularity,
    pub category_tag: Option<String>,
    pub sum_fields: Vec<String>,
    /// Tag whose distinct values are counted per bucket (e.g. post key).
    pub identity_tag: Option<String>,
}

impl GroupSpec {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            category_tag: None,
            sum_fields: Vec::new(),
            identity_tag: None,
        }
    }

    pub fn by_tag(mut self, tag: &str) -> Self {
        self.category_tag = Some(tag.to_string());
        self
    }

    pub fn sum(mut self, fields: &[&str]) -> Self {
        self.sum_fields.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn distinct_by(mut self, tag: &str) -> Self {
        self.identity_tag = Some(tag.to_string());
        self
    }
}

pub fn filter_records<P>(records: Vec<DatedRecord>, predicate: P) -> Vec<DatedRecord>
where
    P: Fn(&DatedRecord) -> bool,
{
    records.into_iter().filter(|record| predicate(record)).collect()
}

pub fn tag_equals<'a>(tag: &'a str, value: &'a str) -> impl Fn(&DatedRecord) -> bool + 'a {
    move |record| record.tags.get(tag).is_some_and(|v| v == value)
}

pub fn tag_contains<'a>(tag: &'a str, needle: &'a str) -> impl Fn(&DatedRecord) -> bool + 'a {
    move |record| {
        !needle.is_empty() && record.tags.get(tag).is_some_and(|v| v.contains(needle))
    }
}

/// `All` keeps every record; other subjects need an exact subject key tag.
pub fn subject_matches(subject: Subject) -> impl Fn(&DatedRecord) -> bool {
    move |record| {
        subject == Subject::All
            || record
                .tags
                .get(SUBJECT_TAG)
                .is_some_and(|v| v == subject.key())
    }
}

/// Buckets records by `(key, category)`, sorted ascending.
///
/// Records without a parseable date are skipped with a warning; the rest of
/// the batch still counts.
pub fn group_records(records: &[DatedRecord], spec: &GroupSpec) -> Vec<Bucket> {
    let mut groups: BTreeMap<(String, Option<String>), (Bucket, BTreeSet<String>)> =
        BTreeMap::new();

    for record in records {
        let Some(date) = parse_date(&record.date) else {
            warn!(date = %record.date, "dropping record with unparseable date");
            continue;
        };
        let key = spec.granularity.bucket_key(date);
        let category = spec
            .category_tag
            .as_ref()
            .and_then(|tag| record.tags.get(tag).cloned());

        let (bucket, members) = groups
            .entry((key.clone(), category.clone()))
            .or_insert_with(|| {
                let sums = spec.sum_fields.iter().map(|f| (f.clone(), 0.0)).collect();
                let bucket = Bucket {
                    key,
                    category,
                    sums,
                    count: 0,
                    distinct: 0,
                };
                (bucket, BTreeSet::new())
            });

        for field in &spec.sum_fields {
            if let Some(sum) = bucket.sums.get_mut(field) {
                *sum += record.metric_value(field);
            }
        }
        bucket.count += 1;
        if let Some(value) = spec.identity_tag.as_ref().and_then(|tag| record.tags.get(tag)) {
            members.insert(value.clone());
        }
    }

    groups
        .into_values()
        .map(|(mut bucket, members)| {
            bucket.distinct = if spec.identity_tag.is_some() {
                members.len()
            } else {
                bucket.count
            };
            bucket
        })
        .collect()
}

/// Compares the two most recent bucket keys. Buckets sharing a key are
/// summed across categories.
pub fn delta(buckets: &[Bucket], metric: &str) -> KpiResult {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for bucket in buckets {
        *totals.entry(bucket.key.as_str()).or_insert(0.0) += bucket.sum(metric);
    }

    let mut recent = totals.values().rev();
    let Some(&current) = recent.next() else {
        return KpiResult {
            value: 0.0,
            delta_percent: 0,
        };
    };
    let previous = recent.next().copied().unwrap_or(0.0);

    KpiResult {
        value: current,
        delta_percent: percent_change(current, previous),
    }
}

/// Whole-percent change, 0 when `previous` is 0.
pub fn percent_change(current: f64, previous: f64) -> i64 {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        return 0;
    }
    round_half_up((current - previous) / previous * 100.0) as i64
}

pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Half-up rounding to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(places);
    round_half_up(value * factor) / factor
}

/// `numerator / denominator * 100`, or 0 for an empty denominator.
pub fn ratio_percent(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}

/// Sum of `metric` over records dated in `[start, end)`.
pub fn sum_window(records: &[DatedRecord], metric: &str, start: NaiveDate, end: NaiveDate) -> f64 {
    records
        .iter()
        .filter(|record| {
            parse_date(&record.date).is_some_and(|date| date >= start && date < end)
        })
        .map(|record| record.metric_value(metric))
        .sum()
}

/// Reads the leading `YYYY-MM-DD` of an ISO date or timestamp.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn week_label(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}
