//! Aggregations behind the job market dashboard: filtering, headline
//! figures, monthly trends, per-country rates and CSV export.

use crate::catalog::{Catalog, Posting, COLUMNS};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use time::{Date, OffsetDateTime};

/// Dashboard selection. Empty lists select everything; date bounds are
/// inclusive calendar days in UTC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardFilter {
    pub categories: Vec<String>,
    pub countries: Vec<String>,
    pub start: Option<Date>,
    pub end: Option<Date>,
}

impl DashboardFilter {
    pub fn matches(&self, posting: &Posting) -> bool {
        if !self.categories.is_empty() && !self.categories.contains(&posting.category) {
            return false;
        }
        if !self.countries.is_empty() && !self.countries.contains(&posting.country) {
            return false;
        }
        if self.start.is_none() && self.end.is_none() {
            return true;
        }
        // A date bound is in force, so undated postings cannot satisfy it.
        let Some(day) = posting.published.map(utc_date) else {
            return false;
        };
        self.start.map_or(true, |s| day >= s) && self.end.map_or(true, |e| day <= e)
    }
}

/// Matching rows, including postings that are not ranked for lack of a
/// description.
pub fn filter<'a>(catalog: &'a Catalog, filter: &DashboardFilter) -> Vec<&'a Posting> {
    catalog.all_postings().iter().filter(|p| filter.matches(p)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyInsights {
    pub total_jobs: usize,
    pub average_hourly_rate: f64,
    pub top_category: Option<String>,
}

pub fn key_insights(postings: &[&Posting]) -> KeyInsights {
    KeyInsights {
        total_jobs: postings.len(),
        average_hourly_rate: mean(postings.iter().filter_map(|p| p.hourly_rate)).unwrap_or(0.0),
        top_category: top_category(postings),
    }
}

/// Most frequent category; on a tie the one seen first wins.
fn top_category(postings: &[&Posting]) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (i, p) in postings.iter().enumerate() {
        counts.entry(p.category.as_str()).or_insert((0, i)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, fa)), (_, (cb, fb))| ca.cmp(cb).then(fb.cmp(fa)))
        .map(|(category, _)| category.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCount {
    pub month: String,
    pub postings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRate {
    pub month: String,
    pub average_hourly_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMonthCount {
    pub month: String,
    pub category: String,
    pub postings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryRate {
    pub country: String,
    pub average_hourly_rate: f64,
}

pub fn monthly_postings(postings: &[&Posting]) -> Vec<MonthlyCount> {
    let mut by_month: BTreeMap<String, usize> = BTreeMap::new();
    for p in postings {
        if let Some(month) = p.published.map(year_month) {
            *by_month.entry(month).or_insert(0) += 1;
        }
    }
    by_month.into_iter().map(|(month, postings)| MonthlyCount { month, postings }).collect()
}

/// Months with no rated postings are left out.
pub fn monthly_hourly_rate(postings: &[&Posting]) -> Vec<MonthlyRate> {
    let mut by_month: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for p in postings {
        if let (Some(month), Some(rate)) = (p.published.map(year_month), p.hourly_rate) {
            by_month.entry(month).or_default().push(rate);
        }
    }
    by_month
        .into_iter()
        .filter_map(|(month, rates)| {
            mean(rates).map(|average_hourly_rate| MonthlyRate { month, average_hourly_rate })
        })
        .collect()
}

pub fn category_trend(postings: &[&Posting]) -> Vec<CategoryMonthCount> {
    let mut counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    for p in postings {
        if let Some(month) = p.published.map(year_month) {
            *counts.entry((month, p.category.clone())).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .map(|((month, category), postings)| CategoryMonthCount { month, category, postings })
        .collect()
}

pub fn country_hourly_rate(postings: &[&Posting]) -> Vec<CountryRate> {
    let mut by_country: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for p in postings {
        if let Some(rate) = p.hourly_rate {
            by_country.entry(p.country.as_str()).or_default().push(rate);
        }
    }
    by_country
        .into_iter()
        .filter_map(|(country, rates)| {
            mean(rates).map(|average_hourly_rate| CountryRate { country: country.to_string(), average_hourly_rate })
        })
        .collect()
}

/// Distinct categories, sorted. These are the dashboard's category options.
pub fn categories(catalog: &Catalog) -> Vec<String> {
    distinct(catalog, |p| &p.category)
}

/// Distinct countries, sorted.
pub fn countries(catalog: &Catalog) -> Vec<String> {
    distinct(catalog, |p| &p.country)
}

fn distinct(catalog: &Catalog, field: impl Fn(&Posting) -> &String) -> Vec<String> {
    catalog.all_postings().iter().map(field).collect::<BTreeSet<_>>().into_iter().cloned().collect()
}

/// Earliest and latest publication day, the dashboard's default range.
pub fn date_range(catalog: &Catalog) -> Option<(Date, Date)> {
    let mut days = catalog.all_postings().iter().filter_map(|p| p.published.map(utc_date));
    let first = days.next()?;
    Some(days.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}

/// Write `postings` as CSV under the known input column names.
///
/// Only the columns in [`COLUMNS`] are written; any other input column was
/// not kept at load and does not appear. `published_date` comes out as
/// RFC 3339 and unparseable dates as empty cells.
pub fn write_csv<W: Write>(postings: &[&Posting], writer: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(COLUMNS)?;
    for p in postings {
        wtr.write_record(p.to_record())?;
    }
    wtr.flush()?;
    Ok(())
}

fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn utc_date(dt: OffsetDateTime) -> Date {
    dt.to_offset(time::UtcOffset::UTC).date()
}

fn year_month(dt: OffsetDateTime) -> String {
    let day = utc_date(dt);
    format!("{:04}-{:02}", day.year(), u8::from(day.month()))
}
