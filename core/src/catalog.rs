use crate::error::{RecommendError, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

/// Header names of the postings CSV, in export order.
pub const COLUMNS: [&str; 7] = [
    "Cleaned Job Title",
    "Category",
    "country",
    "average_hourly_rate",
    "link",
    "published_date",
    "job_description",
];

const DESCRIPTION_COLUMN: &str = "job_description";

/// One job listing. Identity is its row position in the [`Catalog`].
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub title: String,
    pub category: String,
    pub country: String,
    pub hourly_rate: Option<f64>,
    pub description: String,
    pub link: String,
    pub published: Option<OffsetDateTime>,
}

impl Posting {
    /// Convenience constructor for postings that only carry text.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: String::new(),
            country: String::new(),
            hourly_rate: None,
            description: description.into(),
            link: String::new(),
            published: None,
        }
    }

    /// Export row in [`COLUMNS`] order. The date is written as RFC 3339,
    /// whatever form it was read in.
    pub(crate) fn to_record(&self) -> [String; 7] {
        [
            self.title.clone(),
            self.category.clone(),
            self.country.clone(),
            self.hourly_rate.map(|r| r.to_string()).unwrap_or_default(),
            self.link.clone(),
            self.published
                .and_then(|p| p.format(&Rfc3339).ok())
                .unwrap_or_default(),
            self.description.clone(),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(rename = "Cleaned Job Title", default)]
    title: Option<String>,
    #[serde(rename = "Category", default)]
    category: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(rename = "average_hourly_rate", default)]
    hourly_rate: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(rename = "published_date", default)]
    published: Option<String>,
    #[serde(rename = "job_description", default)]
    description: Option<String>,
}

/// Postings in load order.
///
/// Every parsed row is kept for the dashboard, but only postings with a
/// non-blank description are ranked. Row numbers used by [`Catalog::get`],
/// [`Catalog::iter`] and the document matrix count ranked postings only.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    rows: Vec<Posting>,
    ranked: Vec<usize>,
}

impl Catalog {
    pub fn from_postings(rows: Vec<Posting>) -> Self {
        let ranked = rows
            .iter()
            .enumerate()
            .filter(|(_, p)| has_description(p))
            .map(|(i, _)| i)
            .collect();
        Self { rows, ranked }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| RecommendError::data_load(path, e))?;
        let catalog = Self::from_reader(file, path)?;
        tracing::info!(path = %path.display(), rows = catalog.len(), skipped = catalog.skipped(), "catalog loaded");
        Ok(catalog)
    }

    /// Parse delimited text. `source` is only used to label errors.
    pub fn from_reader<R: Read>(reader: R, source: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);
        let headers = rdr.headers().map_err(|e| RecommendError::data_load(source, e))?;
        if !headers.iter().any(|h| h == DESCRIPTION_COLUMN) {
            return Err(RecommendError::data_load(
                source,
                format!("missing required column {DESCRIPTION_COLUMN:?}"),
            ));
        }

        let mut rows = Vec::new();
        for (line, row) in rdr.deserialize::<CatalogRow>().enumerate() {
            let row = row.map_err(|e| RecommendError::data_load(source, format!("row {}: {e}", line + 2)))?;
            rows.push(posting_from_row(row));
        }
        let catalog = Self::from_postings(rows);
        if catalog.skipped() > 0 {
            tracing::warn!(skipped = catalog.skipped(), "postings without a description will not be ranked");
        }
        Ok(catalog)
    }

    /// Number of ranked postings.
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Ranked posting at `row`.
    pub fn get(&self, row: usize) -> Option<&Posting> {
        self.ranked.get(row).and_then(|&i| self.rows.get(i))
    }

    /// Ranked postings in row order.
    pub fn iter(&self) -> impl Iterator<Item = &Posting> + '_ {
        self.ranked.iter().filter_map(|&i| self.rows.get(i))
    }

    /// Every loaded row, including those without a description.
    pub fn all_postings(&self) -> &[Posting] {
        &self.rows
    }

    /// Rows left out of ranking for lacking a description.
    pub fn skipped(&self) -> usize {
        self.rows.len() - self.ranked.len()
    }
}

fn has_description(posting: &Posting) -> bool {
    !posting.description.trim().is_empty()
}

fn posting_from_row(row: CatalogRow) -> Posting {
    Posting {
        title: row.title.unwrap_or_default(),
        category: row.category.unwrap_or_default(),
        country: row.country.unwrap_or_default(),
        hourly_rate: row.hourly_rate.as_deref().and_then(parse_rate),
        description: row.description.unwrap_or_default(),
        link: row.link.unwrap_or_default(),
        published: row.published.as_deref().and_then(|raw| {
            let parsed = parse_published(raw);
            if parsed.is_none() {
                tracing::debug!(raw, "unparseable published_date");
            }
            parsed
        }),
    }
}

fn parse_rate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|r| r.is_finite() && *r >= 0.0)
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` with or without a `+HH:MM`
/// offset, and bare dates. Offset-less values are taken as UTC.
pub fn parse_published(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(dt);
    }
    let with_offset =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]");
    if let Ok(dt) = OffsetDateTime::parse(raw, &with_offset) {
        return Some(dt);
    }
    let naive_formats = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ];
    for format in naive_formats {
        if let Ok(dt) = PrimitiveDateTime::parse(raw, &format) {
            return Some(dt.assume_utc());
        }
    }
    parse_date(raw).map(|d| d.midnight().assume_utc())
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), &format_description!("[year]-[month]-[day]")).ok()
}
