use crate::{DashboardParams, DashboardResponse, QueryStatus};
use html_escape::{encode_double_quoted_attribute, encode_text};
use jobrec_core::RankedResult;

const TITLE: &str = "Personalized Job Recommendation System";
const DASHBOARD_TITLE: &str = "Job Market Dashboard";

fn page(query: &str, rows: usize, body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{TITLE}</title></head><body>\n\
         <h1>{TITLE}</h1>\n\
         <p>Enter your desired job title or description to get recommendations!</p>\n\
         <p class=\"status\">Catalog loaded with {rows} postings. <a href=\"/dashboard\">Job market dashboard</a></p>\n\
         <form method=\"get\" action=\"/\"><label>Job Title/Description: \
         <input type=\"text\" name=\"q\" value=\"{}\"></label> <button type=\"submit\">Recommend</button></form>\n\
         {body}</body></html>\n",
        encode_double_quoted_attribute(query)
    )
}

pub(crate) fn render_index(query: &str, rows: usize, status: QueryStatus, results: &RankedResult) -> String {
    let body = match status {
        QueryStatus::AwaitingQuery => {
            "<p>Please enter a job title or description to get recommendations.</p>\n".to_string()
        }
        QueryStatus::NoResults => "<p>No recommendations found. Please try a different input.</p>\n".to_string(),
        QueryStatus::Ok => {
            let mut out = String::from("<h2>Top Recommendations</h2>\n<ol>\n");
            for r in results.iter() {
                let rate = r.hourly_rate.map(|v| format!("${v:.2}")).unwrap_or_else(|| "n/a".into());
                out.push_str(&format!(
                    "<li><strong>{}</strong><br>Category: {}<br>Location: {}<br>Hourly Rate: {}<br>\
                     Match: {:.3}<br><a href=\"{}\">Job Link</a></li>\n",
                    encode_text(&r.title),
                    encode_text(&r.category),
                    encode_text(&r.country),
                    encode_text(&rate),
                    r.score,
                    encode_double_quoted_attribute(&r.link),
                ));
            }
            out.push_str("</ol>\n");
            out
        }
    };
    page(query, rows, &body)
}

pub(crate) fn render_error(query: &str, rows: usize, message: &str) -> String {
    let body = format!("<p class=\"error\">Could not compute recommendations: {}</p>\n", encode_text(message));
    page(query, rows, &body)
}

fn dashboard_shell(form: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{DASHBOARD_TITLE}</title></head><body>\n\
         <h1>{DASHBOARD_TITLE}</h1>\n\
         <p><a href=\"/\">Back to recommendations</a></p>\n\
         {form}{body}</body></html>\n"
    )
}

fn attr(value: &Option<String>) -> String {
    encode_double_quoted_attribute(value.as_deref().unwrap_or_default()).into_owned()
}

/// Filter form that submits back to the page. Lists are comma-separated,
/// matching the query parameters of the JSON route.
fn filter_form(params: &DashboardParams, view: Option<&DashboardResponse>) -> String {
    let empty: &[String] = &[];
    let categories = view.map_or(empty, |v| v.categories.as_slice());
    let countries = view.map_or(empty, |v| v.countries.as_slice());
    let (min, max) = view
        .and_then(|v| v.date_range.as_ref())
        .map_or(("", ""), |r| (r.start.as_str(), r.end.as_str()));
    format!(
        "<h2>Filters</h2>\n<form method=\"get\" action=\"/dashboard\">\n\
         <label>Categories: <input type=\"text\" name=\"categories\" value=\"{}\"></label> <small>{}</small><br>\n\
         <label>Countries: <input type=\"text\" name=\"countries\" value=\"{}\"></label> <small>{}</small><br>\n\
         <label>From: <input type=\"date\" name=\"start\" value=\"{}\" min=\"{min}\" max=\"{max}\"></label>\n\
         <label>To: <input type=\"date\" name=\"end\" value=\"{}\" min=\"{min}\" max=\"{max}\"></label>\n\
         <button type=\"submit\">Apply</button></form>\n",
        attr(&params.categories),
        encode_text(&categories.join(", ")),
        attr(&params.countries),
        encode_text(&countries.join(", ")),
        attr(&params.start),
        attr(&params.end),
    )
}

/// Export URL carrying the same selection as the page.
fn export_href(params: &DashboardParams) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in [
        ("categories", &params.categories),
        ("countries", &params.countries),
        ("start", &params.start),
        ("end", &params.end),
    ] {
        if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            query.append_pair(name, v);
        }
    }
    let query = query.finish();
    if query.is_empty() {
        "/api/dashboard/export".to_string()
    } else {
        format!("/api/dashboard/export?{query}")
    }
}

fn table(caption: &str, headers: &[&str], rows: impl IntoIterator<Item = Vec<String>>) -> String {
    let mut out = format!("<h2>{caption}</h2>\n<table>\n<tr>");
    for h in headers {
        out.push_str(&format!("<th>{h}</th>"));
    }
    out.push_str("</tr>\n");
    let mut empty = true;
    for row in rows {
        empty = false;
        out.push_str("<tr>");
        for cell in row {
            out.push_str(&format!("<td>{}</td>", encode_text(&cell)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
    if empty {
        out.push_str("<p>No data for this selection.</p>\n");
    }
    out
}

fn dollars(rate: f64) -> String {
    format!("${rate:.2}")
}

pub(crate) fn render_dashboard(params: &DashboardParams, view: &DashboardResponse) -> String {
    let insights = &view.insights;
    let mut body = format!(
        "<h2>Key Insights</h2>\n<ul>\n\
         <li>Total Job Postings: {}</li>\n\
         <li>Average Hourly Rate: {}</li>\n\
         <li>Most Popular Category: {}</li>\n</ul>\n",
        insights.total_jobs,
        dollars(insights.average_hourly_rate),
        encode_text(insights.top_category.as_deref().unwrap_or("N/A")),
    );
    body.push_str(&table(
        "Job Posting Trends",
        &["Month", "Postings"],
        view.job_trend.iter().map(|m| vec![m.month.clone(), m.postings.to_string()]),
    ));
    body.push_str(&table(
        "Average Hourly Rate Over Time",
        &["Month", "Average Hourly Rate"],
        view.rate_trend.iter().map(|m| vec![m.month.clone(), dollars(m.average_hourly_rate)]),
    ));
    body.push_str(&table(
        "Job Categories Over Time",
        &["Month", "Category", "Postings"],
        view.category_trend
            .iter()
            .map(|c| vec![c.month.clone(), c.category.clone(), c.postings.to_string()]),
    ));
    body.push_str(&table(
        "Average Hourly Rate by Country",
        &["Country", "Average Hourly Rate"],
        view.country_rates.iter().map(|c| vec![c.country.clone(), dollars(c.average_hourly_rate)]),
    ));
    body.push_str(&format!(
        "<p><a href=\"{}\">Download Filtered Data as CSV</a></p>\n",
        encode_double_quoted_attribute(&export_href(params))
    ));
    dashboard_shell(&filter_form(params, Some(view)), &body)
}

pub(crate) fn render_dashboard_error(params: &DashboardParams, message: &str) -> String {
    let body = format!("<p class=\"error\">Invalid filter: {}</p>\n", encode_text(message));
    dashboard_shell(&filter_form(params, None), &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DateRange;
    use jobrec_core::analytics::{CountryRate, KeyInsights, MonthlyCount};
    use jobrec_core::Recommendation;

    fn view() -> DashboardResponse {
        DashboardResponse {
            categories: vec!["Dev".into(), "R&D".into()],
            countries: vec!["France".into()],
            date_range: Some(DateRange { start: "2024-01-10".into(), end: "2024-02-05".into() }),
            insights: KeyInsights { total_jobs: 3, average_hourly_rate: 41.666, top_category: None },
            job_trend: vec![MonthlyCount { month: "2024-01".into(), postings: 3 }],
            rate_trend: vec![],
            category_trend: vec![],
            country_rates: vec![CountryRate { country: "France".into(), average_hourly_rate: 41.666 }],
        }
    }

    #[test]
    fn dashboard_shows_insights_and_tables() {
        let html = render_dashboard(&DashboardParams::default(), &view());
        assert!(html.contains("Total Job Postings: 3"));
        assert!(html.contains("Average Hourly Rate: $41.67"));
        assert!(html.contains("Most Popular Category: N/A"));
        assert!(html.contains("<td>2024-01</td><td>3</td>"));
        assert!(html.contains("R&amp;D"));
        assert!(html.contains("No data for this selection."));
        assert!(html.contains("min=\"2024-01-10\" max=\"2024-02-05\""));
        assert!(html.contains("<a href=\"/api/dashboard/export\">Download Filtered Data as CSV</a>"));
    }

    #[test]
    fn export_link_keeps_the_selection() {
        let params = DashboardParams {
            categories: Some("R&D, Dev".into()),
            countries: Some("  ".into()),
            start: Some("2024-01-01".into()),
            end: None,
        };
        assert_eq!(export_href(&params), "/api/dashboard/export?categories=R%26D%2C+Dev&start=2024-01-01");
        let html = render_dashboard(&params, &view());
        assert!(html.contains("href=\"/api/dashboard/export?categories=R%26D%2C+Dev&amp;start=2024-01-01\""));
        assert!(html.contains("value=\"R&amp;D, Dev\""));
    }

    #[test]
    fn escapes_catalog_text() {
        let results = RankedResult {
            items: vec![Recommendation {
                row: 0,
                title: "<script>alert(1)</script>".into(),
                category: "Dev".into(),
                country: "France".into(),
                hourly_rate: Some(12.5),
                link: "https://example.com/?a=1&b=\"2\"".into(),
                score: 0.5,
            }],
        };
        let html = render_index("rust", 1, QueryStatus::Ok, &results);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("$12.50"));
    }

    #[test]
    fn blank_query_prompts_for_input() {
        let html = render_index("", 3, QueryStatus::AwaitingQuery, &RankedResult::default());
        assert!(html.contains("Please enter a job title"));
        assert!(html.contains("3 postings"));
    }
}
