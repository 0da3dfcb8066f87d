use jobrec_core::analytics::{self, DashboardFilter};
use jobrec_core::persist::{load_model, save_model};
use jobrec_core::{Catalog, Ranker, RecommendError, TfidfConfig, VectorModel};
use std::path::Path;
use tempfile::tempdir;

const CSV: &str = "\
job_description,Cleaned Job Title,Category,country,average_hourly_rate,link,published_date,budget
build scalable backend services,Backend Engineer,Dev,Germany,55.5,https://example.com/1,2024-02-17 09:09:54+00:00,100
,Ghost Posting,Dev,France,10,https://example.com/2,2024-02-18 09:09:54+00:00,
prepare coffee drinks,Barista,Hospitality,France,,https://example.com/3,not a date,
";

#[test]
fn loads_csv_and_ranks_only_rows_with_description() {
    let catalog = Catalog::from_reader(CSV.as_bytes(), Path::new("inline.csv")).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.skipped(), 1);
    assert_eq!(catalog.all_postings().len(), 3);
    assert_eq!(catalog.all_postings()[1].title, "Ghost Posting");

    let backend = catalog.get(0).unwrap();
    assert_eq!(backend.title, "Backend Engineer");
    assert_eq!(backend.hourly_rate, Some(55.5));
    assert!(backend.published.is_some());

    let barista = catalog.get(1).unwrap();
    assert_eq!(barista.hourly_rate, None);
    assert_eq!(barista.published, None);
}

#[test]
fn dashboard_counts_rows_without_description() {
    let csv = "job_description,Category,average_hourly_rate\nwrites rust,Dev,10\n,Dev,90\n";
    let catalog = Catalog::from_reader(csv.as_bytes(), Path::new("inline.csv")).unwrap();
    assert_eq!(catalog.len(), 1);

    let rows = analytics::filter(&catalog, &DashboardFilter::default());
    let insights = analytics::key_insights(&rows);
    assert_eq!(insights.total_jobs, 2);
    assert_eq!(insights.average_hourly_rate, 50.0);
}

#[test]
fn missing_description_column_is_a_data_load_error() {
    let csv = "Cleaned Job Title,country\nBarista,France\n";
    let err = Catalog::from_reader(csv.as_bytes(), Path::new("bad.csv")).unwrap_err();
    assert!(matches!(err, RecommendError::DataLoad { .. }));
    assert!(err.is_fatal());
}

#[test]
fn missing_file_is_a_data_load_error() {
    let err = Catalog::from_path("/definitely/not/here.csv").unwrap_err();
    assert!(matches!(err, RecommendError::DataLoad { .. }));
}

#[test]
fn ranker_loads_from_disk() {
    let dir = tempdir().unwrap();
    let catalog_path = dir.path().join("job_postings.csv");
    let model_path = dir.path().join("models/tfidf_vectorizer.bin");
    std::fs::write(&catalog_path, CSV).unwrap();

    let catalog = Catalog::from_path(&catalog_path).unwrap();
    let descriptions: Vec<&str> = catalog.iter().map(|p| p.description.as_str()).collect();
    let model = VectorModel::fit(TfidfConfig::default(), &descriptions).unwrap();
    save_model(&model_path, &model).unwrap();
    assert_eq!(load_model(&model_path).unwrap().vocabulary_size(), model.vocabulary_size());

    let ranker = Ranker::load(&catalog_path, &model_path).unwrap();
    assert_eq!(ranker.matrix().num_rows(), 2);
    let top = ranker.recommend("coffee", 1).unwrap();
    assert_eq!(top.items[0].title, "Barista");
    assert_eq!(top.items[0].link, "https://example.com/3");

    let err = Ranker::load(&catalog_path, dir.path().join("missing.bin")).unwrap_err();
    assert!(matches!(err, RecommendError::ModelLoad { .. }));
}
