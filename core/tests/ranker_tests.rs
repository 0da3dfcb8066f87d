use jobrec_core::{Catalog, Posting, Ranker, TfidfConfig, VectorModel};
use std::sync::Arc;

fn build(postings: Vec<Posting>) -> Ranker {
    let catalog = Catalog::from_postings(postings);
    let descriptions: Vec<&str> = catalog.iter().map(|p| p.description.as_str()).collect();
    let model = VectorModel::fit(TfidfConfig::default(), &descriptions).unwrap();
    Ranker::new(Arc::new(catalog), Arc::new(model)).unwrap()
}

fn job_board() -> Ranker {
    build(vec![
        Posting::new("Backend Engineer", "build scalable backend services in distributed systems"),
        Posting::new("Barista", "prepare coffee drinks for customers"),
        Posting::new("Data Scientist", "train machine learning models on large data sets"),
        Posting::new("Data Engineer", "build data pipelines and distributed storage systems"),
        Posting::new("Pastry Chef", "bake bread and prepare desserts for customers"),
    ])
}

#[test]
fn distributed_backend_query_prefers_backend_engineer() {
    let ranker = build(vec![
        Posting::new("Backend Engineer", "build scalable backend services in distributed systems"),
        Posting::new("Barista", "prepare coffee drinks for customers"),
    ]);
    let top = ranker.recommend("distributed backend systems", 1).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top.items[0].title, "Backend Engineer");
    assert!(top.items[0].score > 0.0);

    let all = ranker.recommend("distributed backend systems", 2).unwrap();
    assert_eq!(all.items[1].title, "Barista");
    assert_eq!(all.items[1].score, 0.0);
}

#[test]
fn results_are_bounded_and_sorted() {
    let ranker = job_board();
    for k in 1..=7 {
        let result = ranker.recommend("build distributed data systems", k).unwrap();
        assert_eq!(result.len(), k.min(5));
        for pair in result.items.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(result.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }
}

#[test]
fn blank_query_returns_catalog_order_with_zero_scores() {
    let ranker = job_board();
    for query in ["", "   \t", "the and of", "kubernetes"] {
        let result = ranker.recommend(query, 3).unwrap();
        let titles: Vec<&str> = result.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Backend Engineer", "Barista", "Data Scientist"]);
        assert!(result.iter().all(|r| r.score == 0.0));
        let rows: Vec<usize> = result.iter().map(|r| r.row).collect();
        assert_eq!(rows, [0, 1, 2]);
    }
}

#[test]
fn exact_description_scores_one() {
    let ranker = job_board();
    let result = ranker.recommend("train machine learning models on large data sets", 5).unwrap();
    assert_eq!(result.items[0].title, "Data Scientist");
    assert!((result.items[0].score - 1.0).abs() < 1e-5);
    assert!(result.items[1].score < result.items[0].score);
}

#[test]
fn ties_keep_catalog_order() {
    let ranker = build(vec![
        Posting::new("Barista", "prepare coffee drinks"),
        Posting::new("Rust Developer (Berlin)", "rust developer"),
        Posting::new("Rust Developer (Remote)", "rust developer"),
    ]);
    let result = ranker.recommend("rust", 3).unwrap();
    let rows: Vec<usize> = result.iter().map(|r| r.row).collect();
    assert_eq!(rows, [1, 2, 0]);
    assert_eq!(result.items[0].score, result.items[1].score);
}

#[test]
fn repeated_calls_are_identical() {
    let ranker = job_board();
    let a = ranker.recommend("data pipelines", 4).unwrap();
    let b = ranker.recommend("data pipelines", 4).unwrap();
    assert_eq!(a, b);

    let model = ranker.model();
    assert_eq!(model.transform("data pipelines").unwrap(), model.transform("data pipelines").unwrap());
}

#[test]
fn empty_catalog_gives_empty_result() {
    let model = VectorModel::fit(TfidfConfig::default(), &["rust developer"]).unwrap();
    let ranker = Ranker::new(Arc::new(Catalog::default()), Arc::new(model)).unwrap();
    let result = ranker.recommend("rust", 5).unwrap();
    assert!(result.is_empty());
}

#[test]
fn ranker_is_shareable_across_threads() {
    let ranker = Arc::new(job_board());
    let expected = ranker.recommend("coffee", 2).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ranker = Arc::clone(&ranker);
            std::thread::spawn(move || ranker.recommend("coffee", 2).unwrap())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), expected);
    }
}
