use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobrec_core::persist::{append_experiment, load_experiments, save_model, ExperimentRecord};
use jobrec_core::{Catalog, DocumentMatrix, RankedResult, Ranker, TfidfConfig, VectorModel, DEFAULT_K};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

const EXPERIMENT_NAME: &str = "Job Recommendation System";

#[derive(Parser)]
#[command(name = "trainer")]
#[command(about = "Fit and inspect the TF-IDF job recommendation model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the vectorizer on the catalog's descriptions and persist it
    Train {
        /// Postings CSV
        #[arg(long, default_value = "data/job_postings.csv")]
        catalog: PathBuf,
        /// Output model blob
        #[arg(long, default_value = "models/tfidf_vectorizer.bin")]
        model: PathBuf,
        /// Vocabulary cap; 0 keeps every term
        #[arg(long, default_value_t = 5000)]
        max_features: usize,
        /// Use 1 + ln(tf) term weighting
        #[arg(long, default_value_t = false)]
        sublinear_tf: bool,
        /// Use ln(n/df) + 1 instead of the smoothed IDF
        #[arg(long, default_value_t = false)]
        raw_idf: bool,
        /// Experiment log (JSON lines)
        #[arg(long, default_value = "models/experiments.jsonl")]
        experiments: PathBuf,
        /// Query to run against the fresh model as a smoke test; an empty
        /// string skips it
        #[arg(long, default_value = "data scientist")]
        sample_query: String,
    },
    /// Rank the catalog against a query using a persisted model
    Recommend {
        #[arg(long, default_value = "data/job_postings.csv")]
        catalog: PathBuf,
        #[arg(long, default_value = "models/tfidf_vectorizer.bin")]
        model: PathBuf,
        #[arg(long)]
        query: String,
        #[arg(short, long, default_value_t = DEFAULT_K)]
        k: usize,
    },
    /// Print the experiment log
    History {
        #[arg(long, default_value = "models/experiments.jsonl")]
        experiments: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Train { catalog, model, max_features, sublinear_tf, raw_idf, experiments, sample_query } => {
            let config = TfidfConfig {
                max_features: (max_features > 0).then_some(max_features),
                sublinear_tf,
                smooth_idf: !raw_idf,
            };
            let ranker = train(&catalog, &model, config, &experiments)?;
            if !sample_query.trim().is_empty() {
                print_results(&sample_query, &ranker.recommend(&sample_query, DEFAULT_K)?);
            }
            Ok(())
        }
        Commands::Recommend { catalog, model, query, k } => {
            let ranker = Ranker::load(&catalog, &model)?;
            print_results(&query, &ranker.recommend(&query, k)?);
            Ok(())
        }
        Commands::History { experiments } => {
            for record in load_experiments(&experiments)? {
                println!("{}", serde_json::to_string(&record)?);
            }
            Ok(())
        }
    }
}

/// Fit on the catalog, persist the model and log the run. The returned
/// ranker reuses the training matrix instead of re-encoding the catalog.
fn train(catalog_path: &Path, model_path: &Path, config: TfidfConfig, experiments: &Path) -> Result<Ranker> {
    let catalog = Catalog::from_path(catalog_path)?;
    tracing::info!(rows = catalog.len(), skipped = catalog.skipped(), "catalog ready for training");

    let descriptions: Vec<&str> = catalog.iter().map(|p| p.description.as_str()).collect();
    let (model, rows) = VectorModel::fit_transform(config, &descriptions)
        .with_context(|| format!("fitting on {}", catalog_path.display()))?;
    let matrix = DocumentMatrix::from_rows(&model, rows);
    tracing::info!(rows = matrix.num_rows(), cols = matrix.num_cols(), nnz = matrix.nnz(), "tf-idf model trained");

    save_model(model_path, &model)?;
    let record = ExperimentRecord::new(EXPERIMENT_NAME, catalog.len(), &model, model_path);
    append_experiment(experiments, &record)?;

    Ok(Ranker::with_matrix(Arc::new(catalog), Arc::new(model), matrix)?)
}

fn print_results(query: &str, results: &RankedResult) {
    if results.is_empty() {
        println!("No recommendations for {query:?}.");
        return;
    }
    println!("Top recommendations for {query:?}:");
    for r in results.iter() {
        let rate = r.hourly_rate.map(|v| format!("${v:.2}/h")).unwrap_or_else(|| "n/a".into());
        println!("  {:.4}  {} | {} | {} | {} | {}", r.score, r.title, r.category, r.country, rate, r.link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobrec_core::persist::load_model;
    use tempfile::tempdir;

    fn sample_query(args: &[&str]) -> String {
        match Cli::try_parse_from(args).unwrap().command {
            Commands::Train { sample_query, .. } => sample_query,
            _ => panic!("expected the train subcommand"),
        }
    }

    #[test]
    fn sample_query_defaults_and_can_be_disabled() {
        assert_eq!(sample_query(&["trainer", "train"]), "data scientist");
        assert_eq!(sample_query(&["trainer", "train", "--sample-query", ""]), "");
        assert_eq!(sample_query(&["trainer", "train", "--sample-query", "barista"]), "barista");
    }

    #[test]
    fn train_writes_model_and_experiment() {
        let dir = tempdir().unwrap();
        let catalog = dir.path().join("job_postings.csv");
        std::fs::write(
            &catalog,
            "job_description,Cleaned Job Title\n\
             analyse data with python and statistics,Data Scientist\n\
             ,Empty\n\
             serve espresso to guests,Barista\n",
        )
        .unwrap();
        let model = dir.path().join("models/tfidf_vectorizer.bin");
        let log = dir.path().join("models/experiments.jsonl");

        let ranker = train(&catalog, &model, TfidfConfig::default(), &log).unwrap();
        assert_eq!(ranker.catalog().len(), 2);
        assert_eq!(ranker.recommend("data scientist", 1).unwrap().items[0].title, "Data Scientist");

        assert!(load_model(&model).is_ok());
        let history = load_experiments(&log).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].num_job_listings, 2);
        assert_eq!(history[0].experiment, EXPERIMENT_NAME);
    }
}
