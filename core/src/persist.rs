use crate::error::{RecommendError, Result};
use crate::vectorizer::VectorModel;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Bumped whenever the serialized layout of [`VectorModel`] changes.
pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ModelEnvelopeRef<'a> {
    version: u32,
    created_at: String,
    model: &'a VectorModel,
}

#[derive(Deserialize)]
struct ModelEnvelope {
    version: u32,
    created_at: String,
    model: VectorModel,
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "".into())
}

/// Write the model as a single blob. The bytes land in a sibling temp file
/// first and are renamed over `path`, so readers never observe a torn write.
pub fn save_model<P: AsRef<Path>>(path: P, model: &VectorModel) -> Result<()> {
    let path = path.as_ref();
    let fail = |e: &dyn std::fmt::Display| RecommendError::model_save(path, e);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).map_err(|e| fail(&e))?;
    }
    let envelope = ModelEnvelopeRef { version: MODEL_FORMAT_VERSION, created_at: now_rfc3339(), model };
    let bytes = bincode::serialize(&envelope).map_err(|e| fail(&e))?;

    let tmp = temp_path(path);
    let mut f = File::create(&tmp).map_err(|e| fail(&e))?;
    f.write_all(&bytes).map_err(|e| fail(&e))?;
    f.sync_all().map_err(|e| fail(&e))?;
    drop(f);
    std::fs::rename(&tmp, path).map_err(|e| fail(&e))?;

    tracing::info!(path = %path.display(), bytes = bytes.len(), vocabulary_size = model.vocabulary_size(), "model saved");
    Ok(())
}

pub fn load_model<P: AsRef<Path>>(path: P) -> Result<VectorModel> {
    let path = path.as_ref();
    let mut f = File::open(path).map_err(|e| RecommendError::model_load(path, e))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).map_err(|e| RecommendError::model_load(path, e))?;

    let envelope: ModelEnvelope = bincode::deserialize(&buf).map_err(|e| RecommendError::model_load(path, e))?;
    if envelope.version != MODEL_FORMAT_VERSION {
        return Err(RecommendError::model_load(
            path,
            format!("unsupported model format version {} (expected {MODEL_FORMAT_VERSION})", envelope.version),
        ));
    }
    envelope.model.validate().map_err(|reason| RecommendError::model_load(path, reason))?;

    tracing::info!(
        path = %path.display(),
        created_at = %envelope.created_at,
        vocabulary_size = envelope.model.vocabulary_size(),
        "model loaded"
    );
    Ok(envelope.model)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// One line of the training experiment log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment: String,
    pub run_id: String,
    pub started_at: String,
    pub num_job_listings: usize,
    pub vocabulary_size: usize,
    pub max_features: Option<usize>,
    pub model_path: String,
}

impl ExperimentRecord {
    pub fn new(experiment: impl Into<String>, num_job_listings: usize, model: &VectorModel, model_path: &Path) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            experiment: experiment.into(),
            run_id: format!("{:x}", now.unix_timestamp_nanos()),
            started_at: now.format(&Rfc3339).unwrap_or_default(),
            num_job_listings,
            vocabulary_size: model.vocabulary_size(),
            max_features: model.config().max_features,
            model_path: model_path.display().to_string(),
        }
    }
}

/// Append `record` as a JSON line, creating the log if needed.
pub fn append_experiment<P: AsRef<Path>>(path: P, record: &ExperimentRecord) -> Result<()> {
    let path = path.as_ref();
    let fail = |source: std::io::Error| RecommendError::ExperimentLog { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).map_err(fail)?;
    }
    let mut line = serde_json::to_string(record).map_err(|e| fail(e.into()))?;
    line.push('\n');
    let mut f = OpenOptions::new().create(true).append(true).open(path).map_err(fail)?;
    f.write_all(line.as_bytes()).map_err(fail)?;
    tracing::info!(path = %path.display(), run_id = %record.run_id, "experiment logged");
    Ok(())
}

pub fn load_experiments<P: AsRef<Path>>(path: P) -> Result<Vec<ExperimentRecord>> {
    let path = path.as_ref();
    let fail = |source: std::io::Error| RecommendError::ExperimentLog { path: path.to_path_buf(), source };

    let reader = BufReader::new(File::open(path).map_err(fail)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(fail)?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line).map_err(|e| fail(e.into()))?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorizer::TfidfConfig;
    use tempfile::tempdir;

    fn model() -> VectorModel {
        VectorModel::fit(TfidfConfig::default(), &["rust backend", "coffee bar"]).unwrap()
    }

    #[test]
    fn save_then_load_preserves_encoding() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("models/tfidf.bin");
        let model = model();
        save_model(&path, &model).unwrap();
        assert!(!temp_path(&path).exists());

        let loaded = load_model(&path).unwrap();
        assert_eq!(loaded.transform("rust").unwrap(), model.transform("rust").unwrap());
    }

    #[test]
    fn missing_or_garbage_blob_is_a_model_load_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.bin");
        assert!(matches!(load_model(&missing), Err(RecommendError::ModelLoad { .. })));

        let garbage = dir.path().join("garbage.bin");
        std::fs::write(&garbage, b"not a model").unwrap();
        assert!(matches!(load_model(&garbage), Err(RecommendError::ModelLoad { .. })));
    }

    #[test]
    fn unknown_format_version_is_a_model_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tfidf.bin");
        save_model(&path, &model()).unwrap();

        // The envelope starts with the version as a little-endian u32.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[..4].copy_from_slice(&(MODEL_FORMAT_VERSION + 1).to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let err = load_model(&path).unwrap_err();
        assert!(matches!(err, RecommendError::ModelLoad { .. }));
        assert!(err.to_string().contains("unsupported model format version 2"));
    }

    #[test]
    fn inconsistent_model_is_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tfidf.bin");
        let mut model = model();
        model.idf.pop();
        save_model(&path, &model).unwrap();

        let err = load_model(&path).unwrap_err();
        assert!(matches!(err, RecommendError::ModelLoad { .. }));
        assert!(err.to_string().contains("idf table"));
    }

    #[test]
    fn unwritable_target_is_a_model_save_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("models");
        std::fs::write(&blocker, b"a file, not a directory").unwrap();

        let err = save_model(blocker.join("tfidf.bin"), &model()).unwrap_err();
        assert!(matches!(err, RecommendError::ModelSave { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn experiments_append_one_line_each() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("experiments.jsonl");
        let model = model();
        let first = ExperimentRecord::new("Job Recommendation System", 2, &model, Path::new("m.bin"));
        append_experiment(&log, &first).unwrap();
        append_experiment(&log, &first).unwrap();

        let records = load_experiments(&log).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], first);
        assert_eq!(records[0].num_job_listings, 2);
    }
}
