//! Score loading from YAML or JSON files.
//!
//! The textual score language has its own parser; this module is the
//! structured-input path used by the CLI and by tests. A loaded score always
//! contains the built-in system grain and is validated before it is returned.
//!
//! ```no_run
//! use score_sync_db::load_score;
//!
//! let score = load_score("score.yml").unwrap();
//! for grain in score.ordered_grains() {
//!     println!("{} {}", grain.name, grain.version);
//! }
//! ```

use std::path::Path;

use score_sync_core::{Grain, Score, validate_score};
use serde::Deserialize;

use crate::error::{Result, SyncError};

#[derive(Deserialize)]
struct ScoreFile {
    grains: Vec<Grain>,
}

/// Loads a score file, choosing the format from its extension
/// (`.yml`/`.yaml` or `.json`).
///
/// # Errors
///
/// Returns [`SyncError::Config`] for an unknown extension,
/// [`SyncError::IoError`]/[`SyncError::YamlError`]/[`SyncError::JsonError`]
/// when the file cannot be read or parsed, and [`SyncError::InvalidScore`]
/// when the score fails validation.
pub fn load_score(path: impl AsRef<Path>) -> Result<Score> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yml") | Some("yaml") => parse_score_yaml(&text),
        Some("json") => parse_score_json(&text),
        _ => Err(SyncError::Config(format!(
            "unsupported score file '{}': expected .yml, .yaml or .json",
            path.display()
        ))),
    }
}

pub fn parse_score_yaml(text: &str) -> Result<Score> {
    let file: ScoreFile = serde_yaml::from_str(text)?;
    finish(file)
}

pub fn parse_score_json(text: &str) -> Result<Score> {
    let file: ScoreFile = serde_json::from_str(text)?;
    finish(file)
}

fn finish(file: ScoreFile) -> Result<Score> {
    let score = Score::with_system(file.grains);
    let errors = validate_score(&score);
    if !errors.is_empty() {
        return Err(SyncError::InvalidScore(errors));
    }
    Ok(score)
}
