use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// A trained logistic-regression model plus its standard scaler, stored as
/// JSON. Training happens elsewhere; this side only applies the weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub features: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl ModelSpec {
    pub fn validate(&self) -> Result<()> {
        let n = self.features.len();
        if self.means.len() != n || self.scales.len() != n || self.coefficients.len() != n {
            return Err(anyhow!(
                "model {:?}: features/means/scales/coefficients lengths differ",
                self.name
            ));
        }
        Ok(())
    }

    /// Probability of a home run for one feature vector, or None when any
    /// required feature is absent (callers skip the player rather than guess).
    pub fn predict_proba(&self, features: &HashMap<String, f64>) -> Option<f64> {
        let mut z = self.intercept;
        for (idx, name) in self.features.iter().enumerate() {
            let raw = *features.get(name)?;
            // A zero scale means the feature had no variance in training.
            let scale = if self.scales[idx] == 0.0 { 1.0 } else { self.scales[idx] };
            z += self.coefficients[idx] * ((raw - self.means[idx]) / scale);
        }
        Some(sigmoid(z))
    }
}

pub fn default_models_path() -> PathBuf {
    std::env::var("HR_MODEL_CONFIG")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/models.json"))
}

pub fn load_models(path: &Path) -> Result<Vec<ModelSpec>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read model config {}", path.display()))?;
    let models: Vec<ModelSpec> =
        serde_json::from_str(&raw).with_context(|| format!("decode {}", path.display()))?;
    for model in &models {
        model.validate()?;
    }
    Ok(models)
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
