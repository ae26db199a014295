//! Static model catalog: RAM tier → use case → model names, plus per-model metadata.

use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Result;

const BUNDLED_MODELS: &str = include_str!("../data/models.json");
const BUNDLED_MODELS_INFO: &str = include_str!("../data/models_info.json");

/// RAM tier → use case → ordered model names. Key order follows the source JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    tiers: IndexMap<String, IndexMap<String, Vec<String>>>,
}

impl ModelCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn bundled() -> Self {
        parse_or_default(BUNDLED_MODELS, "bundled model catalog")
    }

    /// Load from `path` when given, the bundled copy otherwise. Never fails.
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(path) => read_or_default(path, "model catalog"),
            None => Self::bundled(),
        }
    }

    pub fn ram_tiers(&self) -> Vec<&str> {
        self.tiers.keys().map(String::as_str).collect()
    }

    /// Union of use cases across every tier, first-seen order.
    pub fn use_cases(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for use_case in self.tiers.values().flat_map(|u| u.keys()) {
            if !seen.contains(&use_case.as_str()) {
                seen.push(use_case.as_str());
            }
        }
        seen
    }

    pub fn models_for(&self, ram: &str, use_case: &str) -> &[String] {
        self.tiers
            .get(ram)
            .and_then(|u| u.get(use_case))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_tier(&self, ram: &str) -> bool {
        self.tiers.contains_key(ram)
    }

    pub fn has_use_case(&self, use_case: &str) -> bool {
        self.tiers.values().any(|u| u.contains_key(use_case))
    }

    /// Every (tier, use case, models) triple in catalog order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &[String])> {
        self.tiers.iter().flat_map(|(ram, use_cases)| {
            use_cases
                .iter()
                .map(move |(use_case, models)| (ram.as_str(), use_case.as_str(), models.as_slice()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub parameters: String,
    pub quantization: String,
    pub estimated_memory_required_gb: String,
}

impl ModelInfo {
    pub fn summary(&self) -> String {
        format!(
            "{} parameters, {} quantization, {} GB memory",
            self.parameters, self.quantization, self.estimated_memory_required_gb
        )
    }
}

/// Model name → metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelInfoTable {
    models: IndexMap<String, ModelInfo>,
}

impl ModelInfoTable {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn bundled() -> Self {
        parse_or_default(BUNDLED_MODELS_INFO, "bundled model info")
    }

    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(path) => read_or_default(path, "model info"),
            None => Self::bundled(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelInfo> {
        self.models.get(name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Names of the models installed on the server.
///
/// Ollama reports untagged pulls as `name:latest`, so `mistral` and
/// `mistral:latest` are treated as the same model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailableModels {
    names: BTreeSet<String>,
}

impl AvailableModels {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        if self.names.contains(name) {
            return true;
        }
        match name.strip_suffix(":latest") {
            Some(base) => self.names.contains(base),
            None if !name.contains(':') => self.names.contains(&format!("{}:latest", name)),
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn parse_or_default<T: DeserializeOwned + Default>(json: &str, what: &str) -> T {
    serde_json::from_str(json).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to parse {}", what);
        T::default()
    })
}

fn read_or_default<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    match std::fs::read_to_string(path) {
        Ok(json) => parse_or_default(&json, what),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read {}", what);
            T::default()
        }
    }
}
