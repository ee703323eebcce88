//! Canonical Registry - known name variants mapped to corrected canonical names
//!
//! Built once per run from an external mapping source (CSV dictionary), then
//! immutable for the run's lifetime. Share it behind an `Arc`; concurrent
//! readers never see a mutation.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::normalize;

/// The entity kinds a registry entry or dimension row can belong to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Builder,
    Project,
    Company,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Builder => "builder",
            EntityKind::Project => "project",
            EntityKind::Company => "company",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "builder" => Ok(EntityKind::Builder),
            "project" => Ok(EntityKind::Project),
            "company" => Ok(EntityKind::Company),
            other => Err(EngineError::Registry(format!(
                "Unknown entity kind: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registry mapping: a known raw variant and its corrected name
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub corrected_name: String,
    pub confidence: f64,
}

/// Immutable snapshot of the canonical name dictionary for one run.
///
/// Keys are normalized (trimmed, uppercased, whitespace-collapsed) on insert
/// and on lookup, so entries are case- and whitespace-insensitive.
#[derive(Clone, Debug, Default)]
pub struct CanonicalRegistry {
    entries: HashMap<EntityKind, HashMap<String, RegistryEntry>>,
}

impl CanonicalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from in-memory mappings.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (EntityKind, String, String, f64)>,
    {
        let mut registry = Self::new();
        for (kind, raw, corrected, confidence) in entries {
            registry.insert(kind, &raw, corrected, confidence);
        }
        registry
    }

    /// Load a registry from a CSV dictionary with columns
    /// `kind,original_name,corrected_name,confidence`.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let registry = Self::from_csv_reader(file)?;
        info!(
            entries = registry.len(),
            path = %path.as_ref().display(),
            "Loaded canonical registry"
        );
        Ok(registry)
    }

    pub fn from_csv_reader(reader: impl Read) -> Result<Self> {
        #[derive(Deserialize)]
        struct Row {
            kind: String,
            original_name: String,
            corrected_name: String,
            confidence: Option<f64>,
        }

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut registry = Self::new();
        for result in rdr.deserialize::<Row>() {
            let row = result?;
            let kind = EntityKind::parse(&row.kind)?;
            registry.insert(
                kind,
                &row.original_name,
                row.corrected_name,
                row.confidence.unwrap_or(1.0),
            );
        }
        Ok(registry)
    }

    fn insert(&mut self, kind: EntityKind, raw: &str, corrected: String, confidence: f64) {
        let key = normalize_key(raw);
        if key.is_empty() {
            return;
        }
        self.entries.entry(kind).or_default().insert(
            key,
            RegistryEntry {
                corrected_name: corrected,
                confidence: confidence.clamp(0.0, 1.0),
            },
        );
    }

    /// Look up a raw name. Returns the corrected name and the registry's
    /// confidence in that mapping.
    pub fn lookup(&self, kind: EntityKind, raw_name: &str) -> Option<(&str, f64)> {
        let key = normalize_key(raw_name);
        self.entries
            .get(&kind)
            .and_then(|m| m.get(&key))
            .map(|e| (e.corrected_name.as_str(), e.confidence))
    }

    /// All normalized keys for a kind, for fuzzy candidate scans.
    pub fn keys_for(&self, kind: EntityKind) -> impl Iterator<Item = (&str, &RegistryEntry)> {
        self.entries
            .get(&kind)
            .into_iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|m| m.len()).sum()
    }

    /// Number of entries for one kind. A pass-through against a kind with no
    /// entries is expected, not suspicious.
    pub fn kind_len(&self, kind: EntityKind) -> usize {
        self.entries.get(&kind).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalize a raw name into a registry key: trim, collapse whitespace, uppercase.
pub fn normalize_key(raw: &str) -> String {
    normalize::clean_text(raw).to_uppercase()
}
