//! Sampling configuration
//!
//! ```json
//! {
//!   "epsilon": 1.0,
//!   "method": "flip",
//!   "min_depth": 1,
//!   "max_depth": 2,
//!   "limit": 50,
//!   "target": {"city": "A"}
//! }
//! ```
//!
//! Missing keys take their defaults; unknown keys are rejected.

use crate::dataset::{Schema, Value};
use crate::privacy::RandomizationMethod;
use crate::sampler::{SamplerOptions, DEFAULT_MAX_FRONTIER};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Configuration of one `randomized_sample` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    /// Level-by-level traversal (otherwise depth-first)
    pub breadth_first: bool,
    /// Fraction of records drawn from the randomized branch
    pub interleave: f64,
    /// Largest explored depth
    pub max_depth: usize,
    /// Smallest emitted depth
    pub min_depth: usize,
    /// Cap on emitted records
    pub limit: Option<usize>,
    /// Randomization method name (`"flip"` or `"resample"`)
    pub method: String,
    /// Attributes left out of discretization
    pub exclude: Vec<String>,
    /// Forced attribute values
    pub target: BTreeMap<String, Value>,
    /// Privacy budget of the randomized table
    pub epsilon: f64,
    /// Cap on combinations kept per level
    pub max_frontier: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            breadth_first: true,
            interleave: 0.0,
            max_depth: 3,
            min_depth: 1,
            limit: None,
            method: "flip".to_string(),
            exclude: Vec::new(),
            target: BTreeMap::new(),
            epsilon: 1.0,
            max_frontier: DEFAULT_MAX_FRONTIER,
        }
    }
}

impl SamplerConfig {
    /// Parse a JSON configuration
    ///
    /// # Errors
    /// Returns `Config` if the JSON is malformed or names unknown keys
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read and `Config` if it cannot be parsed
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parsed randomization method
    ///
    /// # Errors
    /// Returns `UnsupportedMechanism` for names other than `flip` and `resample`
    pub fn method(&self) -> Result<RandomizationMethod> {
        self.method.parse()
    }

    /// Validated sampler options, with targets coerced to their declared types
    ///
    /// # Errors
    /// Returns `UnsupportedMechanism`, `InvalidDepthRange` or `InvalidInput`
    /// for invalid settings
    pub fn to_options(&self, schema: &Schema) -> Result<SamplerOptions> {
        let forced = self
            .target
            .iter()
            .map(|(name, value)| {
                let value = match schema.get(name) {
                    Some(spec) => value.clone().coerce(&spec.kind),
                    None => value.clone(),
                };
                (name.clone(), value)
            })
            .collect();

        SamplerOptions::builder()
            .breadth_first(self.breadth_first)
            .method(self.method()?)
            .forced(forced)
            .min_depth(self.min_depth)
            .max_depth(self.max_depth)
            .limit(self.limit)
            .interleave(self.interleave)
            .max_frontier(self.max_frontier)
            .build()
    }
}
