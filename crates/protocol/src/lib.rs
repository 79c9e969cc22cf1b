use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const BATCH_SUMMARY_SCHEMA_VERSION: u32 = 1;

pub const CONSTRAINT_MATRIX_SUFFIX: &str = "_constraint_matrix.json";
pub const WEIGHT_VECTOR_SUFFIX: &str = "_weight_vector.json";
pub const CONSENSUS_SUFFIX: &str = "_consensus.json";
pub const RUNTIME_SUFFIX: &str = "_runtime.tsv";

/// `<unit>_constraint_matrix.json`: sparse binary vertex-by-clique matrix in
/// coordinate form. Rows follow the layer-major order of `layers` in the
/// consensus file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct ConstraintMatrixFile {
    pub rows: usize,
    pub cols: usize,
    /// `[row, col]` of every non-zero entry
    pub entries: Vec<[usize; 2]>,
}

/// `<unit>_consensus.json`: detection universe and candidate cliques
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct ConsensusFile {
    /// Detector names, one per layer. Defaults to `layer_<i>`.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Per layer, the `[x, y]` of every detection
    pub layers: Vec<Vec<[f64; 2]>>,

    /// Per clique, one detection index (or null) per layer
    pub cliques: Vec<Vec<Option<usize>>>,

    /// Per clique output confidence. Defaults to the weight vector.
    #[serde(default)]
    pub confidences: Option<Vec<f64>>,
}

impl ConsensusFile {
    /// Layer labels, filling unnamed layers with `layer_<i>`
    pub fn resolved_labels(&self) -> Vec<String> {
        (0..self.layers.len())
            .map(|i| {
                self.labels
                    .get(i)
                    .filter(|label| !label.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("layer_{i}"))
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Ok,
    Failed,
    TimedOut,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct UnitReport {
    pub unit: String,
    pub status: UnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub entries: usize,
    pub selected: usize,
    pub synthesized: usize,
    pub elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct BatchSummary {
    pub schema_version: u32,
    pub backend: String,
    pub engine: String,
    pub ok: usize,
    pub failed: usize,
    pub units: Vec<UnitReport>,
}

impl BatchSummary {
    pub fn new(backend: impl Into<String>, engine: impl Into<String>, units: Vec<UnitReport>) -> Self {
        let ok = units
            .iter()
            .filter(|u| u.status == UnitStatus::Ok)
            .count();
        Self {
            schema_version: BATCH_SUMMARY_SCHEMA_VERSION,
            backend: backend.into(),
            engine: engine.into(),
            ok,
            failed: units.len() - ok,
            units,
        }
    }
}

/// JSON schema of the consensus input file
pub fn consensus_file_schema() -> Result<String> {
    let schema = schemars::schema_for!(ConsensusFile);
    serde_json::to_string_pretty(&schema).map_err(Into::into)
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}
