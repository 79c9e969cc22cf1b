use anyhow::{bail, Context, Result};
use consensus_ilp::{
    Clique, ConsensusError, ConsensusMode, Layer, MembershipMatrix, Point, Slot, UnitInput,
    VertexUniverse,
};
use consensus_protocol::{
    ConsensusFile, ConstraintMatrixFile, CONSENSUS_SUFFIX, CONSTRAINT_MATRIX_SUFFIX,
    RUNTIME_SUFFIX, WEIGHT_VECTOR_SUFFIX,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Files belonging to one unit, keyed by the shared `<base>` prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPaths {
    pub name: String,
    pub dir: PathBuf,
}

impl UnitPaths {
    fn from_matrix_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let name = file_name.strip_suffix(CONSTRAINT_MATRIX_SUFFIX)?;
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            dir: path.parent()?.to_path_buf(),
        })
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{suffix}", self.name))
    }

    pub fn matrix(&self) -> PathBuf {
        self.sibling(CONSTRAINT_MATRIX_SUFFIX)
    }

    pub fn weights(&self) -> PathBuf {
        self.sibling(WEIGHT_VECTOR_SUFFIX)
    }

    pub fn consensus(&self) -> PathBuf {
        self.sibling(CONSENSUS_SUFFIX)
    }

    pub fn runtime(&self) -> PathBuf {
        self.sibling(RUNTIME_SUFFIX)
    }

    /// `<base>.tsv` for multi-layer output, `<base>.box` for single-layer
    pub fn output(&self, mode: ConsensusMode) -> PathBuf {
        match mode {
            ConsensusMode::MultiLayer => self.sibling(".tsv"),
            ConsensusMode::SingleLayer => self.sibling(".box"),
        }
    }
}

/// Find every `*_constraint_matrix.json` directly under `in_dir`, sorted by name.
pub fn discover_units(in_dir: &Path) -> Result<Vec<UnitPaths>> {
    if !in_dir.is_dir() {
        bail!("input directory {} does not exist", in_dir.display());
    }
    let dir = in_dir
        .to_str()
        .with_context(|| format!("input directory {} is not valid UTF-8", in_dir.display()))?;
    let pattern = format!(
        "{}/*{CONSTRAINT_MATRIX_SUFFIX}",
        glob::Pattern::escape(dir.trim_end_matches('/'))
    );

    let mut units = Vec::new();
    for entry in glob::glob(&pattern).context("invalid unit glob pattern")? {
        let path = entry.context("failed to read unit directory entry")?;
        if !path.is_file() {
            continue;
        }
        if let Some(unit) = UnitPaths::from_matrix_path(&path) {
            units.push(unit);
        }
    }
    units.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(units)
}

/// Read and cross-check the three input files of a unit.
pub fn load_unit(unit: &UnitPaths) -> Result<UnitInput> {
    let matrix_file: ConstraintMatrixFile = read_json(&unit.matrix())?;
    let weights: Vec<f64> = read_json(&unit.weights())?;
    let consensus: ConsensusFile = read_json(&unit.consensus())?;

    let matrix = MembershipMatrix::from_entries(
        matrix_file.rows,
        matrix_file.cols,
        matrix_file.entries.iter().map(|&[row, col]| (row, col)),
    )
    .with_context(|| format!("{}: invalid constraint matrix", unit.name))?;

    let universe = build_universe(&consensus);
    let cliques = build_cliques(&consensus, &weights)?;
    log::debug!(
        "{}: {} layers, {} vertices, {} cliques, {} matrix entries",
        unit.name,
        universe.layer_count(),
        universe.vertex_count(),
        cliques.len(),
        matrix.nnz()
    );

    UnitInput::new(universe, cliques, matrix, weights)
        .with_context(|| format!("{}: inconsistent unit inputs", unit.name))
}

fn build_universe(file: &ConsensusFile) -> VertexUniverse {
    let layers = file
        .resolved_labels()
        .into_iter()
        .zip(&file.layers)
        .map(|(label, points)| {
            Layer::new(
                label,
                points.iter().map(|&[x, y]| Point::new(x, y)).collect(),
            )
        })
        .collect();
    VertexUniverse::new(layers)
}

fn build_cliques(file: &ConsensusFile, weights: &[f64]) -> Result<Vec<Clique>> {
    let confidences = file.confidences.as_deref().unwrap_or(weights);
    if confidences.len() != file.cliques.len() {
        return Err(ConsensusError::ShapeMismatch(format!(
            "{} confidences for {} cliques",
            confidences.len(),
            file.cliques.len()
        ))
        .into());
    }

    Ok(file
        .cliques
        .iter()
        .zip(confidences)
        .map(|(slots, &confidence)| {
            let slots = slots
                .iter()
                .map(|slot| match slot {
                    Some(index) => Slot::Present(*index),
                    None => Slot::Absent,
                })
                .collect();
            Clique::new(slots, confidence)
        })
        .collect())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parse {}", path.display()))
}
