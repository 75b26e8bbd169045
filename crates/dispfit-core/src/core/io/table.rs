//! CSV measurement-table reader.
//!
//! Expected columns: `spin,cluster,key,x,y,error`. `spin` identifies the
//! measurement unit, `cluster` is an optional cluster label (spins without
//! one get singleton clusters), `key` is the condition label (e.g. the
//! spectrometer frequency), `x` the CPMG frequency or spin-lock field,
//! `y` the observed effective rate and `error` its uncertainty.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::core::models::cluster::Cluster;
use crate::core::models::dataset::Dataset;
use crate::core::models::ids::SpinId;
use crate::core::models::spin::{Measurement, Spin};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error reading dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed dataset record: {0}")]
    Csv(#[from] csv::Error),

    #[error("Non-positive uncertainty {value} for spin '{spin}' at condition '{key}'")]
    InvalidUncertainty {
        spin: String,
        key: String,
        value: f64,
    },

    #[error("Dataset contains no measurements")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct Record {
    spin: String,
    cluster: Option<String>,
    key: String,
    x: f64,
    y: f64,
    error: f64,
}

/// Load a measurement table, assigning every spin the given model id.
///
/// Condition keys are registered in first-seen order. Spins sharing a
/// cluster label are grouped, in first-seen order; unlabeled spins form
/// singleton clusters.
pub fn load_dataset(path: &Path, model_id: &str) -> Result<Dataset, DatasetError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut dataset = Dataset::new();
    let mut spin_ids: HashMap<String, SpinId> = HashMap::new();
    let mut spin_order: Vec<SpinId> = Vec::new();
    let mut cluster_labels: HashMap<SpinId, Option<String>> = HashMap::new();
    let mut count = 0usize;

    for record in reader.deserialize() {
        let record: Record = record?;
        if record.error <= 0.0 || !record.error.is_finite() {
            return Err(DatasetError::InvalidUncertainty {
                spin: record.spin,
                key: record.key,
                value: record.error,
            });
        }

        let key = dataset.register_condition(&record.key);
        let id = *spin_ids.entry(record.spin.clone()).or_insert_with(|| {
            let id = dataset.add_spin(Spin::new(record.spin.clone(), model_id));
            spin_order.push(id);
            cluster_labels.insert(id, record.cluster.clone());
            id
        });
        dataset.spins[id].measurements.push(Measurement {
            key,
            x: record.x,
            y: record.y,
            error: record.error,
        });
        count += 1;
    }

    if count == 0 {
        return Err(DatasetError::Empty);
    }

    // Group spins into clusters by label, preserving first-seen order.
    let mut labeled: Vec<(String, Vec<SpinId>)> = Vec::new();
    for &id in &spin_order {
        match cluster_labels.get(&id).and_then(|l| l.clone()) {
            Some(label) => match labeled.iter_mut().find(|(l, _)| *l == label) {
                Some((_, ids)) => ids.push(id),
                None => labeled.push((label, vec![id])),
            },
            None => dataset.clusters.push(Cluster::new(vec![id])),
        }
    }
    for (_, ids) in labeled {
        dataset.clusters.push(Cluster::new(ids));
    }

    info!(
        spins = dataset.spins.len(),
        clusters = dataset.clusters.len(),
        measurements = count,
        conditions = dataset.condition_count(),
        "Dataset loaded."
    );
    Ok(dataset)
}
