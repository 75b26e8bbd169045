//! CSV writer for fitted parameter values.
//!
//! Emits one row per stored parameter value: `spin,param,key,value,error`.
//! Keyed parameters produce one row per observed condition key, with the
//! key's registered label; the `key` column is empty for scalars. Derived
//! parameters are included alongside the fitted ones.

use std::path::Path;

use crate::core::models::dataset::Dataset;
use crate::core::models::params::Param;
use crate::core::models::spin::Spin;
use crate::core::registry::{self, Derivation};

use super::table::DatasetError;

fn reported_params(model_id: &str) -> Vec<Param> {
    let Some(model) = registry::get(model_id) else {
        return Vec::new();
    };
    let mut params: Vec<Param> = model.params.to_vec();
    for rule in model.derivations {
        let to = match *rule {
            Derivation::Complement { to, .. } => to,
            Derivation::ComplementPair { to, .. } => to,
            Derivation::Reciprocal { to, .. } => to,
            Derivation::FluxForward { to, .. } => to,
            Derivation::FluxReverse { to, .. } => to,
        };
        if !params.contains(&to) {
            params.push(to);
        }
    }
    params
}

fn write_row(
    writer: &mut csv::Writer<std::fs::File>,
    spin: &Spin,
    param: Param,
    key_label: &str,
    value: f64,
    error: Option<f64>,
) -> Result<(), DatasetError> {
    let value = value.to_string();
    let error = error.map(|e| e.to_string()).unwrap_or_default();
    writer.write_record([
        spin.name.as_str(),
        param.name(),
        key_label,
        value.as_str(),
        error.as_str(),
    ])?;
    Ok(())
}

/// Save every fitted (and derived) parameter of the dataset to a CSV table.
pub fn save_parameters(dataset: &Dataset, path: &Path) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["spin", "param", "key", "value", "error"])?;

    for (_, spin) in &dataset.spins {
        for param in reported_params(&spin.model) {
            if param.descriptor().keyed {
                for key in spin.observed_keys() {
                    if let Some(value) = spin.value(param, Some(key)) {
                        let label = dataset.condition_label(key).unwrap_or_default();
                        write_row(&mut writer, spin, param, label, value, spin.error(param, Some(key)))?;
                    }
                }
            } else if let Some(value) = spin.value(param, None) {
                write_row(&mut writer, spin, param, "", value, spin.error(param, None))?;
            }
        }
    }
    writer.flush().map_err(DatasetError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::params::ConditionKey;
    use crate::core::models::spin::Measurement;

    #[test]
    fn save_emits_fitted_and_derived_rows_with_key_labels() {
        let mut dataset = Dataset::new();
        let key = dataset.register_condition("600.13");
        let mut spin = Spin::new("G12N", "CR72");
        spin.measurements.push(Measurement {
            key,
            x: 66.7,
            y: 20.0,
            error: 0.5,
        });
        spin.set_value(Param::R2, Some(key), 12.0);
        spin.set_error(Param::R2, Some(key), 0.3);
        spin.set_value(Param::PA, None, 0.9);
        spin.set_value(Param::PB, None, 0.1);
        spin.set_value(Param::Kex, None, 1000.0);
        dataset.add_spin(spin);

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("params.csv");
        save_parameters(&dataset, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("spin,param,key,value,error\n"));
        assert!(content.contains("G12N,r2,600.13,12,0.3"));
        assert!(content.contains("G12N,pA,,0.9,"));
        // Derived complement is reported even though it was not fitted.
        assert!(content.contains("G12N,pB,,0.1,"));
        // Unset dw produces no row.
        assert!(!content.contains(",dw,"));
    }
}
