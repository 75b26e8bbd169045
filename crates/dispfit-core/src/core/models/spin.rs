//! The atomic measurement unit being fit.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::params::{ConditionKey, Param};

/// One observed data point: an effective rate `y` with uncertainty `error`,
/// measured at abscissa `x` (CPMG frequency or spin-lock field) under the
/// experimental condition `key`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub key: ConditionKey,
    pub x: f64,
    pub y: f64,
    pub error: f64,
}

/// A parameter value as stored on a spin: a plain scalar, or a mapping from
/// condition key to value for keyed rate parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(f64),
    Keyed(BTreeMap<ConditionKey, f64>),
}

/// The simulated counterpart of a [`ParamValue`]: an ordered sequence of
/// values indexed by Monte Carlo repetition number.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimSeries(pub Vec<f64>);

/// A spin: the atomic entity being fit.
///
/// Created when the dataset is loaded; parameter values are populated during
/// grid search and minimization, simulated series during the Monte Carlo
/// loop. Spins are never deleted during a fit, only deselected.
#[derive(Debug, Clone)]
pub struct Spin {
    pub name: String,
    /// Identifier of the dispersion model currently assigned to this spin.
    pub model: String,
    pub selected: bool,
    pub measurements: Vec<Measurement>,
    params: HashMap<Param, ParamValue>,
    errors: HashMap<Param, ParamValue>,
    sim: HashMap<(Param, Option<ConditionKey>), SimSeries>,
}

impl Spin {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            selected: true,
            measurements: Vec::new(),
            params: HashMap::new(),
            errors: HashMap::new(),
            sim: HashMap::new(),
        }
    }

    /// Condition keys this spin was observed under, in canonical
    /// (registration) order.
    pub fn observed_keys(&self) -> Vec<ConditionKey> {
        let set: BTreeSet<ConditionKey> = self.measurements.iter().map(|m| m.key).collect();
        set.into_iter().collect()
    }

    /// Fetch a parameter value, looked up by condition key for keyed
    /// parameters. Returns `None` when the value has not been set.
    pub fn value(&self, param: Param, key: Option<ConditionKey>) -> Option<f64> {
        match (self.params.get(&param), key) {
            (Some(ParamValue::Scalar(v)), None) => Some(*v),
            (Some(ParamValue::Keyed(map)), Some(k)) => map.get(&k).copied(),
            _ => None,
        }
    }

    pub fn set_value(&mut self, param: Param, key: Option<ConditionKey>, value: f64) {
        Self::store(&mut self.params, param, key, value);
    }

    pub fn error(&self, param: Param, key: Option<ConditionKey>) -> Option<f64> {
        match (self.errors.get(&param), key) {
            (Some(ParamValue::Scalar(v)), None) => Some(*v),
            (Some(ParamValue::Keyed(map)), Some(k)) => map.get(&k).copied(),
            _ => None,
        }
    }

    pub fn set_error(&mut self, param: Param, key: Option<ConditionKey>, value: f64) {
        Self::store(&mut self.errors, param, key, value);
    }

    /// Simulated value of a parameter at a repetition index.
    pub fn sim_value(
        &self,
        param: Param,
        key: Option<ConditionKey>,
        repetition: usize,
    ) -> Option<f64> {
        self.sim
            .get(&(param, key))
            .and_then(|series| series.0.get(repetition))
            .copied()
    }

    /// Append one repetition's value to a parameter's simulated series.
    pub fn push_sim_value(&mut self, param: Param, key: Option<ConditionKey>, value: f64) {
        self.sim.entry((param, key)).or_default().0.push(value);
    }

    pub fn clear_sim(&mut self) {
        self.sim.clear();
    }

    /// Whether a value (scalar or any keyed entry) exists for this parameter.
    pub fn has_param(&self, param: Param) -> bool {
        self.params.contains_key(&param)
    }

    fn store(
        table: &mut HashMap<Param, ParamValue>,
        param: Param,
        key: Option<ConditionKey>,
        value: f64,
    ) {
        match key {
            None => {
                table.insert(param, ParamValue::Scalar(value));
            }
            Some(k) => {
                let entry = table
                    .entry(param)
                    .or_insert_with(|| ParamValue::Keyed(BTreeMap::new()));
                if let ParamValue::Keyed(map) = entry {
                    map.insert(k, value);
                } else {
                    let mut map = BTreeMap::new();
                    map.insert(k, value);
                    *entry = ParamValue::Keyed(map);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_values_are_independent_per_key() {
        let mut spin = Spin::new("G12N", "CR72");
        spin.set_value(Param::R2, Some(ConditionKey(0)), 10.0);
        spin.set_value(Param::R2, Some(ConditionKey(1)), 12.5);

        assert_eq!(spin.value(Param::R2, Some(ConditionKey(0))), Some(10.0));
        assert_eq!(spin.value(Param::R2, Some(ConditionKey(1))), Some(12.5));
        assert_eq!(spin.value(Param::R2, Some(ConditionKey(2))), None);
        assert_eq!(spin.value(Param::R2, None), None);
    }

    #[test]
    fn observed_keys_follow_registration_order() {
        let mut spin = Spin::new("G12N", "CR72");
        for key in [1usize, 0, 1, 2] {
            spin.measurements.push(Measurement {
                key: ConditionKey(key),
                x: 100.0,
                y: 20.0,
                error: 0.5,
            });
        }
        assert_eq!(
            spin.observed_keys(),
            vec![ConditionKey(0), ConditionKey(1), ConditionKey(2)]
        );
    }

    #[test]
    fn sim_series_index_by_repetition() {
        let mut spin = Spin::new("G12N", "CR72");
        spin.push_sim_value(Param::Kex, None, 1000.0);
        spin.push_sim_value(Param::Kex, None, 1100.0);
        assert_eq!(spin.sim_value(Param::Kex, None, 1), Some(1100.0));
        assert_eq!(spin.sim_value(Param::Kex, None, 2), None);
    }
}
