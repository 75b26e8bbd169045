//! The active dataset: spin storage, condition-key registry and clusters.

use slotmap::SlotMap;

use super::cluster::Cluster;
use super::ids::SpinId;
use super::params::ConditionKey;
use super::spin::Spin;

/// One fit run's data: all spins, the canonical condition-key order, and the
/// cluster assignment. Passed explicitly through every engine entry point;
/// its lifetime is scoped to one fit run.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub spins: SlotMap<SpinId, Spin>,
    pub clusters: Vec<Cluster>,
    condition_keys: Vec<String>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_spin(&mut self, spin: Spin) -> SpinId {
        self.spins.insert(spin)
    }

    /// Register a condition label, returning its key. Labels are registered
    /// in first-seen order, which defines the canonical key order.
    pub fn register_condition(&mut self, label: &str) -> ConditionKey {
        if let Some(pos) = self.condition_keys.iter().position(|l| l == label) {
            ConditionKey(pos)
        } else {
            self.condition_keys.push(label.to_string());
            ConditionKey(self.condition_keys.len() - 1)
        }
    }

    pub fn condition_label(&self, key: ConditionKey) -> Option<&str> {
        self.condition_keys.get(key.0).map(String::as_str)
    }

    pub fn condition_count(&self) -> usize {
        self.condition_keys.len()
    }

    /// The selected spins of a cluster, in cluster order.
    pub fn selected_spins<'a>(&'a self, cluster: &'a Cluster) -> Vec<(SpinId, &'a Spin)> {
        cluster
            .spins
            .iter()
            .filter_map(|&id| self.spins.get(id).map(|s| (id, s)))
            .filter(|(_, s)| s.selected)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_keys_register_in_first_seen_order() {
        let mut dataset = Dataset::new();
        let k600 = dataset.register_condition("600.13");
        let k800 = dataset.register_condition("800.28");
        assert_eq!(k600, ConditionKey(0));
        assert_eq!(k800, ConditionKey(1));
        assert_eq!(dataset.register_condition("600.13"), k600);
        assert_eq!(dataset.condition_label(k800), Some("800.28"));
    }

    #[test]
    fn deselected_spins_are_excluded_from_cluster_view() {
        let mut dataset = Dataset::new();
        let a = dataset.add_spin(Spin::new("A", "CR72"));
        let b = dataset.add_spin(Spin::new("B", "CR72"));
        dataset.spins[b].selected = false;
        let cluster = Cluster::new(vec![a, b]);

        let selected = dataset.selected_spins(&cluster);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, a);
    }
}
