use std::collections::HashMap;

use conclave_core::ReviewerConfig;

/// Reviewer reliability weights in `(0, 1]`.
///
/// The table is a closed lookup with an explicit default: reviewer ids
/// without an entry (or with an out-of-range entry) get `default_weight`,
/// so onboarding a new reviewer is a configuration change only.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use conclave_consensus::WeightTable;
///
/// let mut weights = HashMap::new();
/// weights.insert("gpt-4o".to_string(), 0.9);
/// let table = WeightTable::new(weights, 0.5);
///
/// assert_eq!(table.weight_for("gpt-4o"), 0.9);
/// assert_eq!(table.weight_for("unknown-model"), 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct WeightTable {
    weights: HashMap<String, f64>,
    default_weight: f64,
}

impl WeightTable {
    /// Build a table from explicit weights and a default.
    ///
    /// The default is clamped into `(0, 1]`; a non-positive default falls
    /// back to 0.5.
    pub fn new(weights: HashMap<String, f64>, default_weight: f64) -> Self {
        let default_weight = if default_weight > 0.0 {
            default_weight.min(1.0)
        } else {
            0.5
        };
        Self {
            weights,
            default_weight,
        }
    }

    /// Build a table from the reviewer section of the configuration.
    pub fn from_config(config: &ReviewerConfig) -> Self {
        Self::new(config.weights.clone(), config.default_weight)
    }

    /// Weight for a reviewer id. Entries outside `(0, 1]` are treated as
    /// absent.
    pub fn weight_for(&self, reviewer_id: &str) -> f64 {
        self.weights
            .get(reviewer_id)
            .copied()
            .filter(|w| *w > 0.0 && *w <= 1.0)
            .unwrap_or(self.default_weight)
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::new(HashMap::new(), 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_reviewer_gets_default() {
        let table = WeightTable::default();
        assert_eq!(table.weight_for("anything"), 0.5);
    }

    #[test]
    fn out_of_range_entries_fall_back() {
        let mut weights = HashMap::new();
        weights.insert("zero".to_string(), 0.0);
        weights.insert("too-big".to_string(), 1.5);
        let table = WeightTable::new(weights, 0.3);
        assert_eq!(table.weight_for("zero"), 0.3);
        assert_eq!(table.weight_for("too-big"), 0.3);
    }

    #[test]
    fn invalid_default_becomes_half() {
        let table = WeightTable::new(HashMap::new(), -1.0);
        assert_eq!(table.weight_for("x"), 0.5);
    }

    #[test]
    fn from_config_reads_table() {
        let mut config = ReviewerConfig::default();
        config.weights.insert("gpt-4o".into(), 0.9);
        config.default_weight = 0.4;
        let table = WeightTable::from_config(&config);
        assert_eq!(table.weight_for("gpt-4o"), 0.9);
        assert_eq!(table.weight_for("other"), 0.4);
    }
}
