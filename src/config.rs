//! Configuration for genome shape, mutation, compatibility and selection.

use serde::{Deserialize, Serialize};

use crate::gene::MAX_CAPACITY;

/// Parameters shared by every genome in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeatConfig {
    /// Number of input nodes.
    pub num_inputs: usize,
    /// Number of output nodes.
    pub num_outputs: usize,
    /// Allow backward and self links. Hidden nodes are then appended instead of
    /// being inserted in topological order.
    pub is_recurrent: bool,
    /// Node and link capacity of every genome slot.
    pub max_network_size: usize,
    /// Probability that each mutation opportunity fires. A genome gets one
    /// opportunity per node and per link every generation.
    pub mutation_rate: f32,
    /// Probability of looking for a mate instead of cloning.
    pub crossover_rate: f32,
    /// Weight of the disjoint-gene term in compatibility distance.
    pub disjoint_coeff: f32,
    /// Weight of the mean weight-difference term in compatibility distance.
    pub weight_coeff: f32,
    /// Two genomes may breed only when their distance is below this.
    pub compatibility_threshold: f32,
    /// Number of draws per tournament.
    pub tournament_size: usize,
    /// Biases live in `[-bias_range, bias_range]`.
    pub bias_range: f32,
    /// Gains live in `[-gain_range, gain_range]`.
    pub gain_range: f32,
    /// Weights live in `[-weight_range, weight_range]`.
    pub weight_range: f32,
    /// Standard deviation of parameter perturbations, as a fraction of the
    /// parameter's range.
    pub perturbation_scale: f32,
    /// Random initialization applies between `n` and `n * max_initial_mutations`
    /// mutations, where `n = num_inputs + num_outputs`.
    pub max_initial_mutations: usize,
    /// When crossover takes a weight from the mate, also take the mate's
    /// attributes for the link's target node.
    pub inherit_mate_nodes: bool,
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            num_inputs: 2,
            num_outputs: 1,
            is_recurrent: false,
            max_network_size: 20,
            mutation_rate: 0.01,
            crossover_rate: 0.6,
            disjoint_coeff: 1.0,
            weight_coeff: 0.4,
            compatibility_threshold: 3.0,
            tournament_size: 2,
            bias_range: 1.0,
            gain_range: 3.0,
            weight_range: 3.0,
            perturbation_scale: 0.1,
            max_initial_mutations: 2,
            inherit_mate_nodes: true,
        }
    }
}

impl NeatConfig {
    /// Create a config for feed-forward CPPNs with the given interface.
    #[must_use]
    pub fn cppn(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            num_inputs,
            num_outputs,
            ..Default::default()
        }
    }

    /// Create a config for recurrent networks with the given interface.
    #[must_use]
    pub fn recurrent(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            is_recurrent: true,
            ..Self::cppn(num_inputs, num_outputs)
        }
    }

    /// Parse a JSON config. Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of fixed (input plus output) nodes.
    #[inline]
    #[must_use]
    pub const fn network_size(&self) -> usize {
        self.num_inputs + self.num_outputs
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_inputs == 0 || self.num_outputs == 0 {
            return Err(ConfigError::InvalidInterface);
        }
        if self.max_network_size > MAX_CAPACITY || self.max_network_size <= self.network_size() {
            return Err(ConfigError::InvalidNetworkSize {
                size: self.max_network_size,
                min: self.network_size() + 1,
                max: MAX_CAPACITY,
            });
        }
        for (name, rate) in [
            ("mutation_rate", self.mutation_rate),
            ("crossover_rate", self.crossover_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::InvalidRate { name, value: rate });
            }
        }
        for (name, range) in [
            ("bias_range", self.bias_range),
            ("gain_range", self.gain_range),
            ("weight_range", self.weight_range),
        ] {
            if !range.is_finite() || range <= 0.0 {
                return Err(ConfigError::InvalidRange { name, value: range });
            }
        }
        if !self.perturbation_scale.is_finite() || self.perturbation_scale < 0.0 {
            return Err(ConfigError::InvalidPerturbationScale(self.perturbation_scale));
        }
        for (name, coeff) in [
            ("disjoint_coeff", self.disjoint_coeff),
            ("weight_coeff", self.weight_coeff),
        ] {
            if !coeff.is_finite() || coeff < 0.0 {
                return Err(ConfigError::InvalidCoefficient { name, value: coeff });
            }
        }
        if self.compatibility_threshold.is_nan() {
            return Err(ConfigError::InvalidThreshold);
        }
        if self.tournament_size == 0 {
            return Err(ConfigError::InvalidTournamentSize);
        }
        if self.max_initial_mutations == 0 {
            return Err(ConfigError::InvalidInitialMutations);
        }
        Ok(())
    }
}

/// Layout of a population: independent sub-populations of equal size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopulationShape {
    /// Number of sub-populations. Individuals never breed across them.
    pub num_sub_pops: usize,
    /// Individuals per sub-population.
    pub num_individuals: usize,
}

impl PopulationShape {
    /// Create a shape.
    #[must_use]
    pub const fn new(num_sub_pops: usize, num_individuals: usize) -> Self {
        Self {
            num_sub_pops,
            num_individuals,
        }
    }

    /// Total number of genome slots per generation buffer.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.num_sub_pops * self.num_individuals
    }

    /// Whether the shape holds no individuals.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `(sub_pop, individual)` addresses a slot in this shape.
    #[inline]
    #[must_use]
    pub const fn contains(&self, sub_pop: usize, individual: usize) -> bool {
        sub_pop < self.num_sub_pops && individual < self.num_individuals
    }

    /// Flat slot index of `(sub_pop, individual)`.
    #[inline]
    #[must_use]
    pub const fn index(&self, sub_pop: usize, individual: usize) -> usize {
        sub_pop * self.num_individuals + individual
    }

    /// Inverse of [`index`](Self::index).
    #[inline]
    #[must_use]
    pub const fn split(&self, index: usize) -> (usize, usize) {
        (index / self.num_individuals, index % self.num_individuals)
    }

    /// Validate the shape.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Err(ConfigError::EmptyPopulation);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Networks need at least one input and one output")]
    InvalidInterface,
    #[error("Network size {size} must lie in {min}..={max}")]
    InvalidNetworkSize { size: usize, min: usize, max: usize },
    #[error("{name} must lie in [0, 1], got {value}")]
    InvalidRate { name: &'static str, value: f32 },
    #[error("{name} must be positive and finite, got {value}")]
    InvalidRange { name: &'static str, value: f32 },
    #[error("Perturbation scale must be non-negative and finite, got {0}")]
    InvalidPerturbationScale(f32),
    #[error("{name} must be non-negative and finite, got {value}")]
    InvalidCoefficient { name: &'static str, value: f32 },
    #[error("Compatibility threshold must not be NaN")]
    InvalidThreshold,
    #[error("Tournament size must be at least 1")]
    InvalidTournamentSize,
    #[error("Max initial mutations must be at least 1")]
    InvalidInitialMutations,
    #[error("Population must contain at least one individual")]
    EmptyPopulation,
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(NeatConfig::default().validate().is_ok());
        assert!(NeatConfig::cppn(4, 3).validate().is_ok());
        assert!(NeatConfig::recurrent(1, 1).is_recurrent);
    }

    #[test]
    fn test_rejects_oversized_networks() {
        let config = NeatConfig {
            max_network_size: MAX_CAPACITY + 1,
            ..NeatConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNetworkSize { .. })
        ));

        let config = NeatConfig {
            max_network_size: 3,
            ..NeatConfig::cppn(2, 1)
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_rates_and_ranges() {
        let config = NeatConfig {
            crossover_rate: 1.5,
            ..NeatConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRate { name: "crossover_rate", .. })
        ));

        let config = NeatConfig {
            weight_range: 0.0,
            ..NeatConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRange { name: "weight_range", .. })
        ));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = NeatConfig::from_json(r#"{ "num_inputs": 4, "tournament_size": 5 }"#).unwrap();
        assert_eq!(config.num_inputs, 4);
        assert_eq!(config.tournament_size, 5);
        assert_eq!(config.num_outputs, NeatConfig::default().num_outputs);

        assert!(matches!(
            NeatConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_shape_indexing() {
        let shape = PopulationShape::new(3, 10);
        assert_eq!(shape.len(), 30);
        assert_eq!(shape.index(2, 4), 24);
        assert_eq!(shape.split(24), (2, 4));
        assert!(shape.contains(2, 9));
        assert!(!shape.contains(3, 0));
        assert!(PopulationShape::new(0, 10).validate().is_err());
    }
}
