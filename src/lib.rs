//! # CPPN NEAT
//!
//! A data-parallel NeuroEvolution of Augmenting Topologies (NEAT) core for
//! evolving many Compositional Pattern Producing Networks (CPPNs) in lockstep.
//!
//! ## Features
//!
//! - **Packed Genomes**: Each CPPN lives in fixed-capacity node and link
//!   arrays with live counts. Nothing is allocated or freed while evolving.
//! - **Index-Based Topology**: Hidden nodes are kept in topological order, so
//!   feed-forward networks activate in a single pass over their nodes
//! - **Atomic Innovation Counter**: One shared counter tags every new link for
//!   crossover alignment
//! - **Double-Buffered Generations**: Offspring are bred in parallel from an
//!   immutable parent buffer, then the buffers rotate
//! - **Compatibility-Gated Crossover**: Mates are picked by tournament among
//!   genomes within a genetic-distance threshold
//!
//! ## Quick Start
//!
//! ```rust
//! use cppn_neat::{Activator, NeatConfig, Population, PopulationShape};
//!
//! // 4 sub-populations of 32 CPPNs mapping (x, y) to one value
//! let config = NeatConfig::cppn(2, 1);
//! let mut population = Population::new(config.clone(), PopulationShape::new(4, 32), 42).unwrap();
//!
//! let mut activator = Activator::new(&config);
//! for _ in 0..5 {
//!     let fitness: Vec<f32> = population
//!         .genomes()
//!         .iter()
//!         .map(|genome| {
//!             activator.reset();
//!             activator.evaluate(genome, &[0.5, -0.5])[0]
//!         })
//!         .collect();
//!     population.set_fitnesses(&fitness).unwrap();
//!     population.propagate(&[]).unwrap();
//! }
//! population.assert_valid();
//! ```
//!
//! ## Architecture
//!
//! ### Genome Layout
//!
//! ```text
//! nodes: [ inputs | hidden (topological order) | outputs | dead slots ... ]
//! links: [ live links in creation order                  | dead slots ... ]
//! ```
//!
//! Links refer to nodes by position. Inserting or deleting a node shifts the
//! tail of the node array and rewrites every affected link endpoint.
//!
//! ### Generation Step
//!
//! 1. **Select**: tournament per offspring slot, plus a mate tournament among
//!    compatible genomes with probability `crossover_rate`
//! 2. **Reproduce**: clone or cross over into the inactive buffer
//! 3. **Rotate**: the new buffer becomes current
//! 4. **Mutate**: `node_count + link_count` chances, each firing with
//!    probability `mutation_rate`
//! 5. **Restore elites** and recompute the compatibility matrix

pub mod activation;
pub mod compatibility;
pub mod config;
pub mod evaluator;
pub mod gene;
pub mod genome;
pub mod innovation;
pub mod mutation;
pub mod population;
pub mod record;
pub mod reproduction;
pub mod selection;
pub mod validation;

// Re-exports for convenience
pub use activation::Activation;
pub use compatibility::{
    align, compatibility, is_compatible, Alignment, CompatibilityMatrix, CompatibilityReport,
};
pub use config::{ConfigError, NeatConfig, PopulationShape};
pub use evaluator::{activate_many, Activator};
pub use gene::{Link, Node, NodeKind, MAX_CAPACITY};
pub use genome::{Genome, LayoutError};
pub use innovation::InnovationCounter;
pub use mutation::MutationKind;
pub use population::{GenerationStats, Population, PopulationError};
pub use record::{GenomeRecord, LinkRecord, NodeRecord, RecordError};
pub use reproduction::{clone_into, crossover_into};
pub use selection::{select_match, Match};
pub use validation::{validate, ValidationError};
