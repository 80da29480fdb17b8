//! Double-buffered populations of packed genomes.
//!
//! A [`Population`] holds two full generation buffers. Reproduction reads
//! parents from the active buffer and writes offspring into the other one, so
//! every individual can be produced in parallel without seeing a half-written
//! generation. Once all offspring exist the buffers rotate, and the new
//! generation is mutated in place.
//!
//! Each parallel task draws from its own `ChaCha8Rng` stream, keyed by the
//! run seed, the step, the pipeline stage and the slot, so results do not
//! depend on how rayon schedules the work. Innovation numbers are the one
//! exception: they come from a shared atomic counter and are handed out in
//! whatever order links are created.

use log::{debug, error, trace};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compatibility::CompatibilityMatrix;
use crate::config::{ConfigError, NeatConfig, PopulationShape};
use crate::gene::{Link, Node};
use crate::genome::Genome;
use crate::innovation::InnovationCounter;
use crate::record::{GenomeRecord, RecordError};
use crate::reproduction::{clone_into, crossover_into};
use crate::selection::{select_match, Match};
use crate::validation::{validate, ValidationError};

/// Pipeline stages, mixed into each task's RNG seed.
#[derive(Debug, Clone, Copy)]
#[repr(u64)]
enum Stage {
    Randomize = 1,
    Select = 2,
    Reproduce = 3,
    Mutate = 4,
}

/// The RNG for one slot at one stage of one step.
fn lane_rng(seed: u64, step: u64, stage: Stage, slot: usize) -> ChaCha8Rng {
    let key = seed
        ^ step.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (stage as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    let mut rng = ChaCha8Rng::seed_from_u64(key);
    rng.set_stream(slot as u64);
    rng
}

/// Errors from population-level operations.
#[derive(Debug, thiserror::Error)]
pub enum PopulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Individual ({sub_pop}, {individual}) is out of range")]
    OutOfRange { sub_pop: usize, individual: usize },
    #[error("Expected {expected} entries, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Match for slot {slot} references ({parent}, {mate:?}) outside its sub-population")]
    InvalidMatch {
        slot: usize,
        parent: usize,
        mate: Option<usize>,
    },
    #[error("Record {index} has capacity {actual}, expected {expected}")]
    CapacityMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Record {index} could not be converted: {source}")]
    Record {
        index: usize,
        #[source]
        source: RecordError,
    },
    #[error("Individual ({sub_pop}, {individual}) is invalid: {source}")]
    Invalid {
        sub_pop: usize,
        individual: usize,
        #[source]
        source: ValidationError,
    },
}

/// Summary of one randomize or propagate step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Generation number of the now-current buffer.
    pub generation: u64,
    /// Offspring produced by crossover.
    pub crossovers: usize,
    /// Offspring produced by cloning. Elite slots are not counted.
    pub clones: usize,
    /// Slots restored from the previous generation as elites.
    pub elites: usize,
    /// Mutations applied after reproduction (or during initialization).
    pub mutations: usize,
    /// Mean live node count.
    pub mean_nodes: f32,
    /// Mean live link count.
    pub mean_links: f32,
    /// Mean pairwise compatibility distance of each sub-population.
    pub diversity: Vec<f32>,
}

/// Sub-populations of CPPN genomes evolved in lockstep.
#[derive(Debug, Clone)]
pub struct Population {
    config: NeatConfig,
    shape: PopulationShape,
    buffers: [Vec<Genome>; 2],
    active: usize,
    innovations: InnovationCounter,
    fitness: Vec<f32>,
    matches: Vec<Match>,
    compatibility: CompatibilityMatrix,
    /// Set when a genome changed since `compatibility` was last computed.
    stale: bool,
    seed: u64,
    step: u64,
    generation: u64,
}

impl Population {
    /// Create a population and fill it with random genomes.
    pub fn new(
        config: NeatConfig,
        shape: PopulationShape,
        seed: u64,
    ) -> Result<Self, PopulationError> {
        config.validate()?;
        shape.validate()?;

        let buffer = vec![Genome::new(config.max_network_size); shape.len()];
        let mut population = Self {
            buffers: [buffer.clone(), buffer],
            active: 0,
            innovations: InnovationCounter::new(),
            fitness: vec![0.0; shape.len()],
            matches: vec![Match::default(); shape.len()],
            compatibility: CompatibilityMatrix::new(shape),
            stale: true,
            seed,
            step: 0,
            generation: 0,
            config,
            shape,
        };
        population.randomize(&[])?;
        Ok(population)
    }

    #[must_use]
    pub fn config(&self) -> &NeatConfig {
        &self.config
    }

    #[must_use]
    pub fn shape(&self) -> PopulationShape {
        self.shape
    }

    /// Number of propagate steps since the last randomize.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The run-wide innovation counter.
    #[must_use]
    pub fn innovations(&self) -> &InnovationCounter {
        &self.innovations
    }

    /// Genomes of the current generation, sub-population major.
    #[must_use]
    pub fn genomes(&self) -> &[Genome] {
        &self.buffers[self.active]
    }

    /// Matches chosen by the last selection.
    #[must_use]
    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    /// Pairwise distances of the current generation.
    ///
    /// Edits made through [`genome_mut`](Self::genome_mut) or the mutating
    /// surface are reflected once [`refresh_compatibility`] or the next
    /// selection runs.
    ///
    /// [`refresh_compatibility`]: Self::refresh_compatibility
    #[must_use]
    pub fn compatibility(&self) -> &CompatibilityMatrix {
        &self.compatibility
    }

    fn slot(&self, sub_pop: usize, individual: usize) -> Result<usize, PopulationError> {
        if self.shape.contains(sub_pop, individual) {
            Ok(self.shape.index(sub_pop, individual))
        } else {
            Err(PopulationError::OutOfRange {
                sub_pop,
                individual,
            })
        }
    }

    // ------------------------------------------------------------------
    // Query surface
    // ------------------------------------------------------------------

    /// The current genome of an individual.
    ///
    /// # Panics
    ///
    /// Panics if the individual is out of range.
    #[must_use]
    pub fn genome(&self, sub_pop: usize, individual: usize) -> &Genome {
        assert!(
            self.shape.contains(sub_pop, individual),
            "individual ({sub_pop}, {individual}) is out of range"
        );
        &self.buffers[self.active][self.shape.index(sub_pop, individual)]
    }

    /// Mutable access to the current genome of an individual.
    ///
    /// # Panics
    ///
    /// Panics if the individual is out of range.
    pub fn genome_mut(&mut self, sub_pop: usize, individual: usize) -> &mut Genome {
        assert!(
            self.shape.contains(sub_pop, individual),
            "individual ({sub_pop}, {individual}) is out of range"
        );
        let slot = self.shape.index(sub_pop, individual);
        self.stale = true;
        &mut self.buffers[self.active][slot]
    }

    #[must_use]
    pub fn node_count(&self, sub_pop: usize, individual: usize) -> usize {
        self.genome(sub_pop, individual).node_count()
    }

    #[must_use]
    pub fn link_count(&self, sub_pop: usize, individual: usize) -> usize {
        self.genome(sub_pop, individual).link_count()
    }

    #[must_use]
    pub fn get_node(&self, sub_pop: usize, individual: usize, position: usize) -> Option<Node> {
        self.genome(sub_pop, individual).node(position)
    }

    #[must_use]
    pub fn get_link(&self, sub_pop: usize, individual: usize, index: usize) -> Option<Link> {
        self.genome(sub_pop, individual).link(index)
    }

    // ------------------------------------------------------------------
    // Mutating surface
    // ------------------------------------------------------------------

    pub fn insert_node(
        &mut self,
        sub_pop: usize,
        individual: usize,
        position: usize,
        node: Node,
    ) -> bool {
        self.genome_mut(sub_pop, individual).insert_node(position, node)
    }

    pub fn delete_node(&mut self, sub_pop: usize, individual: usize, position: usize) -> bool {
        self.genome_mut(sub_pop, individual).delete_node(position)
    }

    pub fn set_node(
        &mut self,
        sub_pop: usize,
        individual: usize,
        position: usize,
        node: Node,
    ) -> bool {
        self.genome_mut(sub_pop, individual).set_node(position, node)
    }

    /// Add a link with a fresh innovation number from this population's counter.
    pub fn add_link(
        &mut self,
        sub_pop: usize,
        individual: usize,
        from_node: usize,
        to_node: usize,
        weight: f32,
    ) -> Option<u32> {
        assert!(
            self.shape.contains(sub_pop, individual),
            "individual ({sub_pop}, {individual}) is out of range"
        );
        let slot = self.shape.index(sub_pop, individual);
        self.stale = true;
        self.buffers[self.active][slot].add_link(from_node, to_node, weight, &self.innovations)
    }

    pub fn delete_link(&mut self, sub_pop: usize, individual: usize, index: usize) -> bool {
        self.genome_mut(sub_pop, individual).delete_link(index)
    }

    pub fn set_link(
        &mut self,
        sub_pop: usize,
        individual: usize,
        index: usize,
        link: Link,
    ) -> bool {
        self.genome_mut(sub_pop, individual).set_link(index, link)
    }

    // ------------------------------------------------------------------
    // Fitness
    // ------------------------------------------------------------------

    /// Fitness of every individual, sub-population major.
    #[must_use]
    pub fn fitness(&self) -> &[f32] {
        &self.fitness
    }

    pub fn set_fitness(
        &mut self,
        sub_pop: usize,
        individual: usize,
        fitness: f32,
    ) -> Result<(), PopulationError> {
        let slot = self.slot(sub_pop, individual)?;
        self.fitness[slot] = fitness;
        Ok(())
    }

    /// Replace all fitness values at once.
    pub fn set_fitnesses(&mut self, fitness: &[f32]) -> Result<(), PopulationError> {
        if fitness.len() != self.fitness.len() {
            return Err(PopulationError::LengthMismatch {
                expected: self.fitness.len(),
                actual: fitness.len(),
            });
        }
        self.fitness.copy_from_slice(fitness);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Generations
    // ------------------------------------------------------------------

    /// Swap the active and inactive buffers.
    pub fn rotate(&mut self) {
        self.active = 1 - self.active;
        self.stale = true;
        trace!("Rotated to buffer {}", self.active);
    }

    fn check_elites(&self, elites: &[(usize, usize)]) -> Result<(), PopulationError> {
        for &(sub_pop, individual) in elites {
            self.slot(sub_pop, individual)?;
        }
        Ok(())
    }

    /// Replace every genome with a fresh random one, keeping `elites`.
    ///
    /// The previous generation survives in the inactive buffer until the next
    /// rotation, which is where elites are copied back from. Fitness is reset
    /// to zero and the generation number to 0. The innovation counter keeps
    /// counting so restored elites never collide with new genes.
    pub fn randomize(
        &mut self,
        elites: &[(usize, usize)],
    ) -> Result<GenerationStats, PopulationError> {
        self.check_elites(elites)?;
        self.rotate();

        let (seed, step) = (self.seed, self.step);
        let config = &self.config;
        let innovations = &self.innovations;
        self.buffers[self.active]
            .par_iter_mut()
            .enumerate()
            .for_each(|(slot, genome)| {
                let mut rng = lane_rng(seed, step, Stage::Randomize, slot);
                genome.random_init(config, innovations, &mut rng);
            });

        let num_elites = self.restore_elites(elites);
        self.fitness.fill(0.0);
        self.matches.fill(Match::default());
        self.generation = 0;
        self.step += 1;
        self.analyze();

        let stats = self.stats(0, 0, num_elites, 0);
        debug!(
            "Randomized {} individuals ({} elites kept), mean size {:.1} nodes / {:.1} links",
            self.shape.len(),
            num_elites,
            stats.mean_nodes,
            stats.mean_links
        );
        Ok(stats)
    }

    /// Choose a match for every offspring slot from the current fitness and
    /// compatibility.
    ///
    /// Compatibility is recomputed first if any genome was edited since the
    /// last analysis.
    pub fn select(&mut self) {
        self.refresh_compatibility();
        let (seed, step) = (self.seed, self.step);
        let n = self.shape.num_individuals;
        let shape = self.shape;
        let config = &self.config;
        let fitness = &self.fitness;
        let compatibility = &self.compatibility;
        self.matches
            .par_iter_mut()
            .enumerate()
            .for_each(|(slot, chosen)| {
                let (sub_pop, _) = shape.split(slot);
                let mut rng = lane_rng(seed, step, Stage::Select, slot);
                let row = &fitness[sub_pop * n..(sub_pop + 1) * n];
                *chosen = select_match(row, |p| compatibility.row(sub_pop, p), config, &mut rng);
            });
    }

    /// Breed the next generation, keeping `elites` unchanged.
    ///
    /// Runs selection, writes every offspring into the inactive buffer by
    /// crossover or cloning, rotates, mutates the new generation, restores
    /// elites from the previous one and recomputes compatibility.
    pub fn propagate(
        &mut self,
        elites: &[(usize, usize)],
    ) -> Result<GenerationStats, PopulationError> {
        self.check_elites(elites)?;
        self.select();
        Ok(self.advance(elites))
    }

    /// Like [`propagate`](Self::propagate), but with caller-chosen matches.
    ///
    /// Match indices are relative to each slot's sub-population. A match whose
    /// mate is the parent itself, or is not compatible with it, clones the
    /// parent instead.
    pub fn propagate_with_matches(
        &mut self,
        matches: &[Match],
        elites: &[(usize, usize)],
    ) -> Result<GenerationStats, PopulationError> {
        if matches.len() != self.shape.len() {
            return Err(PopulationError::LengthMismatch {
                expected: self.shape.len(),
                actual: matches.len(),
            });
        }
        self.check_elites(elites)?;

        let n = self.shape.num_individuals;
        for (slot, m) in matches.iter().enumerate() {
            if m.parent >= n || m.mate.is_some_and(|mate| mate >= n) {
                return Err(PopulationError::InvalidMatch {
                    slot,
                    parent: m.parent,
                    mate: m.mate,
                });
            }
        }

        self.refresh_compatibility();
        let threshold = self.config.compatibility_threshold;
        for (slot, (chosen, &m)) in self.matches.iter_mut().zip(matches).enumerate() {
            let (sub_pop, _) = self.shape.split(slot);
            let mate = m.mate.filter(|&mate| {
                mate != m.parent && self.compatibility.get(sub_pop, m.parent, mate) < threshold
            });
            if mate.is_none() && m.mate.is_some() {
                trace!("Slot {slot}: supplied mate {:?} is incompatible, cloning", m.mate);
            }
            *chosen = Match {
                parent: m.parent,
                mate,
            };
        }
        Ok(self.advance(elites))
    }

    fn advance(&mut self, elites: &[(usize, usize)]) -> GenerationStats {
        self.reproduce();
        self.rotate();
        let mutations = self.mutate_all();
        let restored = self.elite_mask(elites);
        let num_elites = self.restore_elites(elites);
        self.generation += 1;
        self.step += 1;
        self.analyze();

        let crossovers = self
            .matches
            .iter()
            .zip(&restored)
            .filter(|&(m, &elite)| m.mate.is_some() && !elite)
            .count();
        let clones = self.shape.len() - num_elites - crossovers;
        let stats = self.stats(crossovers, clones, num_elites, mutations);
        debug!(
            "Generation {}: {} crossovers, {} clones, {} elites, {} mutations, \
             mean size {:.1} nodes / {:.1} links",
            stats.generation,
            stats.crossovers,
            stats.clones,
            stats.elites,
            stats.mutations,
            stats.mean_nodes,
            stats.mean_links
        );
        stats
    }

    /// Write every offspring into the inactive buffer.
    fn reproduce(&mut self) {
        let (seed, step) = (self.seed, self.step);
        let n = self.shape.num_individuals;
        let config = &self.config;
        let matches = &self.matches;
        let [first, second] = &mut self.buffers;
        let (current, next) = if self.active == 0 {
            (&*first, second)
        } else {
            (&*second, first)
        };

        next.par_iter_mut()
            .zip(matches.par_iter())
            .enumerate()
            .for_each(|(slot, (child, m))| {
                let base = slot - slot % n;
                let parent = &current[base + m.parent];
                match m.mate {
                    Some(mate) => {
                        let mut rng = lane_rng(seed, step, Stage::Reproduce, slot);
                        let inherited =
                            crossover_into(child, parent, &current[base + mate], config, &mut rng);
                        trace!(
                            "Slot {slot}: crossover of {} x {mate}, {inherited} genes from mate",
                            m.parent
                        );
                    }
                    None => clone_into(child, parent),
                }
            });
    }

    /// Mutate every genome of the current generation. Returns the number of
    /// mutations applied.
    fn mutate_all(&mut self) -> usize {
        let (seed, step) = (self.seed, self.step);
        let config = &self.config;
        let innovations = &self.innovations;
        self.buffers[self.active]
            .par_iter_mut()
            .enumerate()
            .map(|(slot, genome)| {
                let mut rng = lane_rng(seed, step, Stage::Mutate, slot);
                genome.mutate(config, innovations, &mut rng)
            })
            .sum()
    }

    /// Which slots `elites` names, ignoring out-of-range entries.
    fn elite_mask(&self, elites: &[(usize, usize)]) -> Vec<bool> {
        let mut mask = vec![false; self.shape.len()];
        for &(sub_pop, individual) in elites {
            if self.shape.contains(sub_pop, individual) {
                mask[self.shape.index(sub_pop, individual)] = true;
            }
        }
        mask
    }

    /// Overwrite each elite's current genome with its genome from the
    /// previous buffer, storage and counts included. Returns the number of
    /// distinct slots restored; out-of-range entries are skipped.
    pub fn restore_elites(&mut self, elites: &[(usize, usize)]) -> usize {
        let mask = self.elite_mask(elites);
        let [first, second] = &mut self.buffers;
        let (current, previous) = if self.active == 0 {
            (first, &*second)
        } else {
            (second, &*first)
        };
        let mut restored = 0;
        for (slot, _) in mask.iter().enumerate().filter(|&(_, &elite)| elite) {
            current[slot].copy_raw_from(&previous[slot]);
            restored += 1;
        }
        self.stale = true;
        restored
    }

    /// Recompute the compatibility matrix if any genome changed since it was
    /// last computed.
    pub fn refresh_compatibility(&mut self) {
        if self.stale {
            trace!("Recomputing stale compatibility matrix");
            self.analyze();
        }
    }

    fn analyze(&mut self) {
        self.compatibility
            .update(&self.buffers[self.active], &self.config);
        self.stale = false;
    }

    fn stats(
        &self,
        crossovers: usize,
        clones: usize,
        elites: usize,
        mutations: usize,
    ) -> GenerationStats {
        let genomes = self.genomes();
        let total = genomes.len().max(1) as f32;
        GenerationStats {
            generation: self.generation,
            crossovers,
            clones,
            elites,
            mutations,
            mean_nodes: genomes.iter().map(|g| g.node_count() as f32).sum::<f32>() / total,
            mean_links: genomes.iter().map(|g| g.link_count() as f32).sum::<f32>() / total,
            diversity: (0..self.shape.num_sub_pops)
                .map(|sub_pop| self.compatibility.diversity(sub_pop))
                .collect(),
        }
    }

    // ------------------------------------------------------------------
    // Bulk transfer
    // ------------------------------------------------------------------

    /// Export the current generation as fixed-size records.
    ///
    /// Fails once the innovation counter has issued ids past `i32::MAX` and a
    /// genome still carries one.
    pub fn to_records(&self) -> Result<Vec<GenomeRecord>, PopulationError> {
        self.genomes()
            .par_iter()
            .enumerate()
            .map(|(index, genome)| {
                GenomeRecord::from_genome(genome)
                    .map_err(|source| PopulationError::Record { index, source })
            })
            .collect()
    }

    /// Replace the current generation with imported records.
    ///
    /// The innovation counter is advanced past every imported innovation, so
    /// links created afterwards never reuse one. Nothing changes on error.
    pub fn from_records(&mut self, records: &[GenomeRecord]) -> Result<(), PopulationError> {
        if records.len() != self.shape.len() {
            return Err(PopulationError::LengthMismatch {
                expected: self.shape.len(),
                actual: records.len(),
            });
        }
        let capacity = self.config.max_network_size;
        let genomes = records
            .par_iter()
            .enumerate()
            .map(|(index, record)| {
                if record.nodes.len() != capacity {
                    return Err(PopulationError::CapacityMismatch {
                        index,
                        expected: capacity,
                        actual: record.nodes.len(),
                    });
                }
                record
                    .to_genome()
                    .map_err(|source| PopulationError::Record { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(max) = records.iter().filter_map(GenomeRecord::max_innovation).max() {
            self.innovations.advance_past(max);
        }
        self.buffers[self.active] = genomes;
        self.analyze();
        debug!(
            "Imported {} genomes, innovation counter at {}",
            records.len(),
            self.innovations.peek()
        );
        Ok(())
    }

    /// The current generation as one flat byte buffer of records.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PopulationError> {
        let record_len = GenomeRecord::byte_len(self.config.max_network_size);
        let mut out = Vec::with_capacity(self.shape.len() * record_len);
        for record in self.to_records()? {
            record.write_bytes(&mut out);
        }
        Ok(out)
    }

    /// Replace the current generation from a buffer made by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(&mut self, bytes: &[u8]) -> Result<(), PopulationError> {
        let capacity = self.config.max_network_size;
        let record_len = GenomeRecord::byte_len(capacity);
        if bytes.len() != record_len * self.shape.len() {
            return Err(PopulationError::LengthMismatch {
                expected: record_len * self.shape.len(),
                actual: bytes.len(),
            });
        }
        let records = bytes
            .chunks_exact(record_len)
            .enumerate()
            .map(|(index, chunk)| {
                GenomeRecord::from_bytes(chunk, capacity)
                    .map_err(|source| PopulationError::Record { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.from_records(&records)
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Check every genome of the current generation. Reports the first
    /// invalid individual in slot order.
    pub fn validate_all(&self) -> Result<(), PopulationError> {
        let limit = self.innovations.peek();
        let failure = self
            .genomes()
            .par_iter()
            .enumerate()
            .find_map_first(|(slot, genome)| {
                validate(genome, &self.config, limit).err().map(|source| {
                    let (sub_pop, individual) = self.shape.split(slot);
                    PopulationError::Invalid {
                        sub_pop,
                        individual,
                        source,
                    }
                })
            });
        failure.map_or(Ok(()), Err)
    }

    /// Validate the current generation and panic with a full report if any
    /// genome is invalid.
    ///
    /// # Panics
    ///
    /// Panics on the first invalid genome.
    pub fn assert_valid(&self) {
        if let Err(err) = self.validate_all() {
            error!("{err}");
            panic!("{err}");
        }
    }
}
