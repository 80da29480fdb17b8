//! Genetic distance and innovation alignment between genomes.
//!
//! Two links are the "same gene" when they carry the same innovation number.
//! Both operations here sort each genome's innovations into fixed-size stack
//! buffers and merge them, so no heap allocation happens per pair and shared
//! genes are always visited in ascending innovation order. Visiting them in a
//! canonical order makes the distance exactly symmetric: `|a - b|` terms are
//! summed in the same sequence whichever genome comes first.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{NeatConfig, PopulationShape};
use crate::gene::MAX_CAPACITY;
use crate::genome::Genome;

/// Guards the distance formula against division by zero.
pub const EPSILON: f32 = 1e-8;

/// `(innovation, link index)` pairs of a genome, sorted by innovation.
fn sorted_innovations(genome: &Genome) -> ([(u32, u8); MAX_CAPACITY], usize) {
    let mut keys = [(0u32, 0u8); MAX_CAPACITY];
    let len = genome.link_count().min(MAX_CAPACITY);
    for (slot, (l, link)) in keys.iter_mut().zip(genome.links().iter().enumerate()) {
        *slot = (link.innovation, l as u8);
    }
    keys[..len].sort_unstable();
    (keys, len)
}

/// Walk both genomes' links in innovation order, calling `on_common` for
/// every shared gene with the two link indices, and return the number of
/// genes present in only one of them.
fn merge_links(a: &Genome, b: &Genome, mut on_common: impl FnMut(usize, usize)) -> usize {
    let (a_keys, a_len) = sorted_innovations(a);
    let (b_keys, b_len) = sorted_innovations(b);
    let (a_keys, b_keys) = (&a_keys[..a_len], &b_keys[..b_len]);

    let (mut i, mut j) = (0, 0);
    let mut disjoint = 0;
    while i < a_keys.len() && j < b_keys.len() {
        let (a_innov, a_link) = a_keys[i];
        let (b_innov, b_link) = b_keys[j];
        match a_innov.cmp(&b_innov) {
            std::cmp::Ordering::Equal => {
                on_common(a_link as usize, b_link as usize);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                disjoint += 1;
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                disjoint += 1;
                j += 1;
            }
        }
    }
    disjoint + (a_keys.len() - i) + (b_keys.len() - j)
}

/// For every link of one genome, the index of the matching link in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    partners: [Option<u8>; MAX_CAPACITY],
    len: usize,
}

impl Alignment {
    /// The index in the second genome of the link matching link `index` of
    /// the first, if the second genome has that gene.
    #[inline]
    #[must_use]
    pub fn partner(&self, index: usize) -> Option<usize> {
        self.partners[..self.len]
            .get(index)
            .copied()
            .flatten()
            .map(usize::from)
    }

    /// Number of links in the first genome.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the first genome has no links.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of links of the first genome that have a partner.
    #[must_use]
    pub fn num_matched(&self) -> usize {
        self.partners[..self.len].iter().flatten().count()
    }
}

/// Match every link of `a` to the link of `b` with the same innovation number.
#[must_use]
pub fn align(a: &Genome, b: &Genome) -> Alignment {
    let mut partners = [None; MAX_CAPACITY];
    merge_links(a, b, |a_link, b_link| partners[a_link] = Some(b_link as u8));
    Alignment {
        partners,
        len: a.link_count(),
    }
}

/// The raw terms of the distance between two genomes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// Links present in exactly one of the genomes.
    pub num_disjoint: usize,
    /// Links present in both.
    pub num_common: usize,
    /// Sum of `|w_a - w_b|` over the common links.
    pub weight_delta: f32,
    /// Link count of the larger genome.
    pub max_links: usize,
}

impl CompatibilityReport {
    /// Compare two genomes.
    #[must_use]
    pub fn between(a: &Genome, b: &Genome) -> Self {
        let mut num_common = 0;
        let mut weight_delta = 0.0;
        let num_disjoint = merge_links(a, b, |a_link, b_link| {
            num_common += 1;
            weight_delta += (a.links()[a_link].weight - b.links()[b_link].weight).abs();
        });
        Self {
            num_disjoint,
            num_common,
            weight_delta,
            max_links: a.link_count().max(b.link_count()),
        }
    }

    /// Weighted distance: normalized disjoint count plus mean weight delta.
    /// Lower is more similar.
    #[must_use]
    pub fn distance(&self, config: &NeatConfig) -> f32 {
        let disjoint = self.num_disjoint as f32 / (self.max_links as f32).max(EPSILON);
        let weights = self.weight_delta / (self.num_common as f32).max(EPSILON);
        config.disjoint_coeff * disjoint + config.weight_coeff * weights
    }
}

/// Genetic distance between two genomes. Symmetric in its arguments.
#[must_use]
pub fn compatibility(a: &Genome, b: &Genome, config: &NeatConfig) -> f32 {
    CompatibilityReport::between(a, b).distance(config)
}

/// Whether two genomes are similar enough to breed.
#[must_use]
pub fn is_compatible(a: &Genome, b: &Genome, config: &NeatConfig) -> bool {
    compatibility(a, b, config) < config.compatibility_threshold
}

/// Pairwise distances within each sub-population.
///
/// One symmetric `n × n` matrix per sub-population, stored row-major. The
/// diagonal is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityMatrix {
    num_individuals: usize,
    values: Vec<f32>,
}

impl CompatibilityMatrix {
    /// An all-zero matrix for `shape`.
    #[must_use]
    pub fn new(shape: PopulationShape) -> Self {
        Self {
            num_individuals: shape.num_individuals,
            values: vec![0.0; shape.num_sub_pops * shape.num_individuals * shape.num_individuals],
        }
    }

    /// Recompute every distance from `genomes`, laid out sub-population major.
    ///
    /// Rows are filled in parallel, each computing only its upper-triangle
    /// entries, then mirrored.
    pub fn update(&mut self, genomes: &[Genome], config: &NeatConfig) {
        let n = self.num_individuals;
        if n == 0 {
            return;
        }
        self.values
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(row_index, row)| {
                let sub_pop = row_index / n;
                let p = row_index % n;
                let base = sub_pop * n;
                row[p] = 0.0;
                for m in p + 1..n {
                    row[m] = compatibility(&genomes[base + p], &genomes[base + m], config);
                }
            });

        for matrix in self.values.chunks_mut(n * n) {
            for p in 0..n {
                for m in p + 1..n {
                    matrix[m * n + p] = matrix[p * n + m];
                }
            }
        }
    }

    /// Distances from individual `p` to every member of its sub-population.
    #[inline]
    #[must_use]
    pub fn row(&self, sub_pop: usize, p: usize) -> &[f32] {
        let start = (sub_pop * self.num_individuals + p) * self.num_individuals;
        &self.values[start..start + self.num_individuals]
    }

    /// Distance between individuals `p` and `m` of one sub-population.
    #[inline]
    #[must_use]
    pub fn get(&self, sub_pop: usize, p: usize, m: usize) -> f32 {
        self.row(sub_pop, p)[m]
    }

    /// Mean pairwise distance within a sub-population, or 0 with fewer than
    /// two individuals.
    #[must_use]
    pub fn diversity(&self, sub_pop: usize) -> f32 {
        let n = self.num_individuals;
        if n < 2 {
            return 0.0;
        }
        let mut total = 0.0f64;
        for p in 0..n {
            let row = self.row(sub_pop, p);
            total += row[p + 1..].iter().map(|&d| f64::from(d)).sum::<f64>();
        }
        let pairs = (n * (n - 1) / 2) as f64;
        (total / pairs) as f32
    }
}
