//! Tournament selection of parents and compatible mates.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::NeatConfig;

/// The parents chosen for one offspring slot.
///
/// Indices are relative to the offspring's sub-population. When `mate` is
/// set, `parent` is never less fit than it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Match {
    pub parent: usize,
    pub mate: Option<usize>,
}

impl Match {
    /// A match that clones `parent`.
    #[must_use]
    pub const fn clone_of(parent: usize) -> Self {
        Self { parent, mate: None }
    }

    /// A match that crosses `parent` with `mate`.
    #[must_use]
    pub const fn crossover(parent: usize, mate: usize) -> Self {
        Self {
            parent,
            mate: Some(mate),
        }
    }
}

/// Draw `tournament_size` candidates uniformly (with replacement) and return
/// the fittest. Ties go to the earliest draw.
fn tournament<R: Rng + ?Sized>(
    fitness: &[f32],
    tournament_size: usize,
    rng: &mut R,
    mut draw: impl FnMut(&mut R) -> usize,
) -> usize {
    let mut best = draw(rng);
    for _ in 1..tournament_size {
        let candidate = draw(rng);
        if fitness[candidate] > fitness[best] {
            best = candidate;
        }
    }
    best
}

/// Choose the parents of one offspring.
///
/// `fitness` holds the fitness of every member of the sub-population and
/// `compatibility(p)` returns the distances from member `p` to every member.
/// The parent wins a tournament over the whole sub-population. Then, with
/// probability `crossover_rate`, a second tournament restricted to members
/// compatible with the parent picks a mate. If nobody is compatible, or
/// crossover is not attempted, the parent is cloned.
///
/// The parent is never its own mate candidate, even though its zero distance
/// to itself is below any positive threshold. Crossing a genome with itself
/// would only reproduce a clone, so a parent with no other compatible member
/// is cloned directly.
///
/// # Panics
///
/// Panics if `fitness` is empty.
pub fn select_match<'a, R: Rng + ?Sized>(
    fitness: &[f32],
    compatibility: impl FnOnce(usize) -> &'a [f32],
    config: &NeatConfig,
    rng: &mut R,
) -> Match {
    let n = fitness.len();
    let parent = tournament(fitness, config.tournament_size, rng, |rng| {
        rng.random_range(0..n)
    });

    if !rng.random_bool(f64::from(config.crossover_rate)) {
        return Match::clone_of(parent);
    }

    let distances = compatibility(parent);
    let is_candidate =
        |m: usize| m != parent && distances[m] < config.compatibility_threshold;
    let num_compatible = (0..n).filter(|&m| is_candidate(m)).count();
    if num_compatible == 0 {
        return Match::clone_of(parent);
    }

    // Draw the k-th compatible member instead of collecting the set.
    let mate = tournament(fitness, config.tournament_size, rng, |rng| {
        let k = rng.random_range(0..num_compatible);
        (0..n).filter(|&m| is_candidate(m)).nth(k).unwrap_or(parent)
    });

    if fitness[mate] > fitness[parent] {
        Match::crossover(mate, parent)
    } else {
        Match::crossover(parent, mate)
    }
}
