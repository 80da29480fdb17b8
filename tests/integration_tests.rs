//! Integration tests for cppn-neat.

use std::collections::HashSet;

use cppn_neat::{
    align, compatibility, crossover_into, validate, Activation, Activator, CompatibilityReport,
    Genome, GenomeRecord, InnovationCounter, Link, Match, NeatConfig, Node, NodeKind, Population,
    PopulationError, PopulationShape,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Fitness that rewards outputs close to `x * y` on a small grid.
fn grid_fitness(population: &Population) -> Vec<f32> {
    let mut activator = Activator::new(population.config());
    population
        .genomes()
        .iter()
        .map(|genome| {
            let mut error = 0.0;
            for y in 0..4 {
                for x in 0..4 {
                    let (x, y) = (x as f32 / 3.0, y as f32 / 3.0);
                    activator.reset();
                    let out = activator.evaluate(genome, &[x, y])[0];
                    error += if out.is_finite() { (out - x * y).powi(2) } else { 1.0 };
                }
            }
            16.0 - error
        })
        .collect()
}

#[test]
fn test_full_evolution_cycle() {
    let config = NeatConfig {
        mutation_rate: 0.05,
        ..NeatConfig::cppn(2, 1)
    };
    let mut population = Population::new(config, PopulationShape::new(3, 16), 42).unwrap();
    population.assert_valid();

    for generation in 1..=20 {
        let fitness = grid_fitness(&population);
        population.set_fitnesses(&fitness).unwrap();
        let stats = population.propagate(&[]).unwrap();

        assert_eq!(stats.generation, generation);
        assert_eq!(stats.crossovers + stats.clones, 48);
        assert!(stats.mean_nodes >= 3.0);
        assert!(stats.diversity.iter().all(|d| d.is_finite() && *d >= 0.0));
        population.assert_valid();
    }

    for genome in population.genomes() {
        assert!(genome.node_count() <= population.config().max_network_size);
        assert!(genome.link_count() <= population.config().max_network_size);
    }
}

#[test]
fn test_recurrent_evolution_cycle() {
    let config = NeatConfig {
        mutation_rate: 0.1,
        ..NeatConfig::recurrent(3, 2)
    };
    let mut population = Population::new(config, PopulationShape::new(2, 12), 7).unwrap();

    for _ in 0..15 {
        let fitness: Vec<f32> = population
            .genomes()
            .iter()
            .map(|g| g.node_count() as f32)
            .collect();
        population.set_fitnesses(&fitness).unwrap();
        population.propagate(&[]).unwrap();
        population.assert_valid();
    }
}

#[test]
fn test_elites_bypass_the_pipeline() {
    let config = NeatConfig {
        mutation_rate: 0.5,
        ..NeatConfig::cppn(2, 2)
    };
    let mut population = Population::new(config, PopulationShape::new(2, 10), 3).unwrap();
    let elites = [(0, 4), (1, 9)];

    for _ in 0..5 {
        let before: Vec<Genome> = elites
            .iter()
            .map(|&(sp, i)| population.genome(sp, i).clone())
            .collect();
        population.propagate(&elites).unwrap();
        for (&(sp, i), genome) in elites.iter().zip(&before) {
            assert_eq!(population.genome(sp, i), genome);
        }
    }
    population.assert_valid();
}

#[test]
fn test_offspring_only_carry_known_innovations() {
    let config = NeatConfig {
        crossover_rate: 1.0,
        compatibility_threshold: f32::INFINITY,
        mutation_rate: 0.0,
        ..NeatConfig::cppn(2, 1)
    };
    let mut population = Population::new(config, PopulationShape::new(1, 20), 11).unwrap();
    let parents = population.genomes().to_vec();
    let fitness: Vec<f32> = (0..20).map(|k| k as f32).collect();
    population.set_fitnesses(&fitness).unwrap();

    let stats = population.propagate(&[]).unwrap();
    assert!(stats.crossovers > 0);

    // Without mutation, each child's genes are exactly its parent's.
    for (child, m) in population.genomes().iter().zip(population.matches()) {
        let parent = &parents[m.parent];
        let expected: Vec<u32> = parent.links().iter().map(|l| l.innovation).collect();
        let actual: Vec<u32> = child.links().iter().map(|l| l.innovation).collect();
        assert_eq!(actual, expected);
        if let Some(mate) = m.mate {
            assert!(fitness[m.parent] >= fitness[mate]);
        }
    }
}

#[test]
fn test_supplied_matches_drive_reproduction() {
    let config = NeatConfig {
        mutation_rate: 0.0,
        compatibility_threshold: f32::INFINITY,
        ..NeatConfig::cppn(2, 1)
    };
    let mut population = Population::new(config, PopulationShape::new(2, 4), 5).unwrap();
    let parents = population.genomes().to_vec();

    // Every slot clones individual 1 of its sub-population, except slot 0
    // which crosses 2 with 3.
    let mut matches = vec![Match::clone_of(1); 8];
    matches[0] = Match::crossover(2, 3);
    let stats = population.propagate_with_matches(&matches, &[]).unwrap();
    assert_eq!(stats.crossovers, 1);
    assert_eq!(stats.clones, 7);

    for slot in 1..8 {
        let source = &parents[slot / 4 * 4 + 1];
        assert_eq!(population.genomes()[slot].nodes(), source.nodes());
        assert_eq!(population.genomes()[slot].links(), source.links());
    }
    let child_innovations: Vec<u32> = population.genomes()[0]
        .links()
        .iter()
        .map(|l| l.innovation)
        .collect();
    let parent_innovations: Vec<u32> = parents[2].links().iter().map(|l| l.innovation).collect();
    assert_eq!(child_innovations, parent_innovations);
}

#[test]
fn test_incompatible_supplied_mates_clone() {
    let config = NeatConfig {
        mutation_rate: 0.0,
        compatibility_threshold: f32::NEG_INFINITY,
        ..NeatConfig::cppn(2, 1)
    };
    let mut population = Population::new(config, PopulationShape::new(1, 4), 6).unwrap();
    let matches = vec![Match::crossover(0, 1); 4];
    let stats = population.propagate_with_matches(&matches, &[]).unwrap();
    assert_eq!(stats.crossovers, 0);
    assert!(population.matches().iter().all(|m| m.mate.is_none()));
}

#[test]
fn test_compatibility_scenario() {
    let genome = |genes: &[u32]| {
        let mut g = Genome::new(10);
        g.push_node(Node::input());
        g.push_node(Node::input());
        g.push_node(Node::output(Activation::Sigmoid, 0.0, 1.0));
        for (k, &innovation) in genes.iter().enumerate() {
            g.push_link(Link::new(k % 2, 2, 0.5, innovation));
        }
        g
    };
    let a = genome(&[1, 2, 3]);
    let b = genome(&[1, 2, 4]);

    let report = CompatibilityReport::between(&a, &b);
    assert_eq!(report.num_disjoint, 2);
    assert_eq!(report.num_common, 2);

    let config = NeatConfig::default();
    assert_eq!(compatibility(&a, &b, &config), compatibility(&b, &a, &config));
    assert_eq!(align(&a, &b).num_matched(), 2);
}

#[test]
fn test_compatibility_is_symmetric_across_population() {
    let population = Population::new(
        NeatConfig::cppn(3, 2),
        PopulationShape::new(1, 12),
        9,
    )
    .unwrap();
    let config = population.config();
    let genomes = population.genomes();
    for a in genomes {
        for b in genomes {
            assert_eq!(compatibility(a, b, config), compatibility(b, a, config));
        }
    }
}

#[test]
fn test_crossover_parentage_over_many_pairs() {
    let config = NeatConfig::cppn(3, 1);
    let innovations = InnovationCounter::new();
    let mut rng = ChaCha8Rng::seed_from_u64(77);
    let mut child = Genome::new(config.max_network_size);

    for _ in 0..50 {
        let mut parent = Genome::new(config.max_network_size);
        parent.random_init(&config, &innovations, &mut rng);
        let mut mate = parent.clone();
        for _ in 0..6 {
            mate.mutate_one(&config, &innovations, &mut rng);
        }

        crossover_into(&mut child, &parent, &mate, &config, &mut rng);
        let parent_genes: HashSet<u32> = parent.links().iter().map(|l| l.innovation).collect();
        assert!(child.links().iter().all(|l| parent_genes.contains(&l.innovation)));
        assert!(validate(&child, &config, innovations.peek()).is_ok());
    }
}

#[test]
fn test_insert_delete_round_trip_on_random_genomes() {
    let config = NeatConfig::cppn(2, 2);
    let innovations = InnovationCounter::new();
    let mut rng = ChaCha8Rng::seed_from_u64(13);

    for _ in 0..20 {
        let mut genome = Genome::new(config.max_network_size);
        genome.random_init(&config, &innovations, &mut rng);
        if !genome.has_room_for(1, 0) {
            continue;
        }
        let before = genome.clone();
        for position in config.num_inputs..genome.node_count() - config.num_outputs + 1 {
            assert!(genome.insert_node(position, Node::hidden(Activation::Relu, 0.0, 1.0)));
            assert!(validate(&genome, &config, innovations.peek()).is_ok());
            assert!(genome.delete_node(position));
            assert_eq!(genome.nodes(), before.nodes());
            assert_eq!(genome.links(), before.links());
        }
    }
}

#[test]
fn test_capacity_ceiling_under_growth() {
    let config = NeatConfig {
        max_network_size: 12,
        ..NeatConfig::cppn(2, 1)
    };
    let innovations = InnovationCounter::new();
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut genome = Genome::new(config.max_network_size);
    genome.init_interface(&config, &mut rng);

    for _ in 0..200 {
        genome.add_random_node(&config, &innovations, &mut rng);
        genome.add_random_link(&config, &innovations, &mut rng);
        assert!(genome.node_count() <= 12);
        assert!(genome.link_count() <= 12);
    }
    assert!(validate(&genome, &config, innovations.peek()).is_ok());
}

#[test]
fn test_records_round_trip_through_population() {
    let mut population = Population::new(
        NeatConfig::cppn(2, 1),
        PopulationShape::new(2, 6),
        21,
    )
    .unwrap();
    population.propagate(&[]).unwrap();
    let records = population.to_records().unwrap();
    assert_eq!(records.len(), 12);

    for (record, genome) in records.iter().zip(population.genomes()) {
        assert_eq!(record.nodes.len(), population.config().max_network_size);
        let live = record.nodes.iter().filter(|n| !n.is_sentinel()).count();
        assert_eq!(live, genome.node_count());
        assert!(record.links[genome.link_count()..]
            .iter()
            .all(|l| l.is_sentinel() && l.weight.is_nan()));
    }

    let mut fresh = Population::new(NeatConfig::cppn(2, 1), PopulationShape::new(2, 6), 0).unwrap();
    fresh.innovations().reset();
    fresh.from_records(&records).unwrap();
    let max = records.iter().filter_map(GenomeRecord::max_innovation).max().unwrap_or(0);
    assert!(fresh.innovations().peek() > max);
    for (a, b) in fresh.genomes().iter().zip(population.genomes()) {
        assert_eq!(a.nodes(), b.nodes());
        assert_eq!(a.links(), b.links());
    }
    fresh.assert_valid();

    assert!(matches!(
        fresh.from_records(&records[..3]),
        Err(PopulationError::LengthMismatch { expected: 12, actual: 3 })
    ));
}

#[test]
fn test_corrupted_genome_is_reported() {
    let mut population = Population::new(
        NeatConfig::cppn(2, 1),
        PopulationShape::new(1, 3),
        2,
    )
    .unwrap();
    let genome = population.genome_mut(0, 2);
    let output = genome.node_count() - 1;
    genome.push_link(Link::new(output, 0, 0.1, 0));

    let err = population.validate_all().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("(0, 2)"));
    assert!(message.contains("targets input node 0"));
}

#[test]
#[should_panic(expected = "is invalid")]
fn test_assert_valid_panics_on_corruption() {
    let mut population = Population::new(
        NeatConfig::cppn(2, 1),
        PopulationShape::new(1, 2),
        2,
    )
    .unwrap();
    population
        .genome_mut(0, 0)
        .set_node(0, Node::new(NodeKind::Hidden, Activation::Tanh, 0.0, 1.0));
    population.assert_valid();
}
