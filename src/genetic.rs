//! Population search over complete schedules.
//!
//! A chromosome holds one [`Placement`] per required session, laid out group
//! by group in model order, so position `i` always belongs to the same group.
//! Genes are drawn from the group's static candidates, which keeps the search
//! inside faculty and room availability; collisions are left to the penalty.

use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::time::{Duration, Instant};

use crate::config::GeneticConfig;
use crate::constraints::{ConstraintSet, Fitness};
use crate::model::{Model, Placement};

/// One candidate schedule. Lower fitness is better; `None` until scored.
#[derive(Debug, Clone)]
pub struct Chromosome {
    pub genes: Vec<Placement>,
    pub fitness: Option<Fitness>,
}

impl Chromosome {
    fn unscored(genes: Vec<Placement>) -> Self {
        Self {
            genes,
            fitness: None,
        }
    }

    pub fn score(&self) -> Fitness {
        self.fitness.unwrap_or(Fitness::UNSCORED)
    }
}

/// Result of a run: the best chromosome ever seen and the per-generation best fitness.
#[derive(Debug, Clone)]
pub struct GeneticRun {
    pub best: Chromosome,
    pub history: Vec<Fitness>,
    pub generations: usize,
    pub elapsed: Duration,
}

pub struct GeneticSolver<'a> {
    model: &'a Model,
    constraints: &'a ConstraintSet,
    config: &'a GeneticConfig,
    /// Group index of every gene position.
    layout: Vec<usize>,
}

impl<'a> GeneticSolver<'a> {
    pub fn new(model: &'a Model, constraints: &'a ConstraintSet, config: &'a GeneticConfig) -> Self {
        let layout = model
            .groups
            .iter()
            .enumerate()
            .flat_map(|(idx, entry)| std::iter::repeat_n(idx, entry.group.required_sessions as usize))
            .collect();
        Self {
            model,
            constraints,
            config,
            layout,
        }
    }

    pub fn run(&self) -> GeneticRun {
        let start = Instant::now();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        if self.layout.is_empty() {
            let fitness = self.constraints.fitness(self.model, &[]);
            return GeneticRun {
                best: Chromosome {
                    genes: Vec::new(),
                    fitness: Some(fitness),
                },
                history: vec![fitness],
                generations: 0,
                elapsed: start.elapsed(),
            };
        }

        info!(
            "Starting population search: {} sessions, population {}, {} generations",
            self.layout.len(),
            self.config.population_size,
            self.config.generations
        );
        let mut population: Vec<Chromosome> = (0..self.config.population_size)
            .map(|_| self.random_chromosome(&mut rng))
            .collect();

        let mut best: Option<Chromosome> = None;
        let mut history = Vec::with_capacity(self.config.generations);
        let mut generations = 0;
        let deadline = self.config.time_limit().map(|limit| start + limit);

        for generation in 0..self.config.generations {
            self.score(&mut population);
            population.sort_by(|a, b| a.score().total_cmp(&b.score()));
            generations = generation + 1;

            let leader = &population[0];
            let fitness = leader.score();
            history.push(fitness);
            if best
                .as_ref()
                .is_none_or(|b| fitness.total_cmp(&b.score()) == Ordering::Less)
            {
                trace!(
                    "Generation {generation}: new best fitness {} hard, {} soft",
                    fitness.hard, fitness.soft
                );
                best = Some(leader.clone());
            }

            if fitness.is_zero() {
                info!("Zero-penalty schedule found at generation {generation}");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                debug!("Time ceiling reached after {generations} generations");
                break;
            }
            if generations == self.config.generations {
                break;
            }

            let survivors = population.len().div_ceil(2);
            population.truncate(survivors);
            while population.len() < self.config.population_size {
                let a = rng.gen_range(0..survivors);
                let b = rng.gen_range(0..survivors);
                let mut child = self.crossover(&population[a], &population[b], &mut rng);
                self.mutate(&mut child, &mut rng);
                population.push(child);
            }
        }

        let best = best.unwrap_or_else(|| population.swap_remove(0));
        info!(
            "Population search finished after {} generations in {:.2?}, best fitness {} hard, {} soft",
            generations,
            start.elapsed(),
            best.score().hard,
            best.score().soft
        );
        GeneticRun {
            best,
            history,
            generations,
            elapsed: start.elapsed(),
        }
    }

    fn random_gene<R: Rng>(&self, group: usize, rng: &mut R) -> Placement {
        let entry = &self.model.groups[group];
        let option = &entry.options[rng.gen_range(0..entry.options.len())];
        let (slot, room) = option.pairs[rng.gen_range(0..option.pairs.len())];
        Placement {
            group,
            faculty: option.faculty,
            slot,
            room,
        }
    }

    fn random_chromosome<R: Rng>(&self, rng: &mut R) -> Chromosome {
        Chromosome::unscored(
            self.layout
                .iter()
                .map(|group| self.random_gene(*group, rng))
                .collect(),
        )
    }

    /// Single-point crossover. The child owns fresh copies of both parent segments.
    fn crossover<R: Rng>(&self, p1: &Chromosome, p2: &Chromosome, rng: &mut R) -> Chromosome {
        let len = p1.genes.len();
        if len < 2 {
            return Chromosome::unscored(p1.genes.clone());
        }
        let cut = rng.gen_range(1..len);
        Chromosome::unscored(
            p1.genes[..cut]
                .iter()
                .chain(&p2.genes[cut..])
                .copied()
                .collect(),
        )
    }

    /// Re-draws faculty, slot and room of one random position.
    fn mutate<R: Rng>(&self, child: &mut Chromosome, rng: &mut R) {
        let pos = rng.gen_range(0..child.genes.len());
        child.genes[pos] = self.random_gene(self.layout[pos], rng);
        child.fitness = None;
    }

    fn score(&self, population: &mut [Chromosome]) {
        let evaluate = |c: &mut Chromosome| {
            if c.fitness.is_none() {
                c.fitness = Some(self.constraints.fitness(self.model, &c.genes));
            }
        };
        if self.config.parallel {
            population.par_iter_mut().for_each(evaluate);
        } else {
            population.iter_mut().for_each(evaluate);
        }
    }
}
