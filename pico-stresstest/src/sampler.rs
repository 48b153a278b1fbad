//! Uniform random selection of containers to act on.

use rand::rngs::SmallRng;
use rand::seq::{IndexedRandom, index};
use rand::{Rng, SeedableRng};

/// A sample was requested that is larger than the population it is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cannot sample {requested} containers from a population of {population}")]
pub struct InvalidSampleSize {
    /// The requested sample size.
    pub requested: usize,
    /// The size of the population.
    pub population: usize,
}

/// Draws samples without replacement from a population.
///
/// All randomness comes from the RNG the sampler was constructed with, so two samplers seeded
/// identically yield identical samples.
#[derive(Debug)]
pub struct Sampler<R = SmallRng> {
    rng: R,
}

impl Sampler<SmallRng> {
    /// Creates a sampler driven by a [`SmallRng`] with the given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::new(SmallRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Sampler<R> {
    /// Creates a sampler driven by the given random source.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Selects `k` distinct elements of `population`, uniformly at random.
    ///
    /// Every subset of size `k` is equally likely. The returned elements are in the order they
    /// were drawn, not in population order.
    pub fn sample<T: Clone>(
        &mut self,
        population: &[T],
        k: usize,
    ) -> Result<Vec<T>, InvalidSampleSize> {
        if k > population.len() {
            return Err(InvalidSampleSize {
                requested: k,
                population: population.len(),
            });
        }

        Ok(index::sample(&mut self.rng, population.len(), k)
            .into_iter()
            .map(|i| population[i].clone())
            .collect())
    }

    /// Picks one of the candidates uniformly at random, or `None` if there are none.
    pub fn choose<'a, T>(&mut self, candidates: &'a [T]) -> Option<&'a T> {
        candidates.choose(&mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn population(size: usize) -> Vec<String> {
        (0..size).map(|i| format!("nginx-alpine-{i}")).collect()
    }

    #[test]
    fn samples_distinct_members() {
        let population = population(10);
        let mut sampler = Sampler::seeded(42);

        for k in 0..=10 {
            let sample = sampler.sample(&population, k).unwrap();
            let distinct: HashSet<_> = sample.iter().collect();

            assert_eq!(sample.len(), k);
            assert_eq!(distinct.len(), k);
            assert!(sample.iter().all(|name| population.contains(name)));
        }
    }

    #[test]
    fn rejects_oversized_sample() {
        let mut sampler = Sampler::seeded(42);
        let err = sampler.sample(&population(3), 4).unwrap_err();

        assert_eq!(
            err,
            InvalidSampleSize {
                requested: 4,
                population: 3
            }
        );
    }

    #[test]
    fn empty_population() {
        let mut sampler = Sampler::seeded(1);
        let empty: Vec<String> = Vec::new();

        assert!(sampler.sample(&empty, 0).unwrap().is_empty());
        assert!(sampler.sample(&empty, 1).is_err());
        assert!(sampler.choose(&empty).is_none());
    }

    #[test]
    fn deterministic_with_same_seed() {
        let population = population(50);
        let mut a = Sampler::seeded(7);
        let mut b = Sampler::seeded(7);

        for _ in 0..5 {
            assert_eq!(
                a.sample(&population, 20).unwrap(),
                b.sample(&population, 20).unwrap()
            );
        }
    }

    #[test]
    fn reaches_every_member() {
        // With enough draws, every member must show up at least once.
        let population = population(5);
        let mut sampler = Sampler::seeded(3);
        let mut seen = HashSet::new();

        for _ in 0..200 {
            seen.extend(sampler.sample(&population, 1).unwrap());
        }

        assert_eq!(seen.len(), population.len());
    }
}
