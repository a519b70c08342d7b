use crate::error::{AnalyzerError, Result};
use crate::stats::{sample_size, DEFAULT_ALPHA_LEVEL, DEFAULT_MARGIN_OF_ERROR};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform sampling without replacement over an id population.
pub struct RandomSampler<R: Rng> {
    rng: R,
    alpha_level: f64,
    margin_of_error: f64,
}

impl RandomSampler<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_os_rng())
    }
}

impl<R: Rng> RandomSampler<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            alpha_level: DEFAULT_ALPHA_LEVEL,
            margin_of_error: DEFAULT_MARGIN_OF_ERROR,
        }
    }

    /// Accuracy used to size a sample when no size is given.
    pub fn with_accuracy(mut self, alpha_level: f64, margin_of_error: f64) -> Self {
        self.alpha_level = alpha_level;
        self.margin_of_error = margin_of_error;
        self
    }

    /// Draw `size` distinct ids. Without a size, the sample is sized from the
    /// population for the sampler's accuracy, by default a 95% confidence
    /// level and a 1% margin of error.
    pub fn sample(&mut self, ids: &[i32], size: Option<usize>) -> Result<Vec<i32>> {
        if ids.is_empty() {
            return Err(AnalyzerError::EmptyPopulation {
                model: "ids".to_string(),
                post_type: "-".to_string(),
                tag: "-".to_string(),
            });
        }

        let size = match size {
            Some(size) => size,
            None => sample_size(ids.len() as u64, self.alpha_level, self.margin_of_error)? as usize,
        };
        if size > ids.len() {
            return Err(AnalyzerError::InsufficientPopulation {
                requested: size,
                available: ids.len(),
            });
        }

        Ok(rand::seq::index::sample(&mut self.rng, ids.len(), size)
            .into_iter()
            .map(|i| ids[i])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn population(n: i32) -> Vec<i32> {
        (1..=n).map(|i| i * 3).collect()
    }

    #[test]
    fn test_sample_draws_distinct_members() {
        let ids = population(500);
        let mut sampler = RandomSampler::seeded(51234);
        let sample = sampler.sample(&ids, Some(120)).unwrap();

        assert_eq!(sample.len(), 120);
        let unique: HashSet<_> = sample.iter().collect();
        assert_eq!(unique.len(), 120);
        assert!(sample.iter().all(|id| ids.contains(id)));
    }

    #[test]
    fn test_sample_is_reproducible_with_seed() {
        let ids = population(1_000);
        let a = RandomSampler::seeded(7).sample(&ids, Some(50)).unwrap();
        let b = RandomSampler::seeded(7).sample(&ids, Some(50)).unwrap();
        let c = RandomSampler::seeded(8).sample(&ids, Some(50)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sample_defaults_to_estimated_size() {
        let ids = population(20_000);
        let sample = RandomSampler::seeded(1).sample(&ids, None).unwrap();
        assert_eq!(sample.len(), 6489);

        // small populations are sampled entirely
        let small = population(20);
        let mut all = RandomSampler::seeded(1).sample(&small, None).unwrap();
        all.sort();
        assert_eq!(all, small);
    }

    #[test]
    fn test_sample_size_follows_configured_accuracy() {
        let ids = population(20_000);
        let sample = RandomSampler::seeded(1)
            .with_accuracy(0.05, 0.05)
            .sample(&ids, None)
            .unwrap();
        assert_eq!(sample.len(), 385);

        let invalid = RandomSampler::seeded(1).with_accuracy(0.05, 0.0).sample(&ids, None);
        assert!(matches!(invalid, Err(AnalyzerError::InvalidParameter(_))));
    }

    #[test]
    fn test_sample_whole_population_and_nothing() {
        let ids = population(10);
        assert_eq!(RandomSampler::seeded(3).sample(&ids, Some(10)).unwrap().len(), 10);
        assert!(RandomSampler::seeded(3).sample(&ids, Some(0)).unwrap().is_empty());
    }

    #[test]
    fn test_sample_errors() {
        let mut sampler = RandomSampler::seeded(0);
        assert!(matches!(
            sampler.sample(&[], Some(1)),
            Err(AnalyzerError::EmptyPopulation { .. })
        ));
        match sampler.sample(&[1, 2, 3], Some(4)) {
            Err(AnalyzerError::InsufficientPopulation { requested, available }) => {
                assert_eq!((requested, available), (4, 3));
            }
            other => panic!("expected insufficient population, got {other:?}"),
        }
    }
}
