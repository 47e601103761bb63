//! # Index Samplers
//!
//! A [`Sampler`] yields one epoch of dataset indices per call;
//! [`BatchSampler`] groups an epoch into batches; [`InfiniteSampler`] chains
//! batch epochs forever.

use anyhow::ensure;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::seq::index::sample_weighted;
use std::collections::VecDeque;

/// A source of dataset indices.
pub trait Sampler: Send + std::fmt::Debug {
    /// The indices of the next epoch.
    fn epoch(&mut self) -> Vec<usize>;

    /// The number of indices per epoch.
    fn len(&self) -> usize;

    /// Does an epoch yield nothing?
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ``0..len`` in order.
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    len: usize,
}

impl SequentialSampler {
    /// Sample ``0..len``.
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Sampler for SequentialSampler {
    fn epoch(&mut self) -> Vec<usize> {
        (0..self.len).collect()
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// A fresh random permutation of ``0..len`` every epoch.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    len: usize,
    rng: StdRng,
}

impl RandomSampler {
    /// Permute ``0..len``, seeded.
    pub fn new(
        len: usize,
        seed: u64,
    ) -> Self {
        Self {
            len,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn epoch(&mut self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len).collect();
        indices.shuffle(&mut self.rng);
        indices
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// `num_samples` distinct indices per epoch, drawn with probability
/// proportional to `weights`.
#[derive(Debug, Clone)]
pub struct WeightedRandomSampler {
    weights: Vec<f64>,
    num_samples: usize,
    rng: StdRng,
}

impl WeightedRandomSampler {
    /// Build a weighted sampler without replacement.
    ///
    /// # Errors
    ///
    /// If a weight is negative or not finite, or fewer than `num_samples`
    /// weights are positive.
    pub fn new(
        weights: Vec<f64>,
        num_samples: usize,
        seed: u64,
    ) -> anyhow::Result<Self> {
        ensure!(
            weights.iter().all(|w| w.is_finite() && *w >= 0.0),
            "sample weights must be finite and non-negative"
        );
        let positive = weights.iter().filter(|w| **w > 0.0).count();
        ensure!(
            num_samples <= positive,
            "cannot draw {num_samples} distinct samples from {positive} positive weights"
        );
        Ok(Self {
            weights,
            num_samples,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl Sampler for WeightedRandomSampler {
    fn epoch(&mut self) -> Vec<usize> {
        let weights = &self.weights;
        // Weights were validated at construction.
        sample_weighted(
            &mut self.rng,
            weights.len(),
            |i| weights[i],
            self.num_samples,
        )
        .map(|indices| indices.into_vec())
        .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.num_samples
    }
}

/// Groups a [`Sampler`] epoch into batches.
#[derive(Debug)]
pub struct BatchSampler {
    sampler: Box<dyn Sampler>,
    batch_size: usize,
    drop_last: bool,
}

impl BatchSampler {
    /// Batch `sampler`.
    ///
    /// # Panics
    ///
    /// If `batch_size` is zero.
    pub fn new(
        sampler: Box<dyn Sampler>,
        batch_size: usize,
        drop_last: bool,
    ) -> Self {
        assert!(batch_size > 0, "batch_size must be positive");
        Self {
            sampler,
            batch_size,
            drop_last,
        }
    }

    /// Batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The batches of the next epoch.
    pub fn epoch(&mut self) -> Vec<Vec<usize>> {
        let batch_size = self.batch_size;
        let drop_last = self.drop_last;
        self.sampler
            .epoch()
            .chunks(batch_size)
            .filter(|chunk| !drop_last || chunk.len() == batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }

    /// The number of batches per epoch.
    pub fn len(&self) -> usize {
        let n = self.sampler.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Does an epoch yield no batches?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Re-runs a [`BatchSampler`] forever.
#[derive(Debug)]
pub struct InfiniteSampler {
    batch_sampler: BatchSampler,
    pending: VecDeque<Vec<usize>>,
}

impl InfiniteSampler {
    /// Wrap `batch_sampler`.
    pub fn new(batch_sampler: BatchSampler) -> Self {
        Self {
            batch_sampler,
            pending: VecDeque::new(),
        }
    }

    /// The wrapped batch sampler.
    pub fn batch_sampler(&self) -> &BatchSampler {
        &self.batch_sampler
    }
}

impl Iterator for InfiniteSampler {
    type Item = Vec<usize>;

    /// The next batch; `None` only if the wrapped sampler yields no batches.
    fn next(&mut self) -> Option<Self::Item> {
        if self.pending.is_empty() {
            self.pending.extend(self.batch_sampler.epoch());
        }
        self.pending.pop_front()
    }
}
