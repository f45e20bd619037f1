//! Training / validation partitioning.
//!
//! The balanced policy gives the model an even class mix to learn from while
//! keeping validation close to real failure prevalence. Sampling shuffles
//! index lists instead of popping from the pools, so a fixed seed reproduces
//! the exact same split.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::assembler::Sample;
use crate::config::{PipelineConfig, SplitPolicy};
use crate::error::PartitionError;
use crate::scanner::Label;

/// Final dataset split.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub training: Vec<Sample>,
    pub validation: Vec<Sample>,
    /// Healthy samples left over after the skewed validation draw.
    pub unused: usize,
}

/// Number of failing samples in a balanced training set of a pool with
/// `failing` failing samples: `floor(fraction × failing)`.
pub fn training_quota(failing: usize, fraction: f64) -> usize {
    (fraction * failing as f64).floor() as usize
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    }
}

fn shuffled(len: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..len).collect();
    idx.shuffle(rng);
    idx
}

/// Split pools according to `config.split`.
pub fn partition(
    healthy: Vec<Sample>,
    failing: Vec<Sample>,
    config: &PipelineConfig,
) -> Result<Partition, PartitionError> {
    match config.split {
        SplitPolicy::Balanced => {
            let mut rng = make_rng(config.seed);
            balanced_split(healthy, failing, config.train_fraction, &mut rng)
        }
        SplitPolicy::Horizon => Ok(horizon_split(healthy, failing)),
    }
}

/// Equal-split training set plus skewed validation set.
pub fn balanced_split(
    healthy: Vec<Sample>,
    failing: Vec<Sample>,
    train_fraction: f64,
    rng: &mut StdRng,
) -> Result<Partition, PartitionError> {
    if failing.is_empty() {
        return Err(PartitionError::NoFailingSamples);
    }
    let healthy_ratio = healthy.len() as f64 / failing.len() as f64;

    let mut quota = training_quota(failing.len(), train_fraction);
    if quota > healthy.len() {
        log::warn!(
            "only {} healthy samples for a training quota of {}; capping",
            healthy.len(),
            quota
        );
        quota = healthy.len();
    }

    let fail_order = shuffled(failing.len(), rng);
    let healthy_order = shuffled(healthy.len(), rng);

    let mut failing: Vec<Option<Sample>> = failing.into_iter().map(Some).collect();
    let mut healthy: Vec<Option<Sample>> = healthy.into_iter().map(Some).collect();

    let mut training = Vec::with_capacity(quota * 2);
    for (&f, &h) in fail_order.iter().zip(&healthy_order).take(quota) {
        training.extend(failing[f].take());
        training.extend(healthy[h].take());
    }

    let per_failure = healthy_ratio.round() as usize;
    let mut healthy_rest = healthy_order[quota..].iter();
    let mut validation = Vec::new();
    for &f in &fail_order[quota..] {
        validation.extend(failing[f].take());
        for &h in healthy_rest.by_ref().take(per_failure) {
            validation.extend(healthy[h].take());
        }
    }
    let unused = healthy_rest.count();

    log::info!(
        "balanced split: {} training, {} validation (ratio {:.2}, {} healthy unused)",
        training.len(),
        validation.len(),
        healthy_ratio,
        unused
    );
    Ok(Partition {
        training,
        validation,
        unused,
    })
}

/// Windows ending at the horizon validate; all others train.
pub fn horizon_split(healthy: Vec<Sample>, failing: Vec<Sample>) -> Partition {
    let (validation, training): (Vec<Sample>, Vec<Sample>) = failing
        .into_iter()
        .chain(healthy)
        .partition(|s| s.at_horizon);
    log::info!(
        "horizon split: {} training, {} validation",
        training.len(),
        validation.len()
    );
    Partition {
        training,
        validation,
        unused: 0,
    }
}

pub fn count_label(samples: &[Sample], label: Label) -> usize {
    samples.iter().filter(|s| s.label == label).count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
