//! Brute-force k-nearest-neighbor search and the voting rules built on it.
//!
//! The index is an ordered, immutable list of normalized labeled vectors.
//! Every query scans the whole list and keeps a bounded, sorted top-k buffer;
//! candidates at equal distance keep their dataset order, so results never
//! depend on anything but the data.

use std::cmp::Ordering;

use crate::error::SearchError;
use crate::features::FeatureVector;
use crate::scanner::Label;

/// One row of a training or validation table.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledVector {
    pub label: Label,
    pub class_code: u8,
    pub features: FeatureVector,
    pub device: Option<String>,
}

/// A search hit: position in the index plus its label and distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub label: Label,
    pub distance: f64,
}

/// Euclidean distance over the feature columns.
pub fn euclidean(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Sorted buffer holding at most `k` neighbors.
struct TopK {
    k: usize,
    items: Vec<Neighbor>,
}

impl TopK {
    fn new(k: usize) -> Self {
        Self {
            k,
            items: Vec::with_capacity(k + 1),
        }
    }

    /// Offer a candidate. Candidates are offered in dataset order, and an
    /// equal distance never displaces an earlier entry.
    #[inline]
    fn offer(&mut self, candidate: Neighbor) {
        if self.items.len() == self.k {
            let worst = &self.items[self.k - 1];
            if candidate.distance.total_cmp(&worst.distance) != Ordering::Less {
                return;
            }
            self.items.pop();
        }
        let pos = self
            .items
            .partition_point(|n| n.distance.total_cmp(&candidate.distance) != Ordering::Greater);
        self.items.insert(pos, candidate);
    }

    fn into_vec(self) -> Vec<Neighbor> {
        self.items
    }
}

/// Immutable neighbor-search dataset.
#[derive(Debug, Clone, Default)]
pub struct NeighborIndex {
    vectors: Vec<LabeledVector>,
}

impl NeighborIndex {
    pub fn new(vectors: Vec<LabeledVector>) -> Self {
        Self { vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[LabeledVector] {
        &self.vectors
    }

    /// The `k` nearest vectors to `query`, ascending by distance.
    pub fn find_neighbors(
        &self,
        query: &FeatureVector,
        k: usize,
    ) -> Result<Vec<Neighbor>, SearchError> {
        if k == 0 {
            return Err(SearchError::ZeroNeighbors);
        }
        if k > self.vectors.len() {
            return Err(SearchError::InsufficientData {
                requested: k,
                available: self.vectors.len(),
            });
        }
        let mut top = TopK::new(k);
        for (index, v) in self.vectors.iter().enumerate() {
            top.offer(Neighbor {
                index,
                label: v.label,
                distance: euclidean(query, &v.features),
            });
        }
        Ok(top.into_vec())
    }

    /// Search and vote in one step.
    pub fn classify(
        &self,
        query: &FeatureVector,
        k: usize,
        voting: Voting,
    ) -> Result<Label, SearchError> {
        let neighbors = self.find_neighbors(query, k)?;
        Ok(voting.decide(&neighbors))
    }
}

/// Voting rule applied to a neighbor list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Voting {
    /// Healthy wins when `class_weight × healthy > failing`.
    Majority { class_weight: f64 },
    /// Each neighbor votes with `1 / distance`; an exact match votes 1.
    DistanceWeighted,
}

impl Default for Voting {
    fn default() -> Self {
        Self::Majority { class_weight: 1.0 }
    }
}

impl Voting {
    pub fn tally(self) -> Tally {
        Tally {
            voting: self,
            healthy: 0.0,
            failing: 0.0,
        }
    }

    pub fn decide(self, neighbors: &[Neighbor]) -> Label {
        let mut tally = self.tally();
        for n in neighbors {
            tally.add(n);
        }
        tally.decision()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Majority { .. } => "majority",
            Self::DistanceWeighted => "weighted",
        }
    }
}

impl std::fmt::Display for Voting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Majority { class_weight } => write!(f, "majority (w={class_weight})"),
            Self::DistanceWeighted => write!(f, "distance-weighted"),
        }
    }
}

/// Running vote over a growing neighbor prefix. After adding the j-th
/// neighbor, [`Tally::decision`] is the prediction for `k = j`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tally {
    voting: Voting,
    healthy: f64,
    failing: f64,
}

impl Tally {
    pub fn add(&mut self, neighbor: &Neighbor) {
        let weight = match self.voting {
            Voting::Majority { .. } => 1.0,
            Voting::DistanceWeighted => {
                if neighbor.distance == 0.0 {
                    1.0
                } else {
                    1.0 / neighbor.distance
                }
            }
        };
        match neighbor.label {
            Label::Healthy => self.healthy += weight,
            Label::Failing => self.failing += weight,
        }
    }

    pub fn healthy(&self) -> f64 {
        self.healthy
    }

    pub fn failing(&self) -> f64 {
        self.failing
    }

    pub fn decision(&self) -> Label {
        let healthy_wins = match self.voting {
            Voting::Majority { class_weight } => class_weight * self.healthy > self.failing,
            Voting::DistanceWeighted => self.healthy > self.failing,
        };
        if healthy_wins {
            Label::Healthy
        } else {
            Label::Failing
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
