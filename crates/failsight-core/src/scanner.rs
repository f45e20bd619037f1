//! Event-driven window scanning.
//!
//! Each device timeline is cut into periods ending at "down" events and at
//! the observation horizon. Within a period the scanner steps backward from
//! the period end in strides of one window length, emitting candidate end
//! days until it reaches the floor left by the previous period. The first
//! window before a real failure is labeled failing; earlier windows are
//! healthy. An end day is emitted at most once per device, so a later period
//! never relabels a window an earlier period already produced.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{PeriodFloor, PipelineConfig};
use crate::timeline::EventStatus;

/// Binary sample label. "Positive" throughout the crate means failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Healthy,
    Failing,
}

impl Label {
    /// Table encoding: failing = 1, healthy = 0.
    pub fn code(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Failing => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Healthy),
            1 => Some(Self::Failing),
            _ => None,
        }
    }

    pub fn is_failing(self) -> bool {
        self == Self::Failing
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Failing => write!(f, "failing"),
        }
    }
}

/// A window end day proposed for sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Exclusive end of the window `[end_day - L, end_day)`.
    pub end_day: u32,
    /// 0 = window ends at the period's event, 1 = one stride earlier, ...
    pub dist_from_event: u32,
    pub label: Label,
}

/// Scanner parameters, usually taken from a [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct WindowScanner<'a> {
    pub sample_len: u32,
    pub horizon: u32,
    pub skip: &'a std::collections::BTreeSet<u32>,
    pub floor: PeriodFloor,
}

impl<'a> WindowScanner<'a> {
    pub fn from_config(config: &'a PipelineConfig) -> Self {
        Self {
            sample_len: config.sample_len,
            horizon: config.horizon,
            skip: &config.skip,
            floor: config.period_floor,
        }
    }

    /// Emit every candidate for one device's event log, in scan order.
    pub fn scan(&self, events: &BTreeMap<u32, EventStatus>) -> Vec<Candidate> {
        let len = self.sample_len;
        let horizon = self.horizon;
        let mut out = Vec::new();

        if len == 0 {
            return out;
        }

        let mut event_days: Vec<u32> = events.range(..=horizon).map(|(&d, _)| d).collect();
        if event_days.last() != Some(&horizon) {
            event_days.push(horizon);
        }
        let real_event_at_horizon = events.contains_key(&horizon);

        let mut emitted = BTreeSet::new();
        let mut floor = 0u32;
        for &event_day in &event_days {
            let is_period_end =
                event_day == horizon || matches!(events.get(&event_day), Some(EventStatus::Down));

            let mut cursor = event_day;
            if is_period_end {
                let mut dist = 0u32;
                while cursor >= floor && cursor - floor >= len {
                    if !self.skip.contains(&dist) && !emitted.contains(&cursor) {
                        let label = if cursor == horizon {
                            if real_event_at_horizon {
                                Label::Failing
                            } else {
                                Label::Healthy
                            }
                        } else if dist < 1 {
                            Label::Failing
                        } else {
                            Label::Healthy
                        };
                        emitted.insert(cursor);
                        out.push(Candidate {
                            end_day: cursor,
                            dist_from_event: dist,
                            label,
                        });
                    }
                    cursor -= len;
                    dist += 1;
                }
            }

            floor = match self.floor {
                PeriodFloor::Cursor => cursor,
                PeriodFloor::Event => event_day,
            };
        }

        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
