//! Fixed list of pipeline phases and a per-phase summary of a snapshot.
//!
//! The ledger keeps records in arrival order; front ends usually want one row
//! per known phase instead.

use crate::ledger::RunSnapshot;

/// One known pipeline phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseSpec {
    pub step: u32,
    pub name: &'static str,
    pub detail: &'static str,
}

/// Ordered catalog of the phases a run goes through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseCatalog {
    phases: Vec<PhaseSpec>,
}

impl Default for PhaseCatalog {
    fn default() -> Self {
        Self::new(vec![
            PhaseSpec {
                step: 1,
                name: "Web Research",
                detail: "Searching news, funding, and market sources",
            },
            PhaseSpec {
                step: 2,
                name: "Entity Extraction",
                detail: "AI extracting founders, investors, competitors",
            },
            PhaseSpec {
                step: 3,
                name: "Market Intelligence",
                detail: "M&A comps, risk signals, exit indicators",
            },
            PhaseSpec {
                step: 4,
                name: "Knowledge Graph",
                detail: "Building Neo4j relationship graph",
            },
            PhaseSpec {
                step: 5,
                name: "Investment Analysis",
                detail: "Red flags, exit scores, acquirer ranking",
            },
            PhaseSpec {
                step: 6,
                name: "Investment Memo",
                detail: "Writing full diligence memo",
            },
        ])
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseStatus {
    Pending,
    Active,
    Done,
}

/// Catalog phase joined with what the ledger knows about it.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseView {
    pub spec: PhaseSpec,
    pub status: PhaseStatus,
    /// Message of the most recent record for this step.
    pub latest_message: Option<String>,
    /// Elapsed seconds of the last finished record for this step.
    pub elapsed_seconds: Option<f64>,
}

/// Per-phase progress of one snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressSummary {
    pub phases: Vec<PhaseView>,
    pub done_count: usize,
    /// Step of the first record that is still open, if any.
    pub active_step: Option<u32>,
}

impl ProgressSummary {
    pub fn total(&self) -> usize {
        self.phases.len()
    }

    /// Whole-number percentage of finished catalog phases.
    pub fn percent(&self) -> u8 {
        if self.phases.is_empty() {
            return 0;
        }
        ((self.done_count * 100 + self.phases.len() / 2) / self.phases.len()) as u8
    }
}

impl PhaseCatalog {
    pub fn new(phases: Vec<PhaseSpec>) -> Self {
        Self { phases }
    }

    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    pub fn get(&self, step: u32) -> Option<&PhaseSpec> {
        self.phases.iter().find(|p| p.step == step)
    }

    pub fn summarize(&self, snapshot: &RunSnapshot) -> ProgressSummary {
        let active_step = snapshot
            .phases
            .iter()
            .find(|record| record.step.is_some() && !record.done)
            .and_then(|record| record.step);

        let phases: Vec<PhaseView> = self
            .phases
            .iter()
            .map(|spec| {
                let mut view = PhaseView {
                    spec: spec.clone(),
                    status: PhaseStatus::Pending,
                    latest_message: None,
                    elapsed_seconds: None,
                };
                let mut done = false;
                for record in snapshot.phases.iter().filter(|r| r.step == Some(spec.step)) {
                    view.latest_message = Some(record.message.clone());
                    if record.done {
                        done = true;
                        if record.elapsed_seconds.is_some() {
                            view.elapsed_seconds = record.elapsed_seconds;
                        }
                    }
                }
                view.status = if done {
                    PhaseStatus::Done
                } else if active_step == Some(spec.step) {
                    PhaseStatus::Active
                } else {
                    PhaseStatus::Pending
                };
                view
            })
            .collect();

        let done_count = phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Done)
            .count();
        ProgressSummary {
            phases,
            done_count,
            active_step,
        }
    }
}
