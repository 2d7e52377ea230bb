//! Routing policy for a run. Pure: the same state always yields the same
//! decision, and nothing here awaits or touches I/O.

use serde::{Deserialize, Serialize};

use crate::{
    state::PipelineState,
    types::{Action, Decision, Stage},
};

pub const MAX_REVISIONS: u32 = 2;
pub const MAX_CLARIFICATIONS: u32 = 1;
pub const MAX_TOTAL_ITERATIONS: u32 = MAX_REVISIONS + MAX_CLARIFICATIONS;

/// Iteration budgets for the revision and clarification loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopPolicy {
    pub max_revisions: u32,
    pub max_clarifications: u32,
    /// Ceiling on revisions and clarifications combined.
    pub max_total_iterations: u32,
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self {
            max_revisions: MAX_REVISIONS,
            max_clarifications: MAX_CLARIFICATIONS,
            max_total_iterations: MAX_TOTAL_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Supervisor {
    policy: LoopPolicy,
}

impl Supervisor {
    pub fn new(policy: LoopPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> LoopPolicy {
        self.policy
    }

    pub fn decide(&self, state: &PipelineState) -> Decision {
        if state.is_failed() {
            let error = state.error.as_deref().unwrap_or("unknown error");
            return Decision::new(Action::Abort, format!("Pipeline failed: {error}"));
        }

        match &state.current_stage {
            Stage::Start => Decision::new(Action::Extract, "Starting pipeline with document extraction"),
            Stage::Extracted => {
                Decision::new(Action::Analyze, "Extraction complete, proceeding to analysis")
            }
            Stage::Analyzed => {
                Decision::new(Action::Write, "Analysis complete, proceeding to report generation")
            }
            Stage::Written => {
                Decision::new(Action::Qc, "Report generated, proceeding to QC verification")
            }
            Stage::QcComplete => self.after_qc(state),
            Stage::Clarified => {
                Decision::new(Action::Write, "Clarification received, regenerating report")
            }
            Stage::Revised => Decision::new(Action::Qc, "Report revised, re-running QC verification"),
            Stage::Finalized | Stage::Aborted => Decision::new(
                Action::Abort,
                format!("Stage {} is terminal and has no transitions", state.current_stage),
            ),
            Stage::Unrecognized(tag) => Decision::new(Action::Abort, format!("Unknown stage: {tag}")),
        }
    }

    fn after_qc(&self, state: &PipelineState) -> Decision {
        let p = &self.policy;
        let score = state.qc_score;
        let loops = state.revision_count + state.clarification_count;
        let within_total = loops < p.max_total_iterations;

        if state.qc_passed {
            return Decision::new(
                Action::Finalize,
                format!("QC passed with score {score}, finalizing report"),
            );
        }
        if state.needs_clarification && state.clarification_count < p.max_clarifications && within_total {
            return Decision::new(
                Action::Clarify,
                format!(
                    "QC needs clarification (attempt {}/{})",
                    state.clarification_count + 1,
                    p.max_clarifications
                ),
            );
        }
        if state.needs_revision && state.revision_count < p.max_revisions && within_total {
            return Decision::new(
                Action::Revise,
                format!(
                    "QC score {score} below threshold, revision needed (attempt {}/{})",
                    state.revision_count + 1,
                    p.max_revisions
                ),
            );
        }
        if state.revision_count >= p.max_revisions {
            return Decision::new(
                Action::Finalize,
                format!(
                    "Max revisions ({}) reached, finalizing with score {score}",
                    p.max_revisions
                ),
            )
            .degraded();
        }
        if !within_total && (state.needs_revision || state.needs_clarification) {
            return Decision::new(
                Action::Finalize,
                format!(
                    "Max total iterations ({}) reached, finalizing with score {score}",
                    p.max_total_iterations
                ),
            )
            .degraded();
        }
        // Named default: nothing left to fix or ask, accept the draft as is.
        Decision::new(Action::Finalize, format!("Finalizing report with score {score}"))
    }
}

/// Decision under the default loop policy.
pub fn decide(state: &PipelineState) -> Decision {
    Supervisor::default().decide(state)
}
