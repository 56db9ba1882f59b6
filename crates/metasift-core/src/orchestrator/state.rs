//! Adaptive-fetch state machine: stages and the transition function.
//!
//! `ProbeRange` → `EscalateRange` → `FullFetch`, each step taken only when the
//! bytes in hand are not enough. [`next_step`] is pure so every transition can
//! be tested without a network.

use crate::container::ParseOutcome;
use crate::metadata::MetadataMap;
use crate::sniff::ContainerKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    ProbeRange,
    EscalateRange,
    FullFetch,
}

impl FetchStage {
    /// 0 = first probe, 1 = escalated range, 2 = full fetch.
    pub fn index(self) -> u8 {
        match self {
            FetchStage::ProbeRange => 0,
            FetchStage::EscalateRange => 1,
            FetchStage::FullFetch => 2,
        }
    }
}

/// Per-request transient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchState {
    pub bytes_fetched: u64,
    /// The bytes in hand are a prefix, not the whole resource.
    pub partial: bool,
    pub stage: FetchStage,
    /// HTTP requests issued so far.
    pub requests: u32,
}

impl FetchState {
    pub fn new(stage: FetchStage) -> Self {
        Self {
            bytes_fetched: 0,
            partial: false,
            stage,
            requests: 0,
        }
    }
}

/// What to do after parsing the bytes in hand.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Finish(MetadataMap),
    /// Ranged request for the first `n` bytes.
    Escalate(u64),
    FullFetch,
    /// Complete PNG bytes with no chunk metadata: try the alpha channel.
    Stealth,
}

/// Inputs to [`next_step`] besides the parse outcome.
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    pub state: FetchState,
    pub kind: ContainerKind,
    pub escalation_bytes: u64,
    /// The alpha-channel reader would run on this image (size gate passed or unknown).
    pub stealth_candidate: bool,
}

pub fn next_step(ctx: &StepContext, outcome: ParseOutcome) -> Step {
    let state = ctx.state;
    match outcome {
        ParseOutcome::Complete(map) => {
            if !map.is_empty() || ctx.kind != ContainerKind::Png || !ctx.stealth_candidate {
                Step::Finish(map)
            } else if state.partial {
                // Pixel data must be complete before decoding.
                Step::FullFetch
            } else {
                Step::Stealth
            }
        }
        ParseOutcome::Incomplete {
            suggested_min_bytes,
        } => retry(ctx, suggested_min_bytes.max(ctx.escalation_bytes)),
        ParseOutcome::Failed(e) => {
            if state.partial {
                tracing::debug!(error = %e, stage = state.stage.index(), "parse failed on partial data");
                retry(ctx, ctx.escalation_bytes.max(state.bytes_fetched.saturating_mul(2)))
            } else {
                tracing::warn!(error = %e, "container unreadable, reporting no metadata");
                Step::Finish(MetadataMap::new())
            }
        }
    }
}

fn retry(ctx: &StepContext, want: u64) -> Step {
    match ctx.state.stage {
        FetchStage::ProbeRange if want > ctx.state.bytes_fetched => Step::Escalate(want),
        FetchStage::ProbeRange | FetchStage::EscalateRange => Step::FullFetch,
        FetchStage::FullFetch => {
            tracing::warn!("full body still reported incomplete");
            Step::Finish(MetadataMap::new())
        }
    }
}
