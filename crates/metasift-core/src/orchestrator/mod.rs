//! Drives retrieval for one URL: ranged probe, escalation, full fetch.
//!
//! The orchestrator owns no global state. The range registry is passed in and
//! shared between orchestrators through `Arc<tokio::sync::Mutex<_>>`, which is
//! only locked for the membership check and the failure record.

mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::cancel::Cancellation;
use crate::config::MetasiftConfig;
use crate::container;
use crate::error::ResolveError;
use crate::fetch::{classify, FetchRequest, Transport, TransportError};
use crate::metadata::MetadataMap;
use crate::range_registry::{host_of, RangeCapabilityRegistry};
use crate::sniff::ContainerKind;
use crate::stealth::StealthDecoder;

pub use state::{next_step, FetchStage, FetchState, Step, StepContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub probe_bytes: u64,
    pub escalation_bytes: u64,
    pub request_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&MetasiftConfig::default())
    }
}

impl From<&MetasiftConfig> for OrchestratorSettings {
    fn from(cfg: &MetasiftConfig) -> Self {
        Self {
            probe_bytes: cfg.probe_bytes.max(1),
            escalation_bytes: cfg.escalation_bytes.max(1),
            request_timeout: Duration::from_secs(cfg.request_timeout_secs.max(1)),
        }
    }
}

/// Result of one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub metadata: MetadataMap,
    pub container: ContainerKind,
    pub state: FetchState,
}

pub struct FetchOrchestrator<T> {
    transport: T,
    registry: Arc<Mutex<RangeCapabilityRegistry>>,
    settings: OrchestratorSettings,
    stealth: StealthDecoder,
}

/// Bytes obtained by one request.
struct Body {
    bytes: Vec<u8>,
    partial: bool,
    total_len: Option<u64>,
}

impl<T: Transport> FetchOrchestrator<T> {
    pub fn new(
        transport: T,
        registry: Arc<Mutex<RangeCapabilityRegistry>>,
        settings: OrchestratorSettings,
        stealth: StealthDecoder,
    ) -> Self {
        Self {
            transport,
            registry,
            settings,
            stealth,
        }
    }

    pub fn registry(&self) -> &Arc<Mutex<RangeCapabilityRegistry>> {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch as little of `url` as needed and extract its metadata.
    ///
    /// Only a failed full fetch is an error.
    pub async fn fetch(&self, url: &str) -> Result<FetchOutcome, ResolveError> {
        let host = host_of(url).map_err(|e| ResolveError::InvalidUrl {
            url: url.to_string(),
            reason: format!("{e:#}"),
        })?;
        let skip_ranges = self.registry.lock().await.is_range_incapable(&host);
        let mut state = FetchState::new(if skip_ranges {
            tracing::debug!(%url, %host, "host is range-incapable, fetching in full");
            FetchStage::FullFetch
        } else {
            FetchStage::ProbeRange
        });
        let mut want = self.settings.probe_bytes;

        loop {
            state.requests += 1;
            let body = if state.stage == FetchStage::FullFetch {
                self.fetch_full(url).await?
            } else {
                match self.fetch_range(url, &host, want).await {
                    Some(body) => body,
                    None => {
                        state.stage = FetchStage::FullFetch;
                        continue;
                    }
                }
            };
            state.bytes_fetched = body.bytes.len() as u64;
            state.partial = body.partial;

            let total = if body.partial {
                body.total_len
            } else {
                Some(state.bytes_fetched)
            };
            let (kind, outcome) = container::parse(&body.bytes, total);
            let ctx = StepContext {
                state,
                kind,
                escalation_bytes: self.settings.escalation_bytes,
                stealth_candidate: self.stealth.may_carry_payload(&body.bytes),
            };
            let step = next_step(&ctx, outcome);
            tracing::debug!(
                %url,
                stage = state.stage.index(),
                bytes = state.bytes_fetched,
                partial = state.partial,
                container = kind.as_str(),
                ?step,
                "fetch step"
            );
            match step {
                Step::Finish(metadata) => {
                    return Ok(FetchOutcome {
                        metadata,
                        container: kind,
                        state,
                    })
                }
                Step::Stealth => {
                    let metadata = self.decode_stealth(body.bytes).await;
                    return Ok(FetchOutcome {
                        metadata,
                        container: kind,
                        state,
                    });
                }
                Step::Escalate(n) => {
                    state.stage = FetchStage::EscalateRange;
                    want = n;
                }
                Step::FullFetch => state.stage = FetchStage::FullFetch,
            }
        }
    }

    /// Parse bytes supplied by the caller (no network). The bytes are taken as
    /// the whole resource.
    pub async fn evaluate_bytes(&self, bytes: Vec<u8>) -> (ContainerKind, MetadataMap) {
        let total = Some(bytes.len() as u64);
        let (kind, outcome) = container::parse(&bytes, total);
        let ctx = StepContext {
            state: FetchState {
                bytes_fetched: bytes.len() as u64,
                partial: false,
                stage: FetchStage::FullFetch,
                requests: 0,
            },
            kind,
            escalation_bytes: self.settings.escalation_bytes,
            stealth_candidate: self.stealth.may_carry_payload(&bytes),
        };
        match next_step(&ctx, outcome) {
            Step::Stealth => (kind, self.decode_stealth(bytes).await),
            Step::Finish(map) => (kind, map),
            // Unreachable for complete input.
            Step::Escalate(_) | Step::FullFetch => (kind, MetadataMap::new()),
        }
    }

    async fn fetch_full(&self, url: &str) -> Result<Body, ResolveError> {
        let request = FetchRequest::full(url, self.settings.request_timeout);
        let response = self
            .transport
            .fetch(request)
            .await
            .map_err(|source| ResolveError::Transport {
                url: url.to_string(),
                source,
            })?;
        Ok(Body {
            total_len: Some(response.body.len() as u64),
            bytes: response.body,
            partial: false,
        })
    }

    /// Ranged request for the first `len` bytes. `None` means the range
    /// attempt failed and the caller should fetch in full.
    async fn fetch_range(&self, url: &str, host: &str, len: u64) -> Option<Body> {
        let request = FetchRequest::prefix(url, len, self.settings.request_timeout);
        match self.transport.fetch(request).await {
            Ok(response) if response.is_partial_content() => {
                let held = response.body.len() as u64;
                let whole = held < len || response.total_len.is_some_and(|t| held >= t);
                Some(Body {
                    total_len: if whole { Some(held) } else { response.total_len },
                    bytes: response.body,
                    partial: !whole,
                })
            }
            Ok(response) if response.status == 200 => {
                // Range ignored; the body is the whole resource.
                tracing::debug!(%url, "range ignored, using full body");
                Some(Body {
                    total_len: Some(response.body.len() as u64),
                    bytes: response.body,
                    partial: false,
                })
            }
            Ok(response) => {
                tracing::debug!(%url, %host, status = response.status, "unexpected status for ranged request");
                self.registry.lock().await.record_range_failure(host);
                None
            }
            Err(TransportError::BodyTooLarge { limit }) => {
                // A whole body was sent for the range; the range was not refused.
                tracing::debug!(%url, limit, "range ignored and body over the cap");
                None
            }
            Err(e) => {
                tracing::debug!(%url, %host, error = %e, kind = ?classify(&e), "ranged request failed");
                self.registry.lock().await.record_range_failure(host);
                None
            }
        }
    }

    /// Alpha-channel decode on the blocking pool; stops if this future is dropped.
    async fn decode_stealth(&self, bytes: Vec<u8>) -> MetadataMap {
        let decoder = self.stealth;
        let cancel = Cancellation::new();
        let _guard = cancel.drop_guard();
        let task = tokio::task::spawn_blocking({
            let cancel = cancel.clone();
            move || decoder.decode_png(&bytes, &cancel)
        });
        match task.await {
            Ok(Some(map)) => {
                tracing::debug!("payload recovered from alpha channel");
                map
            }
            Ok(None) => MetadataMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "alpha channel decode task failed");
                MetadataMap::new()
            }
        }
    }
}
