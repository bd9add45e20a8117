//! Page readiness detection
//!
//! Decides whether a page has settled enough to be worth a screenshot by
//! running three bounded phases in order:
//!
//! 1. DOM stability: no mutation for one quiet period.
//! 2. Resources: every pending image/iframe/video loads, fails or hits its cap.
//! 3. Loading indicators: no visible skeleton/spinner, or the phase max wait.
//!
//! A global timeout pre-empts all of them. [`PageReadinessDetector::wait_for_page_ready`]
//! always returns a [`PageReadinessState`]; errors and timeouts become a
//! `reason`, never a failure.

pub mod probe;
pub mod skeleton;

pub use probe::{DocumentProbe, PendingResource, ReadinessProbe, ResourceKind, ResourceOutcome};
pub use skeleton::LoadingIndicatorPatterns;

use crate::config::ReadinessConfig;
use crate::error::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadinessPhase {
    Idle,
    WaitingDomStable,
    WaitingResources,
    WaitingSkeletons,
    Ready,
    TimedOut,
}

impl ReadinessPhase {
    fn describe(self) -> &'static str {
        match self {
            ReadinessPhase::Idle => "starting",
            ReadinessPhase::WaitingDomStable => "waiting for the DOM to settle",
            ReadinessPhase::WaitingResources => "waiting for resources",
            ReadinessPhase::WaitingSkeletons => "waiting for loading indicators",
            ReadinessPhase::Ready => "ready",
            ReadinessPhase::TimedOut => "timed out",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessChecks {
    pub dom_stable: bool,
    pub resources_loaded: bool,
    pub no_skeletons: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReadinessState {
    pub is_ready: bool,
    pub reason: String,
    /// Milliseconds spent in the check
    pub duration: u64,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Clone)]
struct Progress {
    phase: ReadinessPhase,
    checks: ReadinessChecks,
    timed_out_resources: usize,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            phase: ReadinessPhase::Idle,
            checks: ReadinessChecks::default(),
            timed_out_resources: 0,
        }
    }
}

/// How the phase pipeline finished when it ran to completion
enum Completion {
    Settled,
    IndicatorsLingering(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub struct PageReadinessDetector {
    config: ReadinessConfig,
    patterns: LoadingIndicatorPatterns,
}

impl PageReadinessDetector {
    pub fn new(config: ReadinessConfig) -> Self {
        Self {
            config,
            patterns: LoadingIndicatorPatterns::default(),
        }
    }

    pub fn with_patterns(mut self, patterns: LoadingIndicatorPatterns) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    /// Wait until the page behind `probe` looks settled, within `max_timeout`
    pub async fn wait_for_page_ready(&self, probe: &dyn ReadinessProbe) -> PageReadinessState {
        let started = Instant::now();
        let progress = Mutex::new(Progress::default());

        let result = tokio::time::timeout(self.config.max_timeout, self.run_phases(probe, &progress)).await;
        let duration = started.elapsed().as_millis() as u64;
        let progress = progress.lock().unwrap_or_else(|e| e.into_inner()).clone();

        let (phase, state) = match result {
            Ok(Ok(completion)) => {
                let mut reason = match completion {
                    Completion::Settled => {
                        "DOM stable, resources loaded, no loading indicators".to_string()
                    }
                    Completion::IndicatorsLingering(indicators) => format!(
                        "Loading indicators still visible after {}ms: {}",
                        self.config.skeleton_max_wait.as_millis(),
                        indicators.join(", ")
                    ),
                };
                if progress.timed_out_resources > 0 {
                    reason.push_str(&format!(
                        " ({} resource(s) did not finish loading)",
                        progress.timed_out_resources
                    ));
                }
                let state = PageReadinessState {
                    is_ready: true,
                    reason,
                    duration,
                    checks: progress.checks,
                };
                (ReadinessPhase::Ready, state)
            }
            Ok(Err(e)) => {
                log::warn!("Readiness check failed while {}: {}", progress.phase.describe(), e);
                let state = PageReadinessState {
                    is_ready: false,
                    reason: format!("Readiness check failed: {}", e),
                    duration,
                    checks: progress.checks,
                };
                (progress.phase, state)
            }
            Err(_) => {
                let interrupted = progress.phase;
                let is_ready = progress.checks.resources_loaded;
                let reason = if is_ready {
                    format!(
                        "Timed out after {}ms {}; DOM stable and resources loaded",
                        duration,
                        interrupted.describe()
                    )
                } else {
                    format!("Timed out after {}ms {}", duration, interrupted.describe())
                };
                log::warn!("{}", reason);
                let state = PageReadinessState {
                    is_ready,
                    reason,
                    duration,
                    checks: progress.checks,
                };
                (ReadinessPhase::TimedOut, state)
            }
        };

        log::debug!(
            "Readiness {:?} after {}ms: ready={} checks={:?}",
            phase,
            state.duration,
            state.is_ready,
            state.checks
        );
        state
    }

    async fn run_phases(&self, probe: &dyn ReadinessProbe, progress: &Mutex<Progress>) -> Result<Completion> {
        update(progress, |p| p.phase = ReadinessPhase::WaitingDomStable);
        self.wait_for_dom_stable(probe).await?;
        update(progress, |p| p.checks.dom_stable = true);

        update(progress, |p| p.phase = ReadinessPhase::WaitingResources);
        let timed_out = self.wait_for_resources(probe).await?;
        update(progress, |p| {
            p.checks.resources_loaded = true;
            p.timed_out_resources = timed_out;
        });

        update(progress, |p| p.phase = ReadinessPhase::WaitingSkeletons);
        let lingering = self.wait_for_indicators(probe).await?;
        if lingering.is_empty() {
            update(progress, |p| p.checks.no_skeletons = true);
            Ok(Completion::Settled)
        } else {
            Ok(Completion::IndicatorsLingering(lingering))
        }
    }

    async fn wait_for_dom_stable(&self, probe: &dyn ReadinessProbe) -> Result<()> {
        let mut mutations = 0u64;
        while probe.wait_for_mutation(self.config.quiet_period).await? {
            mutations += 1;
        }
        log::debug!("DOM stable after {} mutation burst(s)", mutations);
        Ok(())
    }

    /// Returns how many resources hit their individual cap
    async fn wait_for_resources(&self, probe: &dyn ReadinessProbe) -> Result<usize> {
        let pending = probe.pending_resources().await?;
        if pending.is_empty() {
            return Ok(0);
        }
        log::debug!("Waiting for {} pending resource(s)", pending.len());

        let cap = self.config.resource_timeout;
        let outcomes = join_all(pending.iter().map(|resource| async move {
            let outcome = match tokio::time::timeout(cap, probe.wait_for_resource(resource, cap)).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    log::debug!("Resource {:?} check failed, treating as settled: {}", resource.source, e);
                    ResourceOutcome::Failed
                }
                Err(_) => ResourceOutcome::TimedOut,
            };
            if outcome == ResourceOutcome::TimedOut {
                log::warn!(
                    "{:?} {} still loading after {}ms",
                    resource.kind,
                    resource.source.as_deref().unwrap_or("(no src)"),
                    cap.as_millis()
                );
            }
            outcome
        }))
        .await;

        Ok(outcomes
            .into_iter()
            .filter(|o| *o == ResourceOutcome::TimedOut)
            .count())
    }

    /// Returns the indicators still visible when the phase max wait elapsed
    async fn wait_for_indicators(&self, probe: &dyn ReadinessProbe) -> Result<Vec<String>> {
        let deadline = Instant::now() + self.config.skeleton_max_wait;
        loop {
            let visible = probe.visible_loading_indicators(&self.patterns).await?;
            if visible.is_empty() {
                return Ok(visible);
            }
            if Instant::now() >= deadline {
                log::warn!("Loading indicators still visible: {}", visible.join(", "));
                return Ok(visible);
            }
            sleep(self.config.skeleton_poll_interval).await;
        }
    }
}

fn update(progress: &Mutex<Progress>, f: impl FnOnce(&mut Progress)) {
    let mut guard = progress.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut guard);
}
