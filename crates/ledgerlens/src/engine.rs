//! Analysis engine.
//!
//! Orchestrates one run: slice the ledger, run every detector on every
//! slice, then persistence and the context overlay over the combined
//! findings. Slices are isolated from each other: a slice that fails or
//! panics is recorded and skipped, the rest of the run continues.

use crate::overlay::ContextOverlay;
use crate::report::{
    AnalysisReport, GraphView, SliceStatus, SliceSummary, merge_edge_scores, results_hash,
};
use crate::temporal::PersistenceEngine;
use async_trait::async_trait;
use ledgerlens_compliance::deterministic_detectors;
use ledgerlens_compliance::detector::{LearnedDetector, SliceDetector};
use ledgerlens_compliance::learned::{LearnedSliceResult, StructuralAnomalyDetector};
use ledgerlens_core::anomaly::Anomaly;
use ledgerlens_core::cancel::CancellationToken;
use ledgerlens_core::config::EngineConfig;
use ledgerlens_core::context::RuleContext;
use ledgerlens_core::error::{EngineError, Result};
use ledgerlens_core::kernel::{KernelMetadata, Stage, duration_micros, duration_millis};
use ledgerlens_core::traits::{AnalysisKernel, BatchKernel};
use ledgerlens_core::transaction::Transaction;
use ledgerlens_graph::builder::{build_graph, build_time_sliced_graphs};
use ledgerlens_graph::snapshot::snapshot;
use ledgerlens_graph::types::TimeSlice;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ============================================================================
// Messages
// ============================================================================

/// Input of an asynchronous run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    /// Validated transactions.
    pub transactions: Vec<Transaction>,
    /// Rule context snapshot for the overlay.
    pub context: RuleContext,
    /// Wall-clock budget. Remaining slices are cancelled when it elapses.
    pub timeout: Option<Duration>,
}

impl AnalysisRequest {
    /// Request under the global context with no timeout.
    #[must_use]
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self {
            transactions,
            ..Self::default()
        }
    }

    /// Set the rule context.
    #[must_use]
    pub fn with_context(mut self, context: RuleContext) -> Self {
        self.context = context;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Output of an asynchronous run.
#[derive(Debug, Clone)]
pub struct AnalysisResponse {
    /// Full report.
    pub report: AnalysisReport,
    /// Compute time in microseconds.
    pub compute_time_us: u64,
}

// ============================================================================
// Engine
// ============================================================================

struct SliceRun {
    summary: SliceSummary,
    deterministic: Vec<Anomaly>,
    learned: Option<LearnedSliceResult>,
}

impl SliceRun {
    fn empty(slice: &TimeSlice, status: SliceStatus) -> Self {
        Self {
            summary: SliceSummary {
                label: slice.label.clone(),
                node_count: slice.graph.node_count(),
                edge_count: slice.graph.edge_count(),
                deterministic_findings: 0,
                learned_findings: 0,
                learned_ran: false,
                final_loss: None,
                status,
                compute_time_us: 0,
            },
            deterministic: Vec::new(),
            learned: None,
        }
    }
}

/// End-to-end anomaly engine.
///
/// Cloning is cheap; clones share detectors and the worker pool.
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    metadata: KernelMetadata,
    config: EngineConfig,
    detectors: Vec<Arc<dyn SliceDetector>>,
    learned: Arc<dyn LearnedDetector>,
    persistence: PersistenceEngine,
    overlay: Arc<ContextOverlay>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl AnalysisEngine {
    /// Build an engine from configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let pool = if config.runtime.parallel_slices && config.runtime.worker_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.runtime.worker_threads)
                .thread_name(|i| format!("ledgerlens-slice-{}", i))
                .build()
                .map_err(|e| EngineError::config(format!("failed to build worker pool: {}", e)))?;
            Some(Arc::new(pool))
        } else {
            None
        };

        Ok(Self {
            metadata: KernelMetadata::new("engine/analysis", Stage::Engine)
                .with_description("Time-sliced graph anomaly analysis"),
            detectors: deterministic_detectors(&config)
                .into_iter()
                .map(Arc::<dyn SliceDetector>::from)
                .collect(),
            learned: Arc::new(StructuralAnomalyDetector::with_config(config.learned.clone())),
            persistence: PersistenceEngine::with_config(config.persistence.clone()),
            overlay: Arc::new(ContextOverlay::new()),
            pool,
            config,
        })
    }

    /// Add a detector that runs after the built-in ones.
    #[must_use]
    pub fn with_detector(mut self, detector: Box<dyn SliceDetector>) -> Self {
        self.detectors.push(Arc::from(detector));
        self
    }

    /// Replace the learned detector.
    #[must_use]
    pub fn with_learned_detector(mut self, detector: Box<dyn LearnedDetector>) -> Self {
        self.learned = Arc::from(detector);
        self
    }

    /// Replace the overlay.
    #[must_use]
    pub fn with_overlay(mut self, overlay: ContextOverlay) -> Self {
        self.overlay = Arc::new(overlay);
        self
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Detectors in run order.
    #[must_use]
    pub fn detectors(&self) -> &[Arc<dyn SliceDetector>] {
        &self.detectors
    }

    /// Analyze a ledger under a context.
    pub fn analyze(
        &self,
        transactions: &[Transaction],
        context: &RuleContext,
    ) -> Result<AnalysisReport> {
        self.analyze_with_cancel(transactions, context, &CancellationToken::new())
    }

    /// Analyze a ledger, checking `cancel` before each slice.
    pub fn analyze_with_cancel(
        &self,
        transactions: &[Transaction],
        context: &RuleContext,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport> {
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let window = self.config.graph.window;

        let slices = build_time_sliced_graphs(transactions, window);
        info!(
            run_id = %run_id,
            transactions = transactions.len(),
            slices = slices.len(),
            window = %window,
            context = %context.id,
            "Starting analysis"
        );

        let runs = self.run_slices(&slices, cancel);

        let mut summaries = Vec::with_capacity(runs.len());
        let mut raw = Vec::new();
        let mut scored = Vec::new();
        let mut cancelled_slices = Vec::new();
        let mut failed_slices = Vec::new();
        for run in runs {
            match run.summary.status {
                SliceStatus::Cancelled => cancelled_slices.push(run.summary.label.clone()),
                SliceStatus::Failed => failed_slices.push(run.summary.label.clone()),
                SliceStatus::Completed | SliceStatus::Degraded => {}
            }
            raw.extend(run.deterministic);
            if let Some(learned) = run.learned {
                raw.extend(learned.anomalies);
                scored.extend(learned.edge_scores);
            }
            summaries.push(run.summary);
        }

        let persisted = self.persistence.apply(raw);
        let anomalies = self
            .overlay
            .apply(persisted.anomalies, transactions, context);

        let full = build_graph(transactions);
        let edge_scores = merge_edge_scores(&scored);
        let graph_view = GraphView::build(&full, &anomalies, &edge_scores);

        let report = AnalysisReport {
            run_id,
            context_id: context.id.clone(),
            slices: summaries,
            snapshot: snapshot(&full)?,
            results_hash: results_hash(&anomalies)?,
            model_fingerprint: self.learned.fingerprint()?,
            anomalies,
            edge_scores,
            graph_view,
            persistence: persisted.summary,
            cancelled_slices,
            failed_slices,
        };

        info!(
            run_id = %report.run_id,
            anomalies = report.anomalies.len(),
            cancelled = report.cancelled_slices.len(),
            failed = report.failed_slices.len(),
            elapsed_ms = duration_millis(start.elapsed()),
            "Analysis complete"
        );
        Ok(report)
    }

    fn run_slices(&self, slices: &[TimeSlice], cancel: &CancellationToken) -> Vec<SliceRun> {
        let guarded = |slice: &TimeSlice| -> SliceRun {
            if cancel.is_cancelled() {
                debug!(slice = %slice.label, "Slice cancelled");
                return SliceRun::empty(slice, SliceStatus::Cancelled);
            }
            match catch_unwind(AssertUnwindSafe(|| self.run_slice(slice))) {
                Ok(run) => run,
                Err(payload) => {
                    let reason = panic_reason(payload.as_ref());
                    error!(slice = %slice.label, reason = %reason, "Slice panicked");
                    SliceRun::empty(slice, SliceStatus::Failed)
                }
            }
        };

        if !self.config.runtime.parallel_slices {
            return slices.iter().map(guarded).collect();
        }
        match &self.pool {
            Some(pool) => pool.install(|| slices.par_iter().map(guarded).collect()),
            None => slices.par_iter().map(guarded).collect(),
        }
    }

    fn run_slice(&self, slice: &TimeSlice) -> SliceRun {
        let start = Instant::now();
        let label = slice.label.as_str();
        let graph = &slice.graph;

        let deterministic: Vec<Anomaly> = self
            .detectors
            .iter()
            .flat_map(|detector| {
                let found = detector.detect(label, graph);
                debug!(
                    slice = label,
                    detector = detector.id(),
                    found = found.len(),
                    "Detector done"
                );
                found
            })
            .collect();

        // A failing or panicking learned stage degrades the slice; the
        // deterministic findings stay.
        let learned_run = catch_unwind(AssertUnwindSafe(|| self.learned.detect(label, graph)));
        let (learned, status) = match learned_run {
            Ok(Ok(result)) => (result, SliceStatus::Completed),
            Ok(Err(e)) => {
                warn!(slice = label, error = %e, "Learned detector failed");
                (None, SliceStatus::Degraded)
            }
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                warn!(slice = label, reason = %reason, "Learned detector panicked");
                (None, SliceStatus::Degraded)
            }
        };

        let mut run = SliceRun::empty(slice, status);
        run.summary.deterministic_findings = deterministic.len();
        if let Some(result) = &learned {
            run.summary.learned_ran = true;
            run.summary.learned_findings = result.anomalies.len();
            run.summary.final_loss = Some(result.training.final_loss);
        }
        run.summary.compute_time_us = duration_micros(start.elapsed());
        run.deterministic = deterministic;
        run.learned = learned;
        run
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl AnalysisKernel for AnalysisEngine {
    fn metadata(&self) -> &KernelMetadata {
        &self.metadata
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        self.learned.validate()
    }
}

#[async_trait]
impl BatchKernel<AnalysisRequest, AnalysisResponse> for AnalysisEngine {
    async fn execute(&self, input: AnalysisRequest) -> Result<AnalysisResponse> {
        let start = Instant::now();
        self.validate_input(&input)?;

        let engine = self.clone();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let timeout = input.timeout;
        let handle = tokio::task::spawn_blocking(move || {
            engine.analyze_with_cancel(&input.transactions, &input.context, &worker_cancel)
        });

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancel.cancel();
                    warn!(timeout_ms = duration_millis(limit), "Analysis timed out");
                    return Err(EngineError::Timeout(limit));
                }
            },
            None => handle.await,
        };

        let report = joined
            .map_err(|e| EngineError::internal(format!("analysis task failed: {}", e)))??;
        Ok(AnalysisResponse {
            report,
            compute_time_us: duration_micros(start.elapsed()),
        })
    }

    fn validate_input(&self, input: &AnalysisRequest) -> Result<()> {
        if input.context.id.is_empty() {
            return Err(EngineError::validation("rule context id is empty"));
        }
        if input.timeout.is_some_and(|t| t.is_zero()) {
            return Err(EngineError::validation("timeout must be positive"));
        }
        Ok(())
    }
}
