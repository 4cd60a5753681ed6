//! Sync operations and the sequential job runner.
//!
//! Each [`Operation`] pulls one resource class from the remote source and
//! reconciles it into the store. A [`Job`] runs operations in order; an
//! operation that fails is reported and the job moves on, keeping whatever the
//! earlier operations wrote.

pub mod album_discovery;
pub mod blacklist;
pub mod context;
pub mod playlist_sync;
pub mod track_collection;

pub use album_discovery::ArtistAlbumDiscovery;
pub use blacklist::BlacklistSync;
pub use context::SyncContext;
pub use playlist_sync::{ArtistDiscovery, PlaylistSync};
pub use track_collection::AlbumTrackCollection;

use crate::observer::SyncEvent;
use crate::store::Rejection;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Instant;
use uuid::Uuid;

#[async_trait]
pub trait Operation: Send + Sync {
    /// Stable identifier used in events and reports.
    fn name(&self) -> &str;

    /// Runs the operation. Per-resource failures belong in the report; an
    /// `Err` means the operation could not run at all.
    async fn run(&self, ctx: &SyncContext) -> Result<OperationReport>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    pub resource_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationReport {
    pub operation: String,
    /// Resources attempted (playlists, artists, albums).
    pub processed: usize,
    pub failures: Vec<ResourceFailure>,
    /// Payloads skipped by validation.
    pub rejected: usize,
    pub elapsed_ms: u64,
}

impl OperationReport {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> usize {
        self.processed.saturating_sub(self.failures.len())
    }

    /// Records and reports a failed resource.
    pub(crate) fn fail(&mut self, ctx: &SyncContext, resource_id: &str, error: &anyhow::Error) {
        let error = format!("{:#}", error);
        ctx.emit(SyncEvent::ResourceFailed {
            operation: self.operation.clone(),
            resource_id: resource_id.to_string(),
            error: error.clone(),
        });
        self.failures.push(ResourceFailure {
            resource_id: resource_id.to_string(),
            error,
        });
    }

    pub(crate) fn reject_all(&mut self, ctx: &SyncContext, rejections: &[Rejection]) {
        for rejection in rejections {
            ctx.emit(SyncEvent::ItemRejected {
                resource_id: rejection.resource_id.clone(),
                reason: rejection.error.to_string(),
            });
        }
        self.rejected += rejections.len();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Completed(OperationReport),
    Failed { operation: String, error: String },
}

impl OperationOutcome {
    pub fn operation(&self) -> &str {
        match self {
            OperationOutcome::Completed(report) => &report.operation,
            OperationOutcome::Failed { operation, .. } => operation,
        }
    }

    pub fn report(&self) -> Option<&OperationReport> {
        match self {
            OperationOutcome::Completed(report) => Some(report),
            OperationOutcome::Failed { .. } => None,
        }
    }
}

/// Runs one operation, emitting its start and finish (or failure) events.
pub async fn run_operation(op: &dyn Operation, ctx: &SyncContext) -> OperationOutcome {
    let started = Instant::now();
    ctx.emit(SyncEvent::OperationStarted {
        operation: op.name().to_string(),
    });
    match op.run(ctx).await {
        Ok(mut report) => {
            report.elapsed_ms = started.elapsed().as_millis() as u64;
            ctx.emit(SyncEvent::OperationFinished {
                operation: report.operation.clone(),
                processed: report.processed,
                failed: report.failures.len(),
                elapsed_ms: report.elapsed_ms,
            });
            OperationOutcome::Completed(report)
        }
        Err(e) => {
            let error = format!("{:#}", e);
            ctx.emit(SyncEvent::OperationFailed {
                operation: op.name().to_string(),
                error: error.clone(),
            });
            OperationOutcome::Failed {
                operation: op.name().to_string(),
                error,
            }
        }
    }
}

/// An ordered list of operations run one after another.
pub struct Job {
    name: String,
    operations: Vec<Box<dyn Operation>>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Vec::new(),
        }
    }

    pub fn then(mut self, op: impl Operation + 'static) -> Self {
        self.operations.push(Box::new(op));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub async fn run(&self, ctx: &SyncContext) -> JobReport {
        let run_id = Uuid::new_v4();
        tracing::info!(job = %self.name, run_id = %run_id, operations = self.operations.len(), "job started");
        let mut outcomes = Vec::with_capacity(self.operations.len());
        for op in &self.operations {
            outcomes.push(run_operation(op.as_ref(), ctx).await);
        }
        let report = JobReport {
            run_id,
            job: self.name.clone(),
            outcomes,
        };
        tracing::info!(
            job = %self.name,
            run_id = %run_id,
            failed_operations = report.failed_operations().len(),
            "job finished"
        );
        report
    }
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub run_id: Uuid,
    pub job: String,
    pub outcomes: Vec<OperationOutcome>,
}

impl JobReport {
    pub fn failed_operations(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, OperationOutcome::Failed { .. }))
            .map(OperationOutcome::operation)
            .collect()
    }

    /// True when every operation ran, even if some resources failed.
    pub fn is_success(&self) -> bool {
        self.failed_operations().is_empty()
    }

    pub fn outcome(&self, operation: &str) -> Option<&OperationOutcome> {
        self.outcomes.iter().find(|o| o.operation() == operation)
    }

    pub fn resource_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(OperationOutcome::report)
            .map(|r| r.failures.len())
            .sum()
    }
}
