//! Progress and cancellation hooks for a reconciliation pass
//!
//! These let the crate be driven from any UI without depending on one.

use crate::executor::ReportEntry;
use crate::types::{Action, NodeId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress callback for execution operations
///
/// Callbacks run on the coordinating thread, never concurrently, so
/// implementations need not be thread-safe.
pub trait ProgressCallback: Send {
    /// Called before a wave of independent nodes starts
    fn on_wave_start(&mut self, nodes: &[NodeId]);

    /// Called when a node moves to `Planned`, before its provider call
    fn on_node_planned(&mut self, _node: &NodeId, _action: Action) {}

    /// Called when a node reaches a final status
    fn on_node_complete(&mut self, entry: &ReportEntry);

    /// Called when a wave completes
    fn on_wave_complete(&mut self) {}
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_wave_start(&mut self, _nodes: &[NodeId]) {}
    fn on_node_complete(&mut self, _entry: &ReportEntry) {}
}

/// Shared flag for stopping a pass between waves
///
/// Cancelling never interrupts a node's provider call: nodes already
/// started run to completion, and every node not yet started is reported
/// as cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
