use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Snapshot of a running search, emitted once per iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub iteration: usize,
    pub objective: f64,
    pub weights: Vec<f64>,
}

pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Delivers [ProgressEvent]s to an optional observer
///
/// The search runs on the caller's thread. A UI running elsewhere can subscribe through
/// [ProgressReporter::channel] and drain the receiving end at its own pace.
#[derive(Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    /// Forward every event into an unbounded channel
    ///
    /// Events are dropped silently once the receiver is gone.
    pub fn channel(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self::with_callback(Box::new(move |event| {
            let _ = tx.send(event);
        }))
    }

    pub fn is_active(&self) -> bool {
        self.callback.is_some()
    }

    #[inline]
    pub fn report(&self, iteration: usize, objective: f64, weights: &[f64]) {
        if let Some(cb) = &self.callback {
            cb(ProgressEvent {
                iteration,
                objective,
                weights: weights.to_vec(),
            });
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("active", &self.is_active())
            .finish()
    }
}
