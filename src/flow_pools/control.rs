//! Pause/resume signalling towards the packet queueing layer

use std::{fmt, sync::Arc};

use spin::Mutex;

use super::FlowId;

/// Action requested from the queueing layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowAction {
    /// Stop submitting packets for the flow
    Pause,
    /// Wake all queues of the flow
    Resume,
}

/// Why the action was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowReason {
    /// Descriptor pool occupancy crossed a watermark
    DataFlowControl,
}

/// Queueing layer callback
///
/// Invoked with no txflow lock held, so implementations may call back into
/// the manager.
pub trait FlowControlSink: Send + Sync {
    /// Apply `action` to every queue of `flow_id`
    fn notify(&self, flow_id: FlowId, action: FlowAction, reason: FlowReason);
}

/// A decided but not yet delivered signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSignal {
    pub flow_id: FlowId,
    pub action: FlowAction,
}

impl FlowSignal {
    pub fn pause(flow_id: FlowId) -> Self {
        Self {
            flow_id,
            action: FlowAction::Pause,
        }
    }

    pub fn resume(flow_id: FlowId) -> Self {
        Self {
            flow_id,
            action: FlowAction::Resume,
        }
    }
}

/// Delivers signals decided under a pool lock once that lock is dropped
#[derive(Clone)]
pub struct SignalDispatcher {
    sink: Arc<dyn FlowControlSink>,
}

impl SignalDispatcher {
    pub fn new(sink: Arc<dyn FlowControlSink>) -> Self {
        Self { sink }
    }

    /// Deliver a signal if one was decided
    pub fn dispatch(&self, signal: Option<FlowSignal>) {
        if let Some(signal) = signal {
            self.emit(signal);
        }
    }

    pub fn emit(&self, signal: FlowSignal) {
        log::debug!("flow {} -> {:?}", signal.flow_id, signal.action);
        self.sink
            .notify(signal.flow_id, signal.action, FlowReason::DataFlowControl);
    }
}

impl fmt::Debug for SignalDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalDispatcher").finish_non_exhaustive()
    }
}

/// Sink that drops every signal
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FlowControlSink for NullSink {
    fn notify(&self, _flow_id: FlowId, _action: FlowAction, _reason: FlowReason) {}
}

/// Sink that records every signal, for tests and tooling
#[derive(Debug, Default)]
pub struct RecordingSink {
    signals: Mutex<Vec<FlowSignal>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All signals received so far, oldest first
    pub fn signals(&self) -> Vec<FlowSignal> {
        self.signals.lock().clone()
    }

    /// Signals received for one flow
    pub fn signals_for(&self, flow_id: FlowId) -> Vec<FlowAction> {
        self.signals
            .lock()
            .iter()
            .filter(|signal| signal.flow_id == flow_id)
            .map(|signal| signal.action)
            .collect()
    }

    /// Count of a given action across all flows
    pub fn count(&self, action: FlowAction) -> usize {
        self.signals
            .lock()
            .iter()
            .filter(|signal| signal.action == action)
            .count()
    }

    pub fn clear(&self) {
        self.signals.lock().clear();
    }
}

impl FlowControlSink for RecordingSink {
    fn notify(&self, flow_id: FlowId, action: FlowAction, _reason: FlowReason) {
        self.signals.lock().push(FlowSignal { flow_id, action });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_forwards_to_sink() {
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = SignalDispatcher::new(sink.clone());

        dispatcher.dispatch(None);
        dispatcher.dispatch(Some(FlowSignal::pause(4)));
        dispatcher.emit(FlowSignal::resume(4));

        assert_eq!(sink.signals_for(4), vec![FlowAction::Pause, FlowAction::Resume]);
        assert_eq!(sink.count(FlowAction::Pause), 1);
        sink.clear();
        assert!(sink.signals().is_empty());
    }
}
