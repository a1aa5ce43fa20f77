//! Pipeline progress events and the observer interface that delivers them.
//!
//! The orchestrator reports every state transition through a single
//! [`ProgressSink`]. Consumers adapt it to their own delivery mechanism: the
//! live HTTP path forwards events into an SSE stream, the background job path
//! writes them into the polled job record.
//!
//! A run's event sequence has non-decreasing `progress` and always ends with
//! either a `complete` event at 100 or an `error` event at 0.

use serde::Serialize;
use tokio::sync::mpsc;

/// Stage tag of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Start,
    ExtractingEntities,
    Embedding,
    MappingTimestamps,
    SavingEntities,
    DetectingRelationships,
    SavingRelationships,
    Complete,
    Error,
}

impl PipelineStage {
    /// Wire tag. Both save stages report as `saving`.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Start => "start",
            PipelineStage::ExtractingEntities => "extracting",
            PipelineStage::Embedding => "embedding",
            PipelineStage::MappingTimestamps => "timestamps",
            PipelineStage::SavingEntities | PipelineStage::SavingRelationships => "saving",
            PipelineStage::DetectingRelationships => "relationships",
            PipelineStage::Complete => "complete",
            PipelineStage::Error => "error",
        }
    }

    /// True for `complete` and `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Complete | PipelineStage::Error)
    }
}

impl Serialize for PipelineStage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress notification: `{"stage", "message", "progress"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: PipelineStage,
    pub message: String,
    pub progress: u8,
}

impl ProgressEvent {
    pub fn new(stage: PipelineStage, message: impl Into<String>, progress: u8) -> Self {
        Self {
            stage,
            message: message.into(),
            progress: progress.min(100),
        }
    }

    /// Terminal error event (progress 0).
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Error, message, 0)
    }
}

/// Observer invoked by the orchestrator at every transition.
///
/// Implementations must not block: the orchestrator calls `emit` inline
/// between suspension points.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that discards events.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink forwarding events into an unbounded channel.
///
/// A closed receiver (caller disconnected) is not an error: the run continues
/// and later events are dropped.
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    /// Create a sink and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Progress receiver closed, dropping event");
        }
    }
}

/// Sink adapting a closure.
pub struct FnProgress<F>(pub F);

impl<F> ProgressSink for FnProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        (self.0)(event)
    }
}

/// Sink that rescales another sink's progress into `[start, start + span]`.
///
/// Used when a pipeline run is one phase of a longer job (the YouTube ingest
/// reports extraction as 70–100%). Terminal events keep their stage; only the
/// error event keeps progress 0.
pub struct ScaledProgress<'a> {
    inner: &'a dyn ProgressSink,
    start: u8,
    span: u8,
}

impl<'a> ScaledProgress<'a> {
    pub fn new(inner: &'a dyn ProgressSink, start: u8, span: u8) -> Self {
        Self { inner, start, span }
    }
}

impl ProgressSink for ScaledProgress<'_> {
    fn emit(&self, event: ProgressEvent) {
        let progress = if event.stage == PipelineStage::Error {
            0
        } else {
            let scaled = u32::from(self.start) + u32::from(event.progress) * u32::from(self.span) / 100;
            scaled.min(100) as u8
        };
        self.inner.emit(ProgressEvent { progress, ..event });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_stage_tags() {
        assert_eq!(PipelineStage::ExtractingEntities.as_str(), "extracting");
        assert_eq!(PipelineStage::SavingEntities.as_str(), "saving");
        assert_eq!(PipelineStage::SavingRelationships.as_str(), "saving");
        assert_eq!(PipelineStage::MappingTimestamps.as_str(), "timestamps");
        assert!(PipelineStage::Complete.is_terminal());
        assert!(!PipelineStage::Embedding.is_terminal());
    }

    #[test]
    fn test_event_serializes_wire_shape() {
        let event = ProgressEvent::new(PipelineStage::Complete, "done", 100);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({"stage": "complete", "message": "done", "progress": 100}));
    }

    #[test]
    fn test_progress_capped_at_100() {
        assert_eq!(ProgressEvent::new(PipelineStage::Start, "x", 250).progress, 100);
    }

    #[tokio::test]
    async fn test_channel_progress_delivers_in_order() {
        let (sink, mut rx) = ChannelProgress::channel();
        sink.emit(ProgressEvent::new(PipelineStage::Start, "a", 0));
        sink.emit(ProgressEvent::new(PipelineStage::Complete, "b", 100));
        assert_eq!(rx.recv().await.unwrap().message, "a");
        assert_eq!(rx.recv().await.unwrap().message, "b");
    }

    #[test]
    fn test_channel_progress_survives_closed_receiver() {
        let (sink, rx) = ChannelProgress::channel();
        drop(rx);
        sink.emit(ProgressEvent::new(PipelineStage::Start, "ignored", 0));
    }

    #[test]
    fn test_scaled_progress_maps_range() {
        let seen = Mutex::new(Vec::new());
        let inner = FnProgress(|e: ProgressEvent| seen.lock().unwrap().push(e.progress));
        let scaled = ScaledProgress::new(&inner, 70, 30);
        scaled.emit(ProgressEvent::new(PipelineStage::Start, "", 0));
        scaled.emit(ProgressEvent::new(PipelineStage::Embedding, "", 50));
        scaled.emit(ProgressEvent::new(PipelineStage::Complete, "", 100));
        scaled.emit(ProgressEvent::error("boom"));
        assert_eq!(*seen.lock().unwrap(), vec![70, 85, 100, 0]);
    }
}
