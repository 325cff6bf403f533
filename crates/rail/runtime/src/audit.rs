//! Audit sinks

use async_trait::async_trait;
use rail_types::{AuditRecord, AuditSink, SinkError};
use std::sync::Arc;
use tracing::{info, warn};

/// Writes every audit record as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(&self, record: AuditRecord) -> Result<(), SinkError> {
        let payload = serde_json::to_string(&record.event)
            .map_err(|e| SinkError::Rejected(e.to_string()))?;
        info!(
            target: "rail::audit",
            audit_id = %record.id,
            event = record.event.kind(),
            job_id = record.event.job_id().map(|id| id.as_str()),
            payload = %payload,
            "audit"
        );
        Ok(())
    }
}

/// Fans every record out to several sinks.
///
/// Every sink sees every record; the first error is reported after all
/// sinks have been tried.
#[derive(Default, Clone)]
pub struct CompositeAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl CompositeAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    /// Add a sink
    pub fn add(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl AuditSink for CompositeAuditSink {
    async fn emit(&self, record: AuditRecord) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(record.clone()).await {
                warn!(error = %e, "Audit sink failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for CompositeAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeAuditSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rail_types::{AuditEvent, MemoryAuditSink};

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn emit(&self, _record: AuditRecord) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("disk full".into()))
        }
    }

    fn record() -> AuditRecord {
        AuditRecord::new(AuditEvent::ManifestActivated {
            version: "1.0.0".into(),
            hash_self: "abc".into(),
            hash_prev: None,
        })
    }

    #[tokio::test]
    async fn test_composite_reaches_every_sink() {
        let a = Arc::new(MemoryAuditSink::new());
        let b = Arc::new(MemoryAuditSink::new());
        let composite = CompositeAuditSink::new(vec![a.clone(), b.clone()]);

        composite.emit(record()).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn test_composite_continues_past_failure() {
        let memory = Arc::new(MemoryAuditSink::new());
        let composite = CompositeAuditSink::new(vec![Arc::new(FailingSink), memory.clone()]);

        let err = composite.emit(record()).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_records() {
        TracingAuditSink.emit(record()).await.unwrap();
    }
}
