//! Record sink trait
//!
//! The coordinator hands every record to a [`RecordSink`] as soon as it is
//! parsed. The primary JSONL log propagates write failures, which abort the
//! run; secondary sinks (SQLite mirror, quarantine downloader, alerting) log
//! their own failures and never return an error.

use crate::records::ThreadRecord;
use crate::DarkwatchError;
use async_trait::async_trait;

/// Consumer of the record stream
#[async_trait]
pub trait RecordSink: Send {
    /// Called once per record, in production order
    async fn accept(&mut self, record: &ThreadRecord) -> Result<(), DarkwatchError>;

    /// Called once after the last record of a run
    async fn finish(&mut self) -> Result<(), DarkwatchError> {
        Ok(())
    }
}

/// Fans each record out to several sinks in order
///
/// Put the primary log first so a record is durable before any secondary
/// sink sees it.
#[derive(Default)]
pub struct SinkChain {
    sinks: Vec<Box<dyn RecordSink>>,
}

impl SinkChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn RecordSink>) {
        self.sinks.push(sink);
    }

    pub fn with(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl RecordSink for SinkChain {
    async fn accept(&mut self, record: &ThreadRecord) -> Result<(), DarkwatchError> {
        for sink in self.sinks.iter_mut() {
            sink.accept(record).await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), DarkwatchError> {
        for sink in self.sinks.iter_mut() {
            sink.finish().await?;
        }
        Ok(())
    }
}

/// Collects records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<ThreadRecord>,
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn accept(&mut self, record: &ThreadRecord) -> Result<(), DarkwatchError> {
        self.records.push(record.clone());
        Ok(())
    }
}
