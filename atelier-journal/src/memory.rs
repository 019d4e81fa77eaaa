use atelier_core::error::{MarketError, MarketResult};
use atelier_core::events::{Event, EventRecord, EventSubscriber};
use std::sync::Mutex;

/// Subscriber that keeps every record in memory
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    records: Mutex<Vec<EventRecord>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records received so far, oldest first
    pub fn records(&self) -> Vec<EventRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The events of all records received so far
    pub fn events(&self) -> Vec<Event> {
        self.records().into_iter().map(|r| r.event).collect()
    }

    /// The most recent event, if any
    pub fn last_event(&self) -> Option<Event> {
        self.records().pop().map(|r| r.event)
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSubscriber for InMemoryEventLog {
    fn on_event(&self, record: &EventRecord) -> MarketResult<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| MarketError::poisoned("event log", e))?;
        records.push(record.clone());
        Ok(())
    }
}
