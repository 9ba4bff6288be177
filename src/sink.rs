//! Result delivery back to the front end

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

use crate::protocol::{Entry, LdapResult};
use crate::session::ClientSession;
use crate::types::ClientId;

/// Where relayed responses go
///
/// Every operation except unbind ends with exactly one `send_result`.
/// Searches stream their entries through `send_entry` first.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn send_entry(&self, session: &ClientSession, entry: Entry);

    async fn send_result(&self, session: &ClientSession, result: LdapResult);
}

/// One delivered response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Entry(ClientId, Entry),
    Result(ClientId, LdapResult),
}

/// Sink that keeps everything it is sent
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Entry(_, entry) => Some(entry),
                SinkEvent::Result(..) => None,
            })
            .collect()
    }

    #[must_use]
    pub fn results(&self) -> Vec<LdapResult> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Result(_, result) => Some(result),
                SinkEvent::Entry(..) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn send_entry(&self, session: &ClientSession, entry: Entry) {
        self.push(SinkEvent::Entry(session.id(), entry));
    }

    async fn send_result(&self, session: &ClientSession, result: LdapResult) {
        self.push(SinkEvent::Result(session.id(), result));
    }
}
