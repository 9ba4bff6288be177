//! Bookkeeping for one in-flight client operation

use crate::protocol::{OperationKind, ResultCode};
use crate::session::Attempt;
use crate::types::{MessageId, TargetId};

/// What happened against one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProgress {
    pub target: TargetId,
    pub upstream_id: Option<i32>,
    pub attempt: Attempt,
    /// Entries received (search only)
    pub entries: usize,
    pub outcome: Option<ResultCode>,
}

/// Operation being relayed
///
/// Lives from the moment relay begins until the client-visible result is
/// produced.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    message_id: MessageId,
    kind: OperationKind,
    targets: Vec<TargetProgress>,
}

impl PendingOperation {
    #[must_use]
    pub fn new(message_id: MessageId, kind: OperationKind) -> Self {
        Self {
            message_id,
            kind,
            targets: Vec::new(),
        }
    }

    #[must_use]
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn targets(&self) -> &[TargetProgress] {
        &self.targets
    }

    fn progress(&mut self, target: TargetId) -> &mut TargetProgress {
        match self.targets.iter().position(|p| p.target == target) {
            Some(i) => &mut self.targets[i],
            None => {
                self.targets.push(TargetProgress {
                    target,
                    upstream_id: None,
                    attempt: Attempt::First,
                    entries: 0,
                    outcome: None,
                });
                let last = self.targets.len() - 1;
                &mut self.targets[last]
            }
        }
    }

    /// Note that `target` was contacted
    pub fn contact(&mut self, target: TargetId) {
        self.progress(target);
    }

    /// Record the last exchange against `target`
    pub fn record_exchange(&mut self, target: TargetId, upstream_id: Option<i32>, attempt: Attempt) {
        let progress = self.progress(target);
        progress.upstream_id = upstream_id.or(progress.upstream_id);
        progress.attempt = attempt;
    }

    pub fn record_entries(&mut self, target: TargetId, count: usize) {
        self.progress(target).entries += count;
    }

    pub fn record_outcome(&mut self, target: TargetId, code: ResultCode) {
        self.progress(target).outcome = Some(code);
    }

    /// Resends across all targets
    #[must_use]
    pub fn total_retries(&self) -> u32 {
        self.targets.iter().map(|p| p.attempt.retries()).sum()
    }

    #[must_use]
    pub fn retries(&self, target: TargetId) -> u32 {
        self.targets
            .iter()
            .find(|p| p.target == target)
            .map_or(0, |p| p.attempt.retries())
    }
}
