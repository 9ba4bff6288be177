//! Operation relay
//!
//! Every client operation goes the same way: pick the target(s), acquire the
//! identity's pooled connection, rewrite the request into the target's
//! namespace, exchange it, map the reply back and hand it to the
//! [`ResultSink`]. A liveness failure gets exactly one reconnect and resend
//! (see [`crate::session::retry`]).
//!
//! Each suspension point races the client session's cancellation token and
//! the per-operation timeout.

mod bind;
mod compare;
mod search;
mod update;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::authz::ProxyAuthorizationContext;
use crate::error::{ProxyError, Result, log_error};
use crate::pool::PooledConnection;
use crate::protocol::{
    AddRequest, CompareRequest, Control, DeleteRequest, LdapResult, ModifyDnRequest,
    ModifyRequest, OperationKind, ResultCode, SearchRequest,
};
use crate::proxy::DirectoryProxy;
use crate::rewrite::RewriteSession;
use crate::session::{Attempt, ClientSession, Credentials, PendingOperation, retry};
use crate::sink::ResultSink;
use crate::target::Target;
use crate::upstream::{DirectorySession, SearchOutcome};

/// Request already rewritten into a target's namespace
#[derive(Debug, Clone)]
pub(crate) enum UpstreamRequest {
    Search(SearchRequest),
    Compare(CompareRequest),
    Modify(ModifyRequest),
    Add(AddRequest),
    Delete(DeleteRequest),
    ModifyDn(ModifyDnRequest),
}

#[derive(Debug)]
pub(crate) enum UpstreamReply {
    Search(SearchOutcome),
    Done(LdapResult),
}

impl UpstreamRequest {
    fn kind(&self) -> OperationKind {
        match self {
            Self::Search(_) => OperationKind::Search,
            Self::Compare(_) => OperationKind::Compare,
            Self::Modify(_) => OperationKind::Modify,
            Self::Add(_) => OperationKind::Add,
            Self::Delete(_) => OperationKind::Delete,
            Self::ModifyDn(_) => OperationKind::ModifyDn,
        }
    }

    async fn send(
        &self,
        transport: &mut dyn DirectorySession,
        controls: &[Control],
    ) -> Result<UpstreamReply> {
        let done = match self {
            Self::Search(req) => return transport.search(req, controls).await.map(UpstreamReply::Search),
            Self::Compare(req) => transport.compare(req, controls).await,
            Self::Modify(req) => transport.modify(req, controls).await,
            Self::Add(req) => transport.add(req, controls).await,
            Self::Delete(req) => transport.delete(req, controls).await,
            Self::ModifyDn(req) => transport.modify_dn(req, controls).await,
        };
        done.map(UpstreamReply::Done)
    }
}

/// Reply of one exchange, with the connection it came back on
pub(crate) struct Exchange {
    pub reply: UpstreamReply,
    pub conn: PooledConnection,
    pub attempt: Attempt,
    pub upstream_id: Option<i32>,
}

/// Run `fut` unless the session is cancelled or `limit` elapses first
pub(crate) async fn guarded<T>(
    session: &ClientSession,
    target: &Target,
    kind: OperationKind,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = session.cancellation().cancelled() => Err(ProxyError::Cancelled),
        outcome = tokio::time::timeout(limit, fut) => outcome.unwrap_or_else(|_| {
            Err(ProxyError::Timeout {
                target: target.name().to_string(),
                operation: kind,
            })
        }),
    }
}

impl DirectoryProxy {
    async fn acquire_for(
        &self,
        session: &ClientSession,
        target: &Arc<Target>,
        credentials: &Credentials,
    ) -> Result<PooledConnection> {
        let limit = target.connect_timeout() + target.timeout(OperationKind::Bind);
        guarded(
            session,
            target,
            OperationKind::Bind,
            limit,
            self.pool.acquire(target, credentials),
        )
        .await
    }

    /// Proxied-authorization control for targets that assert identity
    fn controls_for(
        &self,
        target: &Target,
        credentials: &Credentials,
        rewrite: &RewriteSession,
    ) -> Vec<Control> {
        if !target.credential_policy().asserts_identity() {
            return Vec::new();
        }
        let upstream_dn = credentials
            .identity()
            .dn()
            .map(|dn| self.engine.to_upstream(rewrite, dn).unwrap_or_else(|_| dn.clone()));
        vec![ProxyAuthorizationContext::new(upstream_dn.as_ref()).to_control()]
    }

    /// Send one request to `target`, reconnecting once on a liveness failure
    ///
    /// `build` rewrites the request against the first connection's
    /// [`RewriteSession`]; a resend reuses the identical rewritten request.
    pub(crate) async fn exchange<F>(
        &self,
        session: &ClientSession,
        target: &Arc<Target>,
        build: F,
    ) -> Result<Exchange>
    where
        F: FnOnce(&RewriteSession) -> Result<UpstreamRequest>,
    {
        let credentials = session.credentials();
        let mut conn = self.acquire_for(session, target, &credentials).await?;
        let request = build(conn.rewrite())?;
        let kind = request.kind();
        let mut attempt = Attempt::First;

        loop {
            let controls = self.controls_for(target, &credentials, conn.rewrite());
            let sent = guarded(session, target, kind, target.timeout(kind), async {
                let mut transport = conn.session().await?;
                let reply = request.send(&mut **transport, &controls).await?;
                Ok((reply, transport.last_message_id()))
            })
            .await;

            match sent {
                Ok((reply, upstream_id)) => {
                    return Ok(Exchange {
                        reply,
                        conn,
                        attempt,
                        upstream_id,
                    });
                }
                Err(e) if e.is_liveness() => {
                    conn.record_error(e.result_code());
                    self.pool.retire(conn.connection());
                    let Some(next) = attempt.next() else {
                        return Err(e);
                    };
                    warn!(
                        target = %target.name(),
                        conn_id = %conn.id(),
                        error = %e,
                        "upstream connection failed, reconnecting once"
                    );
                    tokio::select! {
                        biased;
                        () = session.cancellation().cancelled() => return Err(ProxyError::Cancelled),
                        () = retry::backoff() => {}
                    }
                    attempt = next;
                    conn = self.acquire_for(session, target, &credentials).await?;
                }
                Err(e) => {
                    if matches!(e, ProxyError::Timeout { .. }) {
                        conn.record_error(e.result_code());
                        self.pool.retire(conn.connection());
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Exchange a non-search request with one target and map the result back
    pub(crate) async fn relay_single<F>(
        &self,
        session: &ClientSession,
        target: &Arc<Target>,
        pending: &mut PendingOperation,
        build: F,
    ) -> Result<LdapResult>
    where
        F: FnOnce(&RewriteSession) -> Result<UpstreamRequest>,
    {
        pending.contact(target.id());
        let exchange = self.exchange(session, target, build).await?;
        pending.record_exchange(target.id(), exchange.upstream_id, exchange.attempt);

        match exchange.reply {
            UpstreamReply::Done(result) => {
                let result = self.client_result(exchange.conn.rewrite(), result);
                pending.record_outcome(target.id(), result.code);
                Ok(result)
            }
            UpstreamReply::Search(_) => Err(ProxyError::Internal(format!(
                "search reply to a {} request",
                pending.kind()
            ))),
        }
    }

    /// Upstream result as the client sees it
    pub(crate) fn client_result(&self, rewrite: &RewriteSession, result: LdapResult) -> LdapResult {
        let mut result = self.engine.result_to_client(rewrite, result);
        result.code = ResultCode::from_upstream(result.code.as_u32());
        result
    }

    /// Deliver the single result of an operation
    ///
    /// Returns `None` when the client is gone and nothing was sent.
    pub(crate) async fn finish(
        &self,
        session: &ClientSession,
        sink: &dyn ResultSink,
        pending: &PendingOperation,
        outcome: Result<LdapResult>,
    ) -> Option<LdapResult> {
        let (result, abort) = match outcome {
            Ok(result) => (result, false),
            Err(e) => {
                log_error(
                    &format!("{} {} failed", pending.kind(), pending.message_id()),
                    &e,
                );
                (e.to_result()?, e.aborts_session())
            }
        };

        debug!(
            client = %session.id(),
            op = %pending.message_id(),
            kind = %pending.kind(),
            code = %result.code,
            targets = pending.targets().len(),
            retries = pending.total_retries(),
            "operation complete"
        );
        sink.send_result(session, result.clone()).await;
        if abort {
            session.cancel();
        }
        Some(result)
    }
}
