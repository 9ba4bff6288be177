//! Bind and unbind

use tracing::debug;

use super::guarded;
use crate::error::{ProxyError, Result};
use crate::protocol::{BindRequest, LdapResult, OperationKind};
use crate::proxy::DirectoryProxy;
use crate::session::{ClientSession, Credentials, Identity, PendingOperation};
use crate::sink::ResultSink;

impl DirectoryProxy {
    /// Authenticate the client session
    ///
    /// An empty name is an anonymous bind and succeeds without contacting any
    /// target. Otherwise the identity's connection to the target holding the
    /// DN is recreated and the upstream bind result is relayed unchanged. On
    /// any failure the session falls back to anonymous.
    pub async fn bind(
        &self,
        session: &ClientSession,
        request: BindRequest,
        sink: &dyn ResultSink,
    ) -> Option<LdapResult> {
        let mut pending = PendingOperation::new(session.next_message_id(), OperationKind::Bind);
        session.set_version(request.version);

        let outcome = self.authenticate(session, &request, &mut pending).await;
        match &outcome {
            Ok(_) if request.is_anonymous() => session.reset_to_anonymous(),
            Ok(_) => {}
            Err(_) => session.reset_to_anonymous(),
        }
        self.finish(session, sink, &pending, outcome).await
    }

    async fn authenticate(
        &self,
        session: &ClientSession,
        request: &BindRequest,
        pending: &mut PendingOperation,
    ) -> Result<LdapResult> {
        if request.is_anonymous() {
            return Ok(LdapResult::success());
        }
        if request.password.is_empty() {
            return Err(ProxyError::Unwilling(
                "unauthenticated bind (DN without password)".to_string(),
            ));
        }

        let identity = Identity::from_bind_name(&request.name)?;
        let Some(dn) = identity.dn() else {
            return Ok(LdapResult::success());
        };
        let target = self.selector.select_one(dn)?;
        let credentials = Credentials::new(identity.clone(), request.password.clone());

        pending.contact(target.id());
        let limit = target.connect_timeout() + target.timeout(OperationKind::Bind);
        let conn = guarded(
            session,
            &target,
            OperationKind::Bind,
            limit,
            self.pool.bind(&target, &credentials),
        )
        .await?;
        conn.release();

        debug!(
            client = %session.id(),
            identity = %identity,
            target = %target.name(),
            "bind succeeded"
        );
        let result = LdapResult::success();
        pending.record_outcome(target.id(), result.code);
        session.set_credentials(credentials);
        Ok(result)
    }

    /// End the client session
    ///
    /// Cancels anything still running for the session and tears down every
    /// connection the bound identity owns. Anonymous connections are shared
    /// and stay pooled. Nothing is sent to the client.
    pub fn unbind(&self, session: &ClientSession) {
        session.cancel();
        let identity = session.identity();
        if !identity.is_anonymous() {
            let destroyed = self.pool.destroy(&identity);
            debug!(
                client = %session.id(),
                identity = %identity,
                destroyed,
                "unbind tore down connections"
            );
        }
        session.reset_to_anonymous();
    }
}
