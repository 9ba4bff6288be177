//! Modify, add, delete and modify-DN
//!
//! All four are object-scope: one target, chosen by the entry DN.

use tracing::debug;

use crate::dn::{Dn, Rdn};
use crate::error::{ProxyError, Result};
use crate::protocol::{
    AddRequest, DeleteRequest, LdapResult, ModifyDnRequest, ModifyRequest, OperationKind,
    ProtocolVersion,
};
use crate::proxy::DirectoryProxy;
use crate::session::{ClientSession, PendingOperation};
use crate::sink::ResultSink;

use super::UpstreamRequest;

impl DirectoryProxy {
    pub async fn modify(
        &self,
        session: &ClientSession,
        request: ModifyRequest,
        sink: &dyn ResultSink,
    ) -> Option<LdapResult> {
        let mut pending = PendingOperation::new(session.next_message_id(), OperationKind::Modify);
        let outcome = self.relay_modify(session, request, &mut pending).await;
        self.finish(session, sink, &pending, outcome).await
    }

    async fn relay_modify(
        &self,
        session: &ClientSession,
        request: ModifyRequest,
        pending: &mut PendingOperation,
    ) -> Result<LdapResult> {
        let dn = Dn::parse(&request.dn)?;
        let target = self.selector.select_one(&dn)?;

        self.relay_single(session, &target, pending, |rewrite| {
            let mut rewritten = request;
            rewritten.dn = self.engine.to_upstream(rewrite, &dn)?.to_string();
            for change in &mut rewritten.changes {
                self.engine
                    .attributes_to_upstream(rewrite, std::slice::from_mut(&mut change.attribute));
            }
            Ok(UpstreamRequest::Modify(rewritten))
        })
        .await
    }

    pub async fn add(
        &self,
        session: &ClientSession,
        request: AddRequest,
        sink: &dyn ResultSink,
    ) -> Option<LdapResult> {
        let mut pending = PendingOperation::new(session.next_message_id(), OperationKind::Add);
        let outcome = self.relay_add(session, request, &mut pending).await;
        self.finish(session, sink, &pending, outcome).await
    }

    async fn relay_add(
        &self,
        session: &ClientSession,
        request: AddRequest,
        pending: &mut PendingOperation,
    ) -> Result<LdapResult> {
        let dn = Dn::parse(&request.dn)?;
        let target = self.selector.select_one(&dn)?;

        self.relay_single(session, &target, pending, |rewrite| {
            let mut rewritten = request;
            rewritten.dn = self.engine.to_upstream(rewrite, &dn)?.to_string();
            self.engine
                .attributes_to_upstream(rewrite, &mut rewritten.attributes);
            Ok(UpstreamRequest::Add(rewritten))
        })
        .await
    }

    pub async fn delete(
        &self,
        session: &ClientSession,
        request: DeleteRequest,
        sink: &dyn ResultSink,
    ) -> Option<LdapResult> {
        let mut pending = PendingOperation::new(session.next_message_id(), OperationKind::Delete);
        let outcome = self.relay_delete(session, request, &mut pending).await;
        self.finish(session, sink, &pending, outcome).await
    }

    async fn relay_delete(
        &self,
        session: &ClientSession,
        request: DeleteRequest,
        pending: &mut PendingOperation,
    ) -> Result<LdapResult> {
        let dn = Dn::parse(&request.dn)?;
        let target = self.selector.select_one(&dn)?;

        self.relay_single(session, &target, pending, |rewrite| {
            let dn = self.engine.to_upstream(rewrite, &dn)?.to_string();
            Ok(UpstreamRequest::Delete(DeleteRequest { dn }))
        })
        .await
    }

    /// Rename or move an entry
    ///
    /// Moving under a new superior needs LDAPv3 end to end and both parents on
    /// the same target; either violation is answered without contacting the
    /// upstream.
    pub async fn modify_dn(
        &self,
        session: &ClientSession,
        request: ModifyDnRequest,
        sink: &dyn ResultSink,
    ) -> Option<LdapResult> {
        let mut pending = PendingOperation::new(session.next_message_id(), OperationKind::ModifyDn);
        let outcome = self.relay_modify_dn(session, request, &mut pending).await;
        self.finish(session, sink, &pending, outcome).await
    }

    async fn relay_modify_dn(
        &self,
        session: &ClientSession,
        request: ModifyDnRequest,
        pending: &mut PendingOperation,
    ) -> Result<LdapResult> {
        let dn = Dn::parse(&request.dn)?;
        Rdn::parse(&request.new_rdn)?;
        let new_superior = request.new_superior.as_deref().map(Dn::parse).transpose()?;
        let target = self.selector.select_one(&dn)?;

        if let Some(new_superior) = &new_superior {
            let version = target.protocol_version().negotiate(session.version());
            if version < ProtocolVersion::V3 {
                debug!(
                    target = %target.name(),
                    %version,
                    "refusing modrdn with new superior below LDAPv3"
                );
                return Err(ProxyError::ProtocolIncompatible {
                    operation: OperationKind::ModifyDn,
                    version,
                });
            }
            self.selector
                .target_for_new_superior(&target, &dn, new_superior)?;
        }

        self.relay_single(session, &target, pending, |rewrite| {
            let new_superior = new_superior
                .map(|parent| self.engine.to_upstream(rewrite, &parent))
                .transpose()?
                .map(|parent| parent.to_string());
            Ok(UpstreamRequest::ModifyDn(ModifyDnRequest {
                dn: self.engine.to_upstream(rewrite, &dn)?.to_string(),
                new_rdn: request.new_rdn,
                delete_old_rdn: request.delete_old_rdn,
                new_superior,
            }))
        })
        .await
    }
}
