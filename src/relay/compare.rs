//! Compare
//!
//! A DN-valued assertion value is rewritten along with the entry DN.

use crate::dn::Dn;
use crate::error::Result;
use crate::protocol::{CompareRequest, LdapResult, OperationKind};
use crate::proxy::DirectoryProxy;
use crate::session::{ClientSession, PendingOperation};
use crate::sink::ResultSink;

use super::UpstreamRequest;

impl DirectoryProxy {
    /// Relay a compare; `compareTrue` and `compareFalse` come back as results
    pub async fn compare(
        &self,
        session: &ClientSession,
        request: CompareRequest,
        sink: &dyn ResultSink,
    ) -> Option<LdapResult> {
        let mut pending = PendingOperation::new(session.next_message_id(), OperationKind::Compare);
        let outcome = self.relay_compare(session, request, &mut pending).await;
        self.finish(session, sink, &pending, outcome).await
    }

    async fn relay_compare(
        &self,
        session: &ClientSession,
        request: CompareRequest,
        pending: &mut PendingOperation,
    ) -> Result<LdapResult> {
        let dn = Dn::parse(&request.dn)?;
        let target = self.selector.select_one(&dn)?;

        self.relay_single(session, &target, pending, |rewrite| {
            let mut rewritten = request;
            rewritten.dn = self.engine.to_upstream(rewrite, &dn)?.to_string();
            if self.engine.schema().is_dn_valued(&rewritten.attribute)
                && let Ok(value) = std::str::from_utf8(&rewritten.value)
                && let Ok(value_dn) = Dn::parse(value)
                && let Ok(mapped) = self.engine.to_upstream(rewrite, &value_dn)
            {
                rewritten.value = mapped.to_string().into_bytes();
            }
            Ok(UpstreamRequest::Compare(rewritten))
        })
        .await
    }
}
