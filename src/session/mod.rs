//! Client session state
//!
//! A [`ClientSession`] is the proxy's view of one front-end client: who it is
//! bound as, which protocol version it speaks, and a cancellation token that
//! aborts its suspended dials and exchanges when the client goes away.

pub mod pending;
pub mod retry;

pub use pending::PendingOperation;
pub use retry::Attempt;

use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

use crate::dn::{Dn, DnError};
use crate::protocol::ProtocolVersion;
use crate::types::{ClientId, MessageId};

/// Owner of pooled connections
///
/// Anonymous clients share one identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    Dn(Dn),
}

impl Identity {
    /// Identity for a bind name; an empty name is anonymous
    pub fn from_bind_name(name: &str) -> Result<Self, DnError> {
        if name.trim().is_empty() {
            return Ok(Self::Anonymous);
        }
        Dn::parse(name).map(Self::Dn)
    }

    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    #[must_use]
    pub const fn dn(&self) -> Option<&Dn> {
        match self {
            Self::Anonymous => None,
            Self::Dn(dn) => Some(dn),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Dn(dn) => write!(f, "{dn}"),
        }
    }
}

/// Identity plus the secret that proves it
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    identity: Identity,
    password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(identity: Identity, password: impl Into<String>) -> Self {
        Self {
            identity,
            password: password.into(),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity.to_string())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One front-end client
#[derive(Debug)]
pub struct ClientSession {
    id: ClientId,
    version: AtomicU8,
    credentials: RwLock<Credentials>,
    next_message_id: AtomicI32,
    cancel: CancellationToken,
}

impl ClientSession {
    /// New anonymous session speaking `version`
    #[must_use]
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            id: ClientId::new(),
            version: AtomicU8::new(version.as_u8()),
            credentials: RwLock::new(Credentials::anonymous()),
            next_message_id: AtomicI32::new(1),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Version the client last bound with
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion::from_u8(self.version.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub(crate) fn set_version(&self, version: ProtocolVersion) {
        self.version.store(version.as_u8(), Ordering::Release);
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        self.credentials().identity
    }

    #[must_use]
    pub fn credentials(&self) -> Credentials {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_credentials(&self, credentials: Credentials) {
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credentials;
    }

    pub(crate) fn reset_to_anonymous(&self) {
        self.set_credentials(Credentials::anonymous());
    }

    /// Allocate the id of the next client operation
    pub fn next_message_id(&self) -> MessageId {
        MessageId::new(self.next_message_id.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Abandon everything this session has in flight
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new(ProtocolVersion::default())
    }
}
