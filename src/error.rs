use crate::transport::TransportError;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// No wallet was injected into the host environment. Permanent for the session.
    #[error("no wallet extension detected; install one to play")]
    ExtensionUnavailable,
    #[error("wallet has no authorized account")]
    NoAuthorizedAccount,
    #[error("account authorization was denied: {0}")]
    AuthorizationDenied(#[source] TransportError),
    #[error("reading {what} failed: {source}")]
    Read {
        what: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("transaction signature was rejected")]
    SignatureRejected,
    #[error("transaction submission failed: {0}")]
    Submission(#[source] TransportError),
    #[error("a ticket purchase is already waiting for confirmation")]
    PurchaseInFlight,
    #[error("malformed wallet response: {0}")]
    Decode(String),
}

impl Error {
    pub(crate) fn read(what: &'static str) -> impl FnOnce(TransportError) -> Self {
        move |source| Error::Read { what, source }
    }

    /// User-driven failures the player may simply retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NoAuthorizedAccount
                | Error::AuthorizationDenied(_)
                | Error::SignatureRejected
                | Error::Submission(_)
                | Error::PurchaseInFlight
        )
    }
}
