use thiserror::Error;

/// Boxed transport-library error kept as the cause of a [`TransportError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("dial {host} failed")]
    Dial {
        host: String,
        #[source]
        source: BoxError,
    },
    #[error("begin cbs session failed")]
    Session(#[source] BoxError),
    #[error("attach cbs link failed")]
    Link(#[source] BoxError),
    #[error("claim for {audience} rejected")]
    Rejected {
        audience: String,
        #[source]
        source: BoxError,
    },
    #[error("cbs exchange failed")]
    Exchange(#[source] BoxError),
    #[error("close connection failed")]
    Close(#[source] BoxError),
}

impl TransportError {
    /// True when the broker answered and refused the claim, as opposed to the
    /// exchange failing on the way there.
    pub fn is_rejection(&self) -> bool {
        matches!(self, TransportError::Rejected { .. })
    }
}
