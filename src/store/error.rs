/// the two failure kinds the store surfaces, plus the one the identity
/// commands raise when the data itself contradicts an invariant. sqlstate
/// class 23 (integrity violations) marks a logic bug and is never
/// retried; everything else coming out of postgres is assumed transient.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transient store failure: {0}")]
    Transient(#[source] tokio_postgres::Error),
    #[error("constraint violation: {0}")]
    Constraint(#[source] tokio_postgres::Error),
    #[error("inconsistent state: {0}")]
    Inconsistent(String),
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        match e.code() {
            Some(state) if state.code().starts_with("23") => Self::Constraint(e),
            _ => Self::Transient(e),
        }
    }
}

impl StoreError {
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent(message.into())
    }

    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
