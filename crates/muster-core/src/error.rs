//! Error types for `muster-core`.
//!
//! "No prediction possible" is not represented here: insufficient data is a
//! valid prediction outcome, carried in the prediction's `method` field, not
//! an error.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("entity not found: {0}")]
  EntityNotFound(Uuid),

  #[error("alert not found: {0}")]
  AlertNotFound(Uuid),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// A store failure, propagated unchanged. The engines never retry;
  /// retry policy belongs to the caller.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error into [`Error::Store`].
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
