use std::io::{Error, ErrorKind};

use thiserror::Error;

/// Errors raised while building a topology. Failures of a call
/// attempt are never reported through this type, they end up as
/// [CallException](crate::dispatch::outcome::CallException)s.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// The referenced configuration key is absent.
    #[error("missing descriptor: no configuration entry for key {key:?}")]
    Missing { key: String },

    /// The configuration entry exists but can't be turned into a descriptor.
    #[error("invalid descriptor value {value:?} for key {key:?}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl DescriptorError {
    #[inline]
    pub fn missing(key: &str) -> Self {
        Self::Missing {
            key: key.to_owned(),
        }
    }

    #[inline]
    pub fn invalid<R: Into<String>>(key: &str, value: &str, reason: R) -> Self {
        Self::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
            reason: reason.into(),
        }
    }

    /// The configuration key the error is about.
    pub fn key(&self) -> &str {
        match self {
            Self::Missing { key } => key,
            Self::InvalidValue { key, .. } => key,
        }
    }
}

impl From<DescriptorError> for Error {
    fn from(err: DescriptorError) -> Self {
        let kind = match &err {
            DescriptorError::Missing { .. } => ErrorKind::NotFound,
            DescriptorError::InvalidValue { .. } => ErrorKind::InvalidInput,
        };
        Error::new(kind, err)
    }
}
