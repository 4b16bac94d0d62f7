//! Routing resolves a flat key/value configuration into a tree of
//! service [descriptors](crate::descriptor::Descriptor) and performs
//! failover calls over it: endpoints are tried one after another, in
//! the order the groups' strategies pick, until one of them succeeds.
//! Every failed attempt is kept in the returned
//! [CallOutcome](crate::dispatch::outcome::CallOutcome).
//! ### Features
//! **tokio1-rt**: enable the [async dispatcher](crate::dispatch::dispatch_async),
//! which bounds every attempt by its endpoint's total timeout.
//!

pub mod builder;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod strategy;

pub mod prelude {
    pub use crate::{
        builder::{build, BuilderConfig, ConfigSource, DescriptorBuilder},
        descriptor::{endpoint::Endpoint, group::Group, Descriptor},
        dispatch::{
            dispatch, flatten, flatten_with,
            outcome::{CallException, CallExceptionList, CallOutcome, CallReport, ExceptionReport, Succeeded},
            CallConfig, Candidate, Dispatcher,
        },
        error::DescriptorError,
        strategy::{
            load::{LoadStats, LoadTable},
            Selector, Strategy,
        },
    };

    #[cfg(feature = "tokio1-rt")]
    pub use crate::dispatch::dispatch_async::{blocking, dispatch_async, AttemptError};
}
