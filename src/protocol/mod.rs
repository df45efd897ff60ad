//! Batch request protocol
//!
//! Provides the envelope codec and the dispatcher that routes each `namespace/name`
//! sub-request to its registry.

pub mod dispatcher;
pub mod envelope;
