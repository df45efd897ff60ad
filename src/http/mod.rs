//! HTTP transport for the dispatcher
//!
//! A thin adapter: `POST /requests` decodes one envelope, hands it to the dispatcher and
//! encodes the correlated response. Metadata endpoints sit alongside it.

pub mod handlers;
