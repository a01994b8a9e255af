//! Collaborator interfaces
//!
//! The engine never talks to the network, reads key material or converts
//! protobuf itself. Each of those concerns is a trait here; production
//! implementations live with the embedding application and the in-memory
//! ones live in `ledgerform-testkit`.

pub mod identity;
pub mod ledger;
pub mod reliability;
pub mod transcoder;
