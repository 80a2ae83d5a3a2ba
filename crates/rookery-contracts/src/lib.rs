//! Wire contracts: the signed RPC envelope and one payload struct per
//! operation. Everything on the wire is JSON; payloads travel base64-encoded
//! inside the envelope.

pub mod envelope;
pub mod msgs;

pub use envelope::{ContractError, Envelope, Reply};
pub use msgs::*;
