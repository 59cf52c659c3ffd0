pub mod builtin;
pub mod envelope;
pub mod error;
pub mod params;

#[cfg(test)]
mod tests;

pub use envelope::{Envelope, ErrorPayload, Notification, Request, RequestId, Response};
pub use error::{HostRpcError, Result};
pub use params::{from_params, single_param};
