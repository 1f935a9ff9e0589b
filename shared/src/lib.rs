//! Types shared between the auth server and its clients.

mod types;

pub use types::*;
