//! Network collaborators: the outbound transport and the connectivity oracle.

mod client;
mod connectivity;

pub use client::{HttpTransport, Transport};
pub use connectivity::{Connectivity, OnlineFlag};
