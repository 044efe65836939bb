//! The operator's say in how questions are answered

use std::fmt::Debug;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};

mod forward_all;
mod static_hosts;

pub use self::forward_all::ForwardAll;
pub use self::static_hosts::StaticHosts;

/// A question the server received, with the server's defaults for
/// forwarding it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub client: SocketAddr,
    pub host_name: String,
    pub forward_address: Option<SocketAddr>,
    pub encrypt_forward: bool,
}

/// How to handle a question
///
/// With `forward_address` unset the server replies from `host_address`
/// alone, a name error if it is unspecified. With it set the question is
/// also forwarded, and the client gets the upstream answer unless
/// `host_address` was already good enough to reply with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveDecision {
    pub host_address: Ipv4Addr,
    pub ignore_request: bool,
    pub forward_address: Option<SocketAddr>,
    pub encrypt_forward: bool,
}

impl ResolveDecision {
    /// Reply with `address` without asking anyone
    pub fn answer(address: Ipv4Addr) -> ResolveDecision {
        ResolveDecision {
            host_address: address,
            ignore_request: false,
            forward_address: None,
            encrypt_forward: false,
        }
    }

    /// Forward as the request suggests
    pub fn forward(request: &ResolveRequest) -> ResolveDecision {
        ResolveDecision {
            host_address: Ipv4Addr::UNSPECIFIED,
            ignore_request: false,
            forward_address: request.forward_address,
            encrypt_forward: request.encrypt_forward,
        }
    }

    /// Drop the question without a reply
    pub fn ignore() -> ResolveDecision {
        ResolveDecision {
            host_address: Ipv4Addr::UNSPECIFIED,
            ignore_request: true,
            forward_address: None,
            encrypt_forward: false,
        }
    }
}

/// Decides how host names are resolved, and learns what upstream servers
/// answered
///
/// Both methods run on the server task and must not block. An error from
/// `resolve` drops the question like `ignore_request` does.
pub trait Resolver: Debug + Send + Sync {
    fn resolve(&self, request: &ResolveRequest) -> io::Result<ResolveDecision>;
    fn cache_binding(&self, name: &str, address: Ipv4Addr);
}
