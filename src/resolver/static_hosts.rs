use std::collections::HashMap;
use std::io;
use std::net::Ipv4Addr;
use std::sync::RwLock;

use log::debug;

use super::{ResolveDecision, ResolveRequest, Resolver};

/// Answers a fixed set of hosts locally and forwards everything else
///
/// Bindings learned from upstream answers are remembered and used to
/// answer later questions right away, while still being forwarded so the
/// binding stays fresh.
#[derive(Debug)]
pub struct StaticHosts {
    hosts: HashMap<String, Ipv4Addr>,
    learned: RwLock<HashMap<String, Ipv4Addr>>,
}

impl StaticHosts {
    pub fn new<I, S>(hosts: I) -> StaticHosts
    where
        I: IntoIterator<Item = (S, Ipv4Addr)>,
        S: AsRef<str>,
    {
        StaticHosts {
            hosts: hosts
                .into_iter()
                .map(|(name, address)| (name.as_ref().to_ascii_lowercase(), address))
                .collect(),
            learned: RwLock::new(HashMap::new()),
        }
    }

    /// The address learned for `name`, if any
    pub fn learned(&self, name: &str) -> Option<Ipv4Addr> {
        let learned = self.learned.read().ok()?;
        learned.get(&name.to_ascii_lowercase()).copied()
    }
}

impl Resolver for StaticHosts {
    fn resolve(&self, request: &ResolveRequest) -> io::Result<ResolveDecision> {
        let name = request.host_name.to_ascii_lowercase();
        if let Some(&address) = self.hosts.get(&name) {
            return Ok(ResolveDecision::answer(address));
        }

        let mut decision = ResolveDecision::forward(request);
        if let Some(address) = self.learned(&name) {
            decision.host_address = address;
        }
        if decision.forward_address.is_none() {
            debug!("no upstream for {}, answering locally", name);
        }
        Ok(decision)
    }

    fn cache_binding(&self, name: &str, address: Ipv4Addr) {
        if let Ok(mut learned) = self.learned.write() {
            learned.insert(name.to_ascii_lowercase(), address);
        }
    }
}
