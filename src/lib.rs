//! A small DNS server that answers A queries itself, forwards them to an
//! upstream server, or both, over a plain and an encrypted UDP port.
//!
//! What to do with each question is up to a [`Resolver`] supplied by the
//! host application. Upstream answers are matched to the questions they
//! belong to through locally assigned ids, CNAME chains in them are
//! followed, and every address learned is handed back to the resolver.
//!
//! In proxy mode the server only swaps transaction ids and relays
//! datagrams untouched, whatever their record types.

use log::warn;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tokio::{runtime::Handle, sync::mpsc};

mod alias;
mod client;
mod crypto;
pub mod dns_parser;
mod forward;
mod fsm;
mod message;
mod net;
mod resolver;

pub use crate::alias::resolve_alias;
pub use crate::client::{AnswerListener, ClientTask, DnsClient};
pub use crate::crypto::{AesCbcCipher, CryptoError, DatagramCipher};
pub use crate::forward::{ForwardEntry, ForwardTable, ForwardTableInner};
pub use crate::fsm::{Channel, DropReason};
pub use crate::message::{
    build_host_address_answer, build_question, AddressRecord, AliasRecord, NameServerRecord,
    ParsedMessage,
};
pub use crate::resolver::{ForwardAll, ResolveDecision, ResolveRequest, Resolver, StaticHosts};

use crate::fsm::{Command, Dispatch, FSM};

/// Standard DNS port
pub const DNS_PORT: u16 = 53;
/// TTL of the answers this server makes up
pub const DEFAULT_TTL: u32 = 60;
/// How long a forwarded question waits for its upstream answer
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// The future that runs a server, see [`DnsServer::bind`]
pub type ServerTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The encrypted listener and the secret its peers share
#[derive(Clone)]
pub struct EncryptedListener {
    pub addr: SocketAddr,
    pub secret: Vec<u8>,
}

impl std::fmt::Debug for EncryptedListener {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("EncryptedListener")
            .field("addr", &self.addr)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub plain_addr: SocketAddr,
    pub encrypted: Option<EncryptedListener>,
    /// Upstream server offered to the resolver, and the only one used in
    /// proxy mode
    pub forward_address: Option<SocketAddr>,
    pub encrypt_forward: bool,
    pub proxy_mode: bool,
    pub forward_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            plain_addr: SocketAddr::from(([0, 0, 0, 0], DNS_PORT)),
            encrypted: None,
            forward_address: None,
            encrypt_forward: false,
            proxy_mode: false,
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
        }
    }
}

/// Handle to a running server
///
/// Dropping it shuts the server down and closes its sockets. Questions
/// still waiting for an upstream answer are forgotten.
pub struct DnsServer {
    commands: mpsc::UnboundedSender<Command>,
    forwards: ForwardTable,
    local_addr: SocketAddr,
    encrypted_local_addr: Option<SocketAddr>,
}

impl DnsServer {
    /// Spawns a server on a dedicated thread with its own runtime
    pub fn new(config: ServerConfig, resolver: Arc<dyn Resolver>) -> io::Result<DnsServer> {
        let (tx, rx) = std::sync::mpsc::sync_channel(0);
        thread::Builder::new()
            .name("dns-server".to_owned())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_io()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        return;
                    }
                };
                rt.block_on(async move {
                    match Self::bind(config, resolver) {
                        Ok((server, task)) => {
                            if tx.send(Ok(server)).is_ok() {
                                task.await;
                            }
                        }
                        Err(err) => {
                            let _ = tx.send(Err(err));
                        }
                    }
                })
            })?;
        rx.recv()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "dns-server thread died"))?
    }

    /// Spawns a server onto an existing runtime
    pub fn spawn(
        handle: &Handle,
        config: ServerConfig,
        resolver: Arc<dyn Resolver>,
    ) -> io::Result<DnsServer> {
        let _guard = handle.enter();
        let (server, task) = Self::bind(config, resolver)?;
        handle.spawn(task);
        Ok(server)
    }

    /// Binds the listeners and returns the server with the task to run
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        config: ServerConfig,
        resolver: Arc<dyn Resolver>,
    ) -> io::Result<(DnsServer, ServerTask)> {
        let forwards: ForwardTable = Arc::new(Mutex::new(ForwardTableInner::new(
            config.forward_timeout,
        )));

        let encrypted = config.encrypted.map(|listener| {
            let cipher: Arc<dyn DatagramCipher> = Arc::new(AesCbcCipher::new(&listener.secret));
            (listener.addr, cipher)
        });

        let dispatch = Dispatch {
            forward_address: config.forward_address,
            encrypt_forward: config.encrypt_forward,
            proxy_mode: config.proxy_mode,
        };
        if dispatch.encrypt_forward && encrypted.is_none() {
            warn!("forwarding is encrypted but there is no encrypted listener");
        }

        let (fsm, commands) = FSM::new(config.plain_addr, encrypted, resolver, &forwards, dispatch)?;

        let server = DnsServer {
            commands,
            forwards,
            local_addr: fsm.local_addr()?,
            encrypted_local_addr: fsm.encrypted_local_addr()?,
        };

        Ok((server, Box::pin(fsm)))
    }

    /// Address of the plain listener
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address of the encrypted listener, if there is one
    pub fn encrypted_local_addr(&self) -> Option<SocketAddr> {
        self.encrypted_local_addr
    }

    /// Number of forwarded questions still waiting for an answer
    pub fn pending_forwards(&self) -> usize {
        self.forwards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl Drop for DnsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
