use std::collections::VecDeque;
use std::io;
use std::io::ErrorKind::WouldBlock;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use log::{debug, error, trace, warn};
use thiserror::Error;
use tokio::{net::UdpSocket, sync::mpsc};

use crate::alias::resolve_alias;
use crate::crypto::{CryptoError, DatagramCipher};
use crate::dns_parser::{self, Header};
use crate::forward::{ForwardEntry, ForwardTable, ForwardTableInner};
use crate::message::{build_host_address_answer, build_question, ParsedMessage};
use crate::net;
use crate::resolver::{ResolveRequest, Resolver};

#[derive(Clone, Debug)]
pub enum Command {
    Shutdown,
}

/// Which listener a datagram came in on or goes out through
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Plain,
    Encrypted,
}

impl Channel {
    fn new(encrypted: bool) -> Channel {
        if encrypted {
            Channel::Encrypted
        } else {
            Channel::Plain
        }
    }
}

/// Why a datagram was dropped without a reply
#[derive(Debug, Error)]
pub enum DropReason {
    #[error("malformed message: {0}")]
    Format(#[from] dns_parser::Error),
    #[error("can't decrypt datagram: {0}")]
    Crypto(#[from] CryptoError),
    #[error("answer {0} matches no forwarded question")]
    UnknownAnswer(u16),
    #[error("ignored by resolver")]
    Ignored,
    #[error("message has no question")]
    NoQuestion,
    #[error("{0:?} is not a host name")]
    NotAHostName(String),
    #[error("no upstream server to forward to")]
    NoForwardTarget,
    #[error("no encrypted listener to send through")]
    NoEncryptedChannel,
    #[error("resolver failed: {0}")]
    Resolver(#[source] io::Error),
}

/// Settings the dispatch loop needs
#[derive(Clone, Debug)]
pub struct Dispatch {
    pub forward_address: Option<SocketAddr>,
    pub encrypt_forward: bool,
    pub proxy_mode: bool,
}

struct EncryptedSocket {
    socket: UdpSocket,
    cipher: Arc<dyn DatagramCipher>,
}

pub struct FSM {
    plain: UdpSocket,
    encrypted: Option<EncryptedSocket>,
    resolver: Arc<dyn Resolver>,
    forwards: ForwardTable,
    dispatch: Dispatch,
    commands: mpsc::UnboundedReceiver<Command>,
    outgoing: VecDeque<(Vec<u8>, SocketAddr, Channel)>,
}

impl FSM {
    // Will panic if called from outside the context of a runtime
    pub fn new(
        plain_addr: SocketAddr,
        encrypted: Option<(SocketAddr, Arc<dyn DatagramCipher>)>,
        resolver: Arc<dyn Resolver>,
        forwards: &ForwardTable,
        dispatch: Dispatch,
    ) -> io::Result<(FSM, mpsc::UnboundedSender<Command>)> {
        let plain = UdpSocket::from_std(net::bind(plain_addr)?)?;
        let encrypted = match encrypted {
            Some((addr, cipher)) => Some(EncryptedSocket {
                socket: UdpSocket::from_std(net::bind(addr)?)?,
                cipher,
            }),
            None => None,
        };

        let (tx, rx) = mpsc::unbounded_channel();

        let fsm = FSM {
            plain,
            encrypted,
            resolver,
            forwards: forwards.clone(),
            dispatch,
            commands: rx,
            outgoing: VecDeque::new(),
        };

        Ok((fsm, tx))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.plain.local_addr()
    }

    pub fn encrypted_local_addr(&self) -> io::Result<Option<SocketAddr>> {
        match self.encrypted {
            Some(ref encrypted) => encrypted.socket.local_addr().map(Some),
            None => Ok(None),
        }
    }

    fn socket(&self, channel: Channel) -> Option<&UdpSocket> {
        match channel {
            Channel::Plain => Some(&self.plain),
            Channel::Encrypted => self.encrypted.as_ref().map(|e| &e.socket),
        }
    }

    fn forwards(&self) -> MutexGuard<ForwardTableInner> {
        self.forwards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recv_packets(&mut self, channel: Channel, cx: &mut Context) {
        let mut recv_buf = [0u8; 65536];
        let mut errors = net::RecvErrors::default();
        loop {
            let mut buf = tokio::io::ReadBuf::new(&mut recv_buf);
            let addr = match self.socket(channel) {
                Some(socket) => match socket.poll_recv_from(cx, &mut buf) {
                    Poll::Ready(Ok(addr)) => addr,
                    Poll::Ready(Err(err)) => {
                        error!("error receiving on {:?} channel: {:?}", channel, err);
                        if errors.keep_reading(cx) {
                            continue;
                        }
                        break;
                    }
                    Poll::Pending => break,
                },
                None => break,
            };
            trace!("received packet from {:?} on {:?} channel", addr, channel);
            if let Err(reason) = self.handle_datagram(channel, buf.filled(), addr) {
                debug!("dropping packet from {:?}: {}", addr, reason);
            }
        }
    }

    fn handle_datagram(
        &mut self,
        channel: Channel,
        data: &[u8],
        addr: SocketAddr,
    ) -> Result<(), DropReason> {
        let decrypted;
        let data = match (channel, self.encrypted.as_ref()) {
            (Channel::Encrypted, Some(encrypted)) => {
                decrypted = encrypted.cipher.decrypt(data)?;
                &decrypted[..]
            }
            (Channel::Encrypted, None) => return Err(DropReason::NoEncryptedChannel),
            (Channel::Plain, _) => data,
        };

        if self.dispatch.proxy_mode {
            return self.relay(channel, data, addr);
        }

        let message = ParsedMessage::parse(data)?;
        if message.is_question {
            self.handle_question(channel, message, addr)
        } else {
            self.handle_answer(message)
        }
    }

    fn handle_question(
        &mut self,
        channel: Channel,
        message: ParsedMessage,
        addr: SocketAddr,
    ) -> Result<(), DropReason> {
        let host_name = message
            .questions
            .into_iter()
            .next()
            .ok_or(DropReason::NoQuestion)?;
        if !host_name.contains('.') {
            return Err(DropReason::NotAHostName(host_name));
        }
        debug!("received question for {} from {:?}", host_name, addr);

        let request = ResolveRequest {
            client: addr,
            host_name,
            forward_address: self.dispatch.forward_address,
            encrypt_forward: self.dispatch.encrypt_forward,
        };
        let decision = self
            .resolver
            .resolve(&request)
            .map_err(DropReason::Resolver)?;
        if decision.ignore_request {
            return Err(DropReason::Ignored);
        }
        let host_name = request.host_name;

        let upstream = match decision.forward_address {
            Some(upstream) => upstream,
            None => return self.reply(channel, addr, message.id, &host_name, decision.host_address),
        };

        // a local answer goes out even if the forward can't
        let mut client = Some(addr);
        if !decision.host_address.is_unspecified() {
            self.reply(channel, addr, message.id, &host_name, decision.host_address)?;
            client = None;
        }

        let forward_channel = Channel::new(decision.encrypt_forward);
        self.check_channel(forward_channel)?;

        let packet_host_name = host_name.clone();
        let forward_id = self.forwards().insert(ForwardEntry {
            requested_id: message.id,
            requested_host_name: host_name,
            encrypted: channel == Channel::Encrypted,
            client,
        });
        debug!(
            "forwarding {} to {:?} as id {}",
            packet_host_name, upstream, forward_id
        );
        let packet = build_question(forward_id, &packet_host_name)?;
        self.queue(packet, upstream, forward_channel)
    }

    fn handle_answer(&mut self, message: ParsedMessage) -> Result<(), DropReason> {
        let entry = self
            .forwards()
            .take(message.id)
            .ok_or(DropReason::UnknownAnswer(message.id))?;

        let resolver = &self.resolver;
        let address = resolve_alias(&message, &entry.requested_host_name, |name, address| {
            resolver.cache_binding(name, address)
        });
        debug!(
            "upstream resolved {} to {}",
            entry.requested_host_name, address
        );

        match entry.client {
            Some(client) => self.reply(
                Channel::new(entry.encrypted),
                client,
                entry.requested_id,
                &entry.requested_host_name,
                address,
            ),
            None => Ok(()),
        }
    }

    /// Passes a datagram through with only its id rewritten
    fn relay(&mut self, channel: Channel, data: &[u8], addr: SocketAddr) -> Result<(), DropReason> {
        let mut packet = data.to_vec();
        if Header::is_query(&packet)? {
            let upstream = self
                .dispatch
                .forward_address
                .ok_or(DropReason::NoForwardTarget)?;
            let forward_channel = Channel::new(self.dispatch.encrypt_forward);
            self.check_channel(forward_channel)?;

            let forward_id = self.forwards().insert(ForwardEntry {
                requested_id: Header::id(&packet)?,
                requested_host_name: String::new(),
                encrypted: channel == Channel::Encrypted,
                client: Some(addr),
            });
            Header::set_id(&mut packet, forward_id)?;
            self.queue(packet, upstream, forward_channel)
        } else {
            let forward_id = Header::id(&packet)?;
            let entry = self
                .forwards()
                .take(forward_id)
                .ok_or(DropReason::UnknownAnswer(forward_id))?;
            let client = entry
                .client
                .ok_or(DropReason::UnknownAnswer(forward_id))?;
            Header::set_id(&mut packet, entry.requested_id)?;
            self.queue(packet, client, Channel::new(entry.encrypted))
        }
    }

    fn reply(
        &mut self,
        channel: Channel,
        addr: SocketAddr,
        id: u16,
        host_name: &str,
        address: Ipv4Addr,
    ) -> Result<(), DropReason> {
        let packet = build_host_address_answer(id, host_name, address)?;
        self.queue(packet, addr, channel)
    }

    fn check_channel(&self, channel: Channel) -> Result<(), DropReason> {
        match self.socket(channel) {
            Some(_) => Ok(()),
            None => Err(DropReason::NoEncryptedChannel),
        }
    }

    fn queue(&mut self, packet: Vec<u8>, addr: SocketAddr, channel: Channel) -> Result<(), DropReason> {
        let packet = match channel {
            Channel::Plain => packet,
            Channel::Encrypted => match self.encrypted {
                Some(ref encrypted) => encrypted.cipher.encrypt(&packet),
                None => return Err(DropReason::NoEncryptedChannel),
            },
        };
        self.outgoing.push_back((packet, addr, channel));
        Ok(())
    }

    fn send_packets(&mut self, cx: &mut Context) {
        while let Some((response, addr, channel)) = self.outgoing.pop_front() {
            trace!("sending packet to {:?} on {:?} channel", addr, channel);

            let socket = match self.socket(channel) {
                Some(socket) => socket,
                None => continue,
            };
            match socket.poll_send_to(cx, &response, addr) {
                Poll::Ready(Ok(bytes_sent)) if bytes_sent == response.len() => (),
                Poll::Ready(Ok(_)) => warn!("failed to send entire packet"),
                Poll::Ready(Err(ref ioerr)) if ioerr.kind() == WouldBlock => (),
                Poll::Ready(Err(err)) => warn!("error sending packet {:?}", err),
                Poll::Pending => {
                    self.outgoing.push_front((response, addr, channel));
                    break;
                }
            }
        }
    }
}

impl Future for FSM {
    type Output = ();
    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
        let pinned = Pin::get_mut(self);
        while let Poll::Ready(cmd) = Pin::new(&mut pinned.commands).poll_recv(cx) {
            match cmd {
                Some(Command::Shutdown) => return Poll::Ready(()),
                None => {
                    warn!("server handle dropped without shutdown");
                    return Poll::Ready(());
                }
            }
        }

        for &channel in [Channel::Plain, Channel::Encrypted].iter() {
            pinned.recv_packets(channel, cx);
        }

        pinned.send_packets(cx);

        Poll::Pending
    }
}
