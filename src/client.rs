use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use log::{debug, error, trace};
use tokio::{net::UdpSocket, sync::mpsc};

use crate::crypto::DatagramCipher;
use crate::message::{build_question, ParsedMessage};
use crate::net;

/// Receives every message that reaches a `DnsClient`
///
/// Messages are not matched against the questions sent, that's up to the
/// listener.
pub trait AnswerListener: Send {
    fn on_message(&mut self, message: ParsedMessage, from: SocketAddr);
}

impl<F> AnswerListener for F
where
    F: FnMut(ParsedMessage, SocketAddr) + Send,
{
    fn on_message(&mut self, message: ParsedMessage, from: SocketAddr) {
        self(message, from)
    }
}

/// Sends A questions and hands whatever comes back to a listener
pub struct DnsClient {
    socket: Arc<UdpSocket>,
    cipher: Option<Arc<dyn DatagramCipher>>,
    next_id: AtomicU16,
    // dropping it stops the task
    _closed: mpsc::UnboundedSender<()>,
}

/// Receive loop of a `DnsClient`, finishes when the client is dropped
pub struct ClientTask {
    socket: Arc<UdpSocket>,
    cipher: Option<Arc<dyn DatagramCipher>>,
    listener: Box<dyn AnswerListener>,
    closed: mpsc::UnboundedReceiver<()>,
}

impl DnsClient {
    // Will panic if called from outside the context of a runtime
    pub fn bind<L>(
        addr: SocketAddr,
        cipher: Option<Arc<dyn DatagramCipher>>,
        listener: L,
    ) -> io::Result<(DnsClient, ClientTask)>
    where
        L: AnswerListener + 'static,
    {
        let socket = Arc::new(UdpSocket::from_std(net::bind(addr)?)?);
        let (tx, rx) = mpsc::unbounded_channel();

        let client = DnsClient {
            socket: socket.clone(),
            cipher: cipher.clone(),
            next_id: AtomicU16::new(0),
            _closed: tx,
        };
        let task = ClientTask {
            socket,
            cipher,
            listener: Box::new(listener),
            closed: rx,
        };
        Ok((client, task))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sends an A question for `host_name` to `server`, returning the id it
    /// was sent with. The answer goes to the listener.
    pub async fn send_question(&self, server: SocketAddr, host_name: &str) -> io::Result<u16> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let packet = build_question(id, host_name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let packet = match self.cipher {
            Some(ref cipher) => cipher.encrypt(&packet),
            None => packet,
        };
        trace!("sending question {} for {} to {:?}", id, host_name, server);
        self.socket.send_to(&packet, server).await?;
        Ok(id)
    }
}

impl ClientTask {
    fn handle_packet(&mut self, data: &[u8], from: SocketAddr) {
        let decrypted;
        let data = match self.cipher {
            Some(ref cipher) => match cipher.decrypt(data) {
                Ok(plain) => {
                    decrypted = plain;
                    &decrypted[..]
                }
                Err(err) => {
                    debug!("dropping packet from {:?}: {}", from, err);
                    return;
                }
            },
            None => data,
        };
        match ParsedMessage::parse(data) {
            Ok(message) => self.listener.on_message(message, from),
            Err(err) => debug!("couldn't parse packet from {:?}: {}", from, err),
        }
    }
}

impl Future for ClientTask {
    type Output = ();
    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
        let pinned = Pin::get_mut(self);
        if let Poll::Ready(None) = pinned.closed.poll_recv(cx) {
            return Poll::Ready(());
        }

        let mut recv_buf = [0u8; 65536];
        let mut errors = net::RecvErrors::default();
        loop {
            let mut buf = tokio::io::ReadBuf::new(&mut recv_buf);
            match pinned.socket.poll_recv_from(cx, &mut buf) {
                Poll::Ready(Ok(from)) => pinned.handle_packet(buf.filled(), from),
                Poll::Ready(Err(err)) => {
                    error!("client receive error: {:?}", err);
                    if !errors.keep_reading(cx) {
                        return Poll::Pending;
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::crypto::AesCbcCipher;
    use crate::message::build_host_address_answer;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn question_and_answer() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (client, task) = DnsClient::bind(
            "127.0.0.1:0".parse().unwrap(),
            None,
            move |message: ParsedMessage, from: SocketAddr| {
                let _ = tx.send((message, from));
            },
        )
        .unwrap();
        tokio::spawn(task);

        let server_addr = server.local_addr().unwrap();
        let first = client.send_question(server_addr, "a.example.com").await.unwrap();
        let second = client.send_question(server_addr, "b.example.com").await.unwrap();
        assert_eq!(second, first.wrapping_add(1));

        let mut buf = [0u8; 512];
        let (len, from) = timeout(WAIT, server.recv_from(&mut buf)).await.unwrap().unwrap();
        assert_eq!(from, client.local_addr().unwrap());
        let question = ParsedMessage::parse(&buf[..len]).unwrap();
        assert_eq!(question.id, first);
        assert_eq!(question.questions, vec!["a.example.com".to_string()]);

        // answers are delivered whatever their id
        let answer = build_host_address_answer(999, "z.example.com", Ipv4Addr::new(1, 2, 3, 4)).unwrap();
        server.send_to(&answer, from).await.unwrap();
        server.send_to(b"junk", from).await.unwrap();
        let (message, sender) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(sender, server_addr);
        assert_eq!(message.id, 999);
        assert_eq!(message.addresses[0].address, Ipv4Addr::new(1, 2, 3, 4));
    }

    #[tokio::test]
    async fn encrypted_question() {
        let cipher: Arc<dyn DatagramCipher> = Arc::new(AesCbcCipher::new(b"secret"));
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (client, task) = DnsClient::bind(
            "127.0.0.1:0".parse().unwrap(),
            Some(cipher.clone()),
            |_: ParsedMessage, _: SocketAddr| (),
        )
        .unwrap();
        let task = tokio::spawn(task);

        let id = client
            .send_question(server.local_addr().unwrap(), "a.example.com")
            .await
            .unwrap();
        let mut buf = [0u8; 512];
        let (len, _) = timeout(WAIT, server.recv_from(&mut buf)).await.unwrap().unwrap();
        let question = ParsedMessage::parse(&cipher.decrypt(&buf[..len]).unwrap()).unwrap();
        assert_eq!(question.id, id);

        assert!(client
            .send_question(server.local_addr().unwrap(), "a..b")
            .await
            .is_err());

        drop(client);
        timeout(WAIT, task).await.unwrap().unwrap();
    }
}
