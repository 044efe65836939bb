use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::task::Context;

/// Receive errors a socket loop swallows in one poll before yielding
const MAX_RECV_ERRORS: usize = 16;

/// Binds a non-blocking UDP socket, ready to be handed to tokio
pub fn bind(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    let addr: SockAddr = addr.into();
    socket.bind(&addr)?;
    Ok(socket.into())
}

/// Counts receive errors within one poll of a socket loop
///
/// A failed receive doesn't register the task for wakeup, so the loop
/// either reads again or, once the budget is spent, asks to be polled
/// again later.
#[derive(Debug, Default)]
pub struct RecvErrors {
    count: usize,
}

impl RecvErrors {
    /// Records one error. Returns false when the loop should stop reading
    /// for this poll; the task has then been scheduled again.
    pub fn keep_reading(&mut self, cx: &mut Context) -> bool {
        self.count += 1;
        if self.count < MAX_RECV_ERRORS {
            return true;
        }
        cx.waker().wake_by_ref();
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Wake, Waker};

    use super::*;

    #[derive(Default)]
    struct WakeCount(AtomicUsize);

    impl Wake for WakeCount {
        fn wake(self: Arc<Self>) {
            self.wake_by_ref();
        }

        fn wake_by_ref(self: &Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn recv_errors_yield_and_reschedule() {
        let wakes = Arc::new(WakeCount::default());
        let waker = Waker::from(wakes.clone());
        let mut cx = Context::from_waker(&waker);

        let mut errors = RecvErrors::default();
        for _ in 1..MAX_RECV_ERRORS {
            assert!(errors.keep_reading(&mut cx));
        }
        assert_eq!(wakes.0.load(Ordering::SeqCst), 0);
        assert!(!errors.keep_reading(&mut cx));
        assert_eq!(wakes.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn binds_ephemeral_port() {
        let socket = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = socket.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }
}
