//! In-memory transport for driving clients and the transaction engine
//! without touching a network interface.

use super::Transport;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex};

const QUEUE_DEPTH: usize = 64;

type Packet = (Vec<u8>, SocketAddr);

/// One end of a connected pair. What one end sends, the other receives,
/// tagged with the sender's `local` address.
#[derive(Debug)]
pub struct ChannelTransport {
    local: SocketAddr,
    tx: mpsc::Sender<Packet>,
    rx: Mutex<mpsc::Receiver<Packet>>,
    sent: AtomicUsize,
}

impl ChannelTransport {
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(QUEUE_DEPTH);
        let (b_tx, a_rx) = mpsc::channel(QUEUE_DEPTH);
        (
            Self {
                local: a,
                tx: a_tx,
                rx: Mutex::new(a_rx),
                sent: AtomicUsize::new(0),
            },
            Self {
                local: b,
                tx: b_tx,
                rx: Mutex::new(b_rx),
                sent: AtomicUsize::new(0),
            },
        )
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Number of datagrams sent from this end.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

impl Transport for ChannelTransport {
    async fn send_to(&self, payload: &[u8], _destination: SocketAddr) -> io::Result<usize> {
        self.tx
            .send((payload.to_vec(), self.local))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"))?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(payload.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        let (payload, from) = rx
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"))?;
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Ok((n, from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (a, b) = ChannelTransport::pair(
            "10.0.0.2:68".parse().unwrap(),
            "10.0.0.1:67".parse().unwrap(),
        );
        a.send_to(b"hello", b.local_addr()).await.unwrap();
        let mut buf = [0u8; 8];
        let (n, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(from, a.local_addr());
        assert_eq!(a.sent(), 1);
        assert_eq!(b.sent(), 0);

        drop(a);
        assert!(b.recv_from(&mut buf).await.is_err());
    }
}
