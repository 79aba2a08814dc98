//! Request/reply exchanges with retransmission
//!
//! A [`Transaction`] holds one request and its progress. The
//! [`TransactionEngine`] sends it over a [`Transport`], waits for a reply with
//! the same transaction identifier, and resends the identical bytes when the
//! wait times out.
//!
//! ```text
//! Pending --reply accepted--> Succeeded
//! Pending --retries spent---> TimedOut
//! Pending --cancel / error--> Failed
//! ```

use crate::error::{DhcpError, Result};
use crate::network::Transport;
use crate::{v4, v6};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Large enough for any DHCP payload carried in a 1500-byte frame.
const RECV_BUFFER_LEN: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before the first retransmission.
    pub timeout: Duration,
    /// Retransmissions after the first send.
    pub max_retries: u32,
    /// Each retransmission waits this many times longer than the last.
    pub backoff_factor: u32,
    pub max_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_factor: 2,
            max_timeout: Duration::from_secs(64),
        }
    }
}

impl RetryPolicy {
    pub fn next_timeout(&self, current: Duration) -> Duration {
        current
            .saturating_mul(self.backoff_factor.max(1))
            .min(self.max_timeout.max(self.timeout))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Succeeded,
    TimedOut,
    Failed,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// A message that can be correlated with its reply by transaction identifier.
pub trait ReplyMessage: Sized {
    type Xid: Copy + PartialEq + fmt::Debug;

    fn xid(&self) -> Self::Xid;

    fn to_wire(&self) -> Result<Vec<u8>>;

    fn from_wire(buf: &[u8]) -> Result<Self>;
}

impl ReplyMessage for v4::Message {
    type Xid = u32;

    fn xid(&self) -> u32 {
        self.xid
    }

    fn to_wire(&self) -> Result<Vec<u8>> {
        self.encode()
    }

    fn from_wire(buf: &[u8]) -> Result<Self> {
        Self::decode(buf)
    }
}

impl ReplyMessage for v6::Message {
    type Xid = [u8; 3];

    fn xid(&self) -> [u8; 3] {
        self.xid
    }

    fn to_wire(&self) -> Result<Vec<u8>> {
        self.encode()
    }

    fn from_wire(buf: &[u8]) -> Result<Self> {
        Self::decode(buf)
    }
}

#[derive(Debug)]
pub struct Transaction<M: ReplyMessage> {
    xid: M::Xid,
    request: M,
    retries_remaining: u32,
    timeout: Duration,
    attempts: u32,
    state: TransactionState,
}

impl<M: ReplyMessage> Transaction<M> {
    pub fn new(request: M, policy: &RetryPolicy) -> Self {
        Self {
            xid: request.xid(),
            request,
            retries_remaining: policy.max_retries,
            timeout: policy.timeout,
            attempts: 0,
            state: TransactionState::Pending,
        }
    }

    pub fn xid(&self) -> M::Xid {
        self.xid
    }

    pub fn request(&self) -> &M {
        &self.request
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Sends made so far, the first one included.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }
}

pub struct TransactionEngine<'t, T> {
    transport: &'t T,
    destination: SocketAddr,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<'t, T: Transport> TransactionEngine<'t, T> {
    pub fn new(
        transport: &'t T,
        destination: SocketAddr,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            destination,
            policy,
            cancel,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drives `txn` to a terminal state.
    ///
    /// Returns the first reply that decodes, carries the transaction's xid and
    /// satisfies `accept`. Everything else read in the meantime is dropped.
    pub async fn run<M, F>(&self, txn: &mut Transaction<M>, mut accept: F) -> Result<M>
    where
        M: ReplyMessage,
        F: FnMut(&M) -> bool,
    {
        let wire = match txn.request.to_wire() {
            Ok(wire) => wire,
            Err(e) => {
                txn.state = TransactionState::Failed;
                return Err(e);
            }
        };
        let mut buf = vec![0u8; RECV_BUFFER_LEN];

        loop {
            if self.cancel.is_cancelled() {
                txn.state = TransactionState::Failed;
                return Err(DhcpError::Cancelled);
            }

            txn.attempts += 1;
            tracing::debug!(
                "Sending {} bytes for xid {:?} to {} (attempt {})",
                wire.len(),
                txn.xid,
                self.destination,
                txn.attempts
            );
            if let Err(e) = self.transport.send_to(&wire, self.destination).await {
                txn.state = TransactionState::Failed;
                return Err(DhcpError::Io(e));
            }

            let deadline = Instant::now() + txn.timeout;
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("Transaction {:?} cancelled", txn.xid);
                    txn.state = TransactionState::Failed;
                    return Err(DhcpError::Cancelled);
                }
                outcome = time::timeout_at(
                    deadline,
                    self.wait_for_reply(txn.xid, &mut buf, &mut accept),
                ) => outcome,
            };

            match outcome {
                Ok(Ok(reply)) => {
                    txn.state = TransactionState::Succeeded;
                    return Ok(reply);
                }
                Ok(Err(e)) => {
                    tracing::error!("Transport failed while waiting for a reply: {}", e);
                    txn.state = TransactionState::Failed;
                    return Err(e);
                }
                Err(_elapsed) if txn.retries_remaining == 0 => {
                    tracing::warn!(
                        "No reply for xid {:?} after {} attempts",
                        txn.xid,
                        txn.attempts
                    );
                    txn.state = TransactionState::TimedOut;
                    return Err(DhcpError::Timeout {
                        attempts: txn.attempts,
                    });
                }
                Err(_elapsed) => {
                    txn.retries_remaining -= 1;
                    txn.timeout = self.policy.next_timeout(txn.timeout);
                    tracing::warn!(
                        "Timeout waiting for xid {:?}, retrying ({} left, next wait {:?})",
                        txn.xid,
                        txn.retries_remaining,
                        txn.timeout
                    );
                }
            }
        }
    }

    async fn wait_for_reply<M, F>(&self, xid: M::Xid, buf: &mut [u8], accept: &mut F) -> Result<M>
    where
        M: ReplyMessage,
        F: FnMut(&M) -> bool,
    {
        loop {
            let (len, from) = self.transport.recv_from(buf).await?;
            let reply = match M::from_wire(&buf[..len]) {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::debug!("Ignoring undecodable {} bytes from {}: {}", len, from, e);
                    continue;
                }
            };
            if reply.xid() != xid {
                tracing::debug!("XID mismatch ({:?} != {:?}), ignoring packet", reply.xid(), xid);
                continue;
            }
            if !accept(&reply) {
                tracing::debug!("Reply from {} not accepted in this exchange", from);
                continue;
            }
            tracing::debug!("Accepted {} byte reply from {}", len, from);
            return Ok(reply);
        }
    }
}
