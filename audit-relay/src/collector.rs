//! TCP record collector
//!
//! Receiving end of the transport wire format: newline-terminated UTF-8
//! records, one or more per connection. Encrypted records are decrypted with
//! a [`RecordDecryptor`] when one is configured.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::codec::RecordDecryptor;
use crate::error::Result;

/// Longest record accepted before the connection is dropped
pub const DEFAULT_MAX_RECORD_LENGTH: usize = 64 * 1024;

/// Pause after a failed `accept` (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// One record as received from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRecord {
    /// Sender address
    pub peer: SocketAddr,
    /// Record body without the trailing newline, decrypted if applicable
    pub body: String,
}

/// Listener accepting records from [`SecureTransport`](crate::transport::SecureTransport) senders
pub struct Collector {
    listener: TcpListener,
    decryptor: Option<Arc<RecordDecryptor>>,
    max_record_length: usize,
}

impl Collector {
    /// Bind to `addr`
    pub async fn bind(addr: SocketAddr, decryptor: Option<RecordDecryptor>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            decryptor: decryptor.map(Arc::new),
            max_record_length: DEFAULT_MAX_RECORD_LENGTH,
        })
    }

    /// Drop connections that send a record longer than `max` bytes
    pub fn with_max_record_length(mut self, max: usize) -> Self {
        self.max_record_length = max;
        self
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` fires or `sink` is closed
    pub async fn run(
        self,
        sink: mpsc::Sender<ReceivedRecord>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        tracing::info!(
            addr = ?self.listener.local_addr().ok(),
            decrypt = self.decryptor.is_some(),
            max_record_length = self.max_record_length,
            "Collector listening"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Collector shutting down");
                    return Ok(());
                }
                _ = sink.closed() => {
                    tracing::info!("Record sink closed, collector stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let sink = sink.clone();
                            let decryptor = self.decryptor.clone();
                            let shutdown = shutdown.child_token();
                            let codec = LinesCodec::new_with_max_length(self.max_record_length);
                            tokio::spawn(async move {
                                handle_connection(stream, peer, codec, decryptor, sink, shutdown)
                                    .await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept collector connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    codec: LinesCodec,
    decryptor: Option<Arc<RecordDecryptor>>,
    sink: mpsc::Sender<ReceivedRecord>,
    shutdown: CancellationToken,
) {
    let mut lines = FramedRead::new(stream, codec);

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return,
            line = lines.next() => line,
        };

        let raw = match line {
            Some(Ok(raw)) => raw,
            None => return,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                tracing::warn!(
                    %peer,
                    max_record_length = lines.decoder().max_length(),
                    "Record exceeds maximum length, dropping connection"
                );
                return;
            }
            Some(Err(LinesCodecError::Io(e))) => {
                tracing::warn!(%peer, error = %e, "Collector connection failed");
                return;
            }
        };

        let raw = raw.trim_end_matches('\r');
        if raw.is_empty() {
            continue;
        }

        let body = match &decryptor {
            Some(decryptor) => match decryptor.decrypt(raw) {
                Ok(plain) => plain,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "Dropping undecryptable record");
                    continue;
                }
            },
            None => raw.to_string(),
        };

        if sink.send(ReceivedRecord { peer, body }).await.is_err() {
            return;
        }
    }
}
