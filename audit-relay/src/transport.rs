//! Secure record transport
//!
//! Sends one record per TCP connection to a remote log collector. Records are
//! passed through the [`CertificateCodec`] and framed with a trailing `\n`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::codec::CertificateCodec;
use crate::error::{Error, Result};

/// Default bound on connecting to a stuck collector
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote collector address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTarget")]
pub struct TransportTarget {
    host: String,
    port: u16,
}

#[derive(Deserialize)]
struct RawTarget {
    host: String,
    port: u16,
}

impl TryFrom<RawTarget> for TransportTarget {
    type Error = Error;

    fn try_from(raw: RawTarget) -> Result<Self> {
        Self::new(raw.host, raw.port)
    }
}

impl TransportTarget {
    /// Validated target; the host must be non-empty and the port non-zero
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        let trimmed = host.trim();
        if trimmed.is_empty() {
            return Err(Error::Configuration(
                "transport host must not be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(Error::Configuration(format!(
                "transport port for '{}' must be in 1..=65535",
                trimmed
            )));
        }
        Ok(Self {
            host: trimmed.to_string(),
            port,
        })
    }

    /// Host name or address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for TransportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Codec plus raw TCP sink
#[derive(Debug, Clone)]
pub struct SecureTransport {
    target: TransportTarget,
    codec: Arc<CertificateCodec>,
    connect_timeout: Duration,
}

impl SecureTransport {
    /// Transport to `target` protecting records with `codec`
    pub fn new(target: TransportTarget, codec: Arc<CertificateCodec>) -> Self {
        Self {
            target,
            codec,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Collector address
    pub fn target(&self) -> &TransportTarget {
        &self.target
    }

    /// Codec applied to every record
    pub fn codec(&self) -> &Arc<CertificateCodec> {
        &self.codec
    }

    /// Transform `message` and frame it for the wire
    pub fn prepare(&self, message: &str) -> Result<Vec<u8>> {
        let mut record = self.codec.transform(message)?.into_bytes();
        record.push(b'\n');
        Ok(record)
    }

    /// Write an already-prepared record over a fresh connection
    pub async fn deliver(&self, record: &[u8]) -> Result<()> {
        let connect = TcpStream::connect((self.target.host.as_str(), self.target.port));
        let mut stream = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::transport(&self.target, e)),
            Err(_) => {
                return Err(Error::transport(
                    &self.target,
                    std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("connect timed out after {:?}", self.connect_timeout),
                    ),
                ))
            }
        };

        stream
            .write_all(record)
            .await
            .map_err(|e| Error::transport(&self.target, e))?;
        stream
            .shutdown()
            .await
            .map_err(|e| Error::transport(&self.target, e))?;

        tracing::trace!(target_addr = %self.target, bytes = record.len(), "Record delivered");
        Ok(())
    }

    /// Prepare and deliver one record
    pub async fn send(&self, message: &str) -> Result<()> {
        let record = self.prepare(message)?;
        self.deliver(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_target_validation() {
        assert!(TransportTarget::new("", 514).unwrap_err().is_configuration());
        assert!(TransportTarget::new("   ", 514).is_err());
        assert!(TransportTarget::new("siem.local", 0).is_err());

        let target = TransportTarget::new("siem.local", 6514).unwrap();
        assert_eq!(target.to_string(), "siem.local:6514");
    }

    #[test]
    fn test_target_deserialize_validates() {
        let ok: TransportTarget =
            serde_json::from_str(r#"{"host":"127.0.0.1","port":514}"#).unwrap();
        assert_eq!(ok.port(), 514);
        assert!(serde_json::from_str::<TransportTarget>(r#"{"host":"","port":514}"#).is_err());
    }

    #[test]
    fn test_prepare_appends_newline() {
        let transport = SecureTransport::new(
            TransportTarget::new("127.0.0.1", 514).unwrap(),
            Arc::new(CertificateCodec::passthrough()),
        );
        assert_eq!(transport.prepare("a=\"1\"").unwrap(), b"a=\"1\"\n");
    }

    #[tokio::test]
    async fn test_send_writes_one_framed_record() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let reader = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = String::new();
            socket.read_to_string(&mut buf).await.unwrap();
            buf
        });

        let transport = SecureTransport::new(
            TransportTarget::new("127.0.0.1", port).unwrap(),
            Arc::new(CertificateCodec::passthrough()),
        );
        transport.send("user=\"mrossi\"").await.unwrap();

        assert_eq!(reader.await.unwrap(), "user=\"mrossi\"\n");
    }

    #[tokio::test]
    async fn test_connection_refused_names_target() {
        // bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = SecureTransport::new(
            TransportTarget::new("127.0.0.1", port).unwrap(),
            Arc::new(CertificateCodec::passthrough()),
        )
        .with_connect_timeout(Duration::from_secs(1));

        let err = transport.send("hello").await.unwrap_err();
        match err {
            Error::Transport { target, .. } => assert_eq!(target, format!("127.0.0.1:{}", port)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
