//! RESP store client
//!
//! Speaks RESP2 to a Redis-compatible server over one TCP connection.

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::{ItemResult, Store};
use crate::config::ConnectionConfig;
use crate::error::{CacheError, Result};
use crate::protocol::{encode_command, read_reply, Command, Reply};

/// Initial read buffer capacity
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// One socket plus its unread bytes
struct Connection {
    stream: TcpStream,
    buf: BytesMut,

    /// Set while a round trip is in flight and left set if it fails or is
    /// dropped; replies can no longer be matched to requests
    broken: bool,
}

impl Connection {
    /// Write all commands in one flush, then read one reply per command
    async fn round_trip(&mut self, commands: &[Command]) -> Result<Vec<Reply>> {
        if self.broken {
            return Err(CacheError::Connectivity(
                "connection is broken, reconnect required".into(),
            ));
        }

        // A caller timeout drops this future mid-read with replies still
        // in flight, so the latch is only cleared on completion
        self.broken = true;
        let replies = self.round_trip_inner(commands).await?;
        self.broken = false;
        Ok(replies)
    }

    async fn round_trip_inner(&mut self, commands: &[Command]) -> Result<Vec<Reply>> {
        let mut out = Vec::new();
        for command in commands {
            out.extend_from_slice(&encode_command(command));
        }

        self.stream
            .write_all(&out)
            .await
            .map_err(|e| CacheError::Connectivity(format!("write failed: {}", e)))?;

        let mut replies = Vec::with_capacity(commands.len());
        for _ in 0..commands.len() {
            replies.push(read_reply(&mut self.stream, &mut self.buf).await?);
        }
        Ok(replies)
    }
}

/// Store backed by a Redis-compatible server
pub struct RespStore {
    connection: Mutex<Connection>,

    /// Peer address for logging
    address: String,
}

impl RespStore {
    /// Connect, authenticate and select the configured database
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let address = config.address();
        tracing::debug!("Connecting to store at {}", address);

        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| CacheError::Connectivity(format!("connect to {}: {}", address, e)))?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let mut connection = Connection {
            stream,
            buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            broken: false,
        };

        if let Some(credential) = &config.credential {
            let auth = Command::Raw {
                name: "AUTH".into(),
                args: vec![credential.as_bytes().to_vec()],
            };
            if let Some(Reply::Error(e)) = connection.round_trip(&[auth]).await?.pop() {
                return Err(CacheError::Connectivity(format!(
                    "authentication failed: {}",
                    e
                )));
            }
        }

        if let Some(database) = config.database {
            let select = Command::Raw {
                name: "SELECT".into(),
                args: vec![database.to_string().into_bytes()],
            };
            if let Some(Reply::Error(e)) = connection.round_trip(&[select]).await?.pop() {
                return Err(CacheError::Connectivity(format!(
                    "select database {}: {}",
                    database, e
                )));
            }
        }

        tracing::info!("Connected to store at {}", address);

        Ok(Self {
            connection: Mutex::new(connection),
            address,
        })
    }

    /// Get the peer address string
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Store for RespStore {
    async fn execute(&self, command: Command) -> Result<Reply> {
        let mut connection = self.connection.lock().await;
        let mut replies = connection.round_trip(std::slice::from_ref(&command)).await?;
        replies.pop().ok_or_else(|| {
            CacheError::Protocol(format!("no reply to {} from {}", command.name(), self.address))
        })
    }

    async fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<ItemResult>> {
        tracing::trace!("Pipelining {} commands to {}", commands.len(), self.address);

        let mut connection = self.connection.lock().await;
        let replies = connection.round_trip(&commands).await?;
        Ok(replies.into_iter().map(Reply::into_result).collect())
    }
}
