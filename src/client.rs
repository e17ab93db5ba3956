//! Protocol client: replays scripted exchanges over one TCP connection.
//!
//! Each exchange writes its request in full, then reads until at least
//! as many bytes as the expected response have arrived (or a read times
//! out, or the server closes the socket). The accumulated bytes go to
//! the order-insensitive comparator. The first failure ends the run.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::compare::{compare, describe_mismatch};
use crate::models::{Exchange, ServerAddress};
use crate::{AppError, Result};

/// Initial receive buffer capacity.
const READ_CHUNK: usize = 1024;

/// A failed exchange and its 1-based position in the test case.
#[derive(Debug)]
pub struct ExchangeError {
    /// 1-based index of the failing exchange.
    pub index: usize,
    /// What went wrong.
    pub error: AppError,
}

impl Display for ExchangeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed on cmd {}: {}", self.index, self.error)
    }
}

impl std::error::Error for ExchangeError {}

/// One client connection to a server-under-test.
///
/// The socket is closed when the connection is dropped.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    read_timeout: Duration,
}

impl Connection {
    /// Connect to `address` with each read bounded by `read_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Connection` if the connection is refused.
    pub async fn connect(address: &ServerAddress, read_timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(address.dial_target())
            .await
            .map_err(|err| AppError::Connection(format!("failed to connect to {address}: {err}")))?;

        if let Err(err) = stream.set_nodelay(true) {
            debug!(%err, "failed to set TCP_NODELAY");
        }

        debug!(%address, ?read_timeout, "connected to server");
        Ok(Self {
            stream,
            read_timeout,
        })
    }

    /// Run `exchanges` in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns an [`ExchangeError`] carrying the 1-based index of the
    /// first exchange that timed out, lost its connection, or mismatched.
    pub async fn run_exchanges(
        &mut self,
        exchanges: &[Exchange],
    ) -> std::result::Result<(), ExchangeError> {
        for (offset, exchange) in exchanges.iter().enumerate() {
            let index = offset + 1;
            self.exchange(exchange)
                .await
                .map_err(|error| ExchangeError { index, error })?;
            debug!(index, "exchange passed");
        }
        Ok(())
    }

    /// Send one request and verify its response.
    ///
    /// # Errors
    ///
    /// - `AppError::Connection`: the write or a read failed.
    /// - `AppError::Timeout`: a read exceeded the read timeout.
    /// - `AppError::Mismatch`: the comparator rejected the response.
    pub async fn exchange(&mut self, exchange: &Exchange) -> Result<()> {
        self.stream
            .write_all(&exchange.request)
            .await
            .map_err(|err| AppError::Connection(format!("failed to send request: {err}")))?;

        let actual = self.receive(&exchange.expected_response).await?;
        let comparison = compare(&actual, &exchange.expected_response);
        if comparison.equal {
            Ok(())
        } else {
            Err(AppError::Mismatch(comparison.diagnostic))
        }
    }

    async fn receive(&mut self, expected: &[u8]) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(expected.len().max(READ_CHUNK));

        while buf.len() < expected.len() {
            match tokio::time::timeout(self.read_timeout, self.stream.read_buf(&mut buf)).await {
                Ok(Ok(0)) => {
                    debug!(received = buf.len(), "server closed the connection");
                    break;
                }
                Ok(Ok(n)) => trace!(n, total = buf.len(), "read bytes"),
                Ok(Err(err)) => {
                    return Err(AppError::Connection(format!("failed to read response: {err}")));
                }
                Err(_elapsed) => {
                    return Err(AppError::Timeout(format!(
                        "socket timeout after {:?}; {}",
                        self.read_timeout,
                        describe_mismatch(&buf, expected)
                    )));
                }
            }
        }

        Ok(buf)
    }
}
