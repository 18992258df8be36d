//! RouterOS API session over plain TCP.
//!
//! LIFECYCLE
//! =========
//! 1. Dial the API port and log in (`/login =name= =password=`)
//! 2. `run` writes one command sentence and collects `!re` rows until `!done`
//! 3. `close` shuts the socket down; a dropped client closes implicitly
//!
//! ERROR HANDLING
//! ==============
//! Every dial, write and read is bounded by the session timeout. A `!trap`
//! is drained through its trailing `!done` so the session stays aligned and
//! can be reused; a `!fatal` or any transport error means the caller should
//! throw the session away and reconnect.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::debug;

use super::codec::{Reply, Row, encode_sentence, parse_reply, read_sentence};
use crate::source::FetchError;

/// Rows plus the attributes carried on the closing `!done`.
#[derive(Debug, Default)]
struct Response {
    rows: Vec<Row>,
    done: Row,
}

pub struct RouterOsClient {
    stream: BufStream<TcpStream>,
    timeout: Duration,
}

async fn within<F, T, E>(limit: Duration, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, E>>,
    FetchError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(FetchError::from),
        Err(_) => Err(FetchError::Timeout(limit)),
    }
}

impl RouterOsClient {
    /// Dial `address` and authenticate.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Auth`] when the router rejects the credentials
    /// or only offers the pre-6.43 challenge login, and transport errors
    /// otherwise.
    pub async fn connect(address: &str, username: &str, password: &str, timeout: Duration) -> Result<Self, FetchError> {
        let stream = within(timeout, TcpStream::connect(address)).await?;
        let mut client = Self { stream: BufStream::new(stream), timeout };
        client.login(username, password).await?;
        debug!(%address, %username, "routeros: session established");
        Ok(client)
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<(), FetchError> {
        let name = format!("=name={username}");
        let pass = format!("=password={password}");
        let response = match self.command(&["/login", &name, &pass]).await {
            Ok(response) => response,
            Err(FetchError::Trap { message }) => return Err(FetchError::Auth(message)),
            Err(e) => return Err(e),
        };
        if response.done.contains_key("ret") {
            return Err(FetchError::Auth("router requires legacy challenge login".into()));
        }
        Ok(())
    }

    /// Run a print-style command and return every data row.
    ///
    /// # Errors
    ///
    /// [`FetchError::Trap`] when the router rejects the command, otherwise
    /// transport and protocol errors.
    pub async fn run(&mut self, command: &str) -> Result<Vec<Row>, FetchError> {
        Ok(self.command(&[command]).await?.rows)
    }

    async fn command(&mut self, words: &[&str]) -> Result<Response, FetchError> {
        let bytes = encode_sentence(words);
        let limit = self.timeout;
        within(limit, async {
            self.stream.write_all(&bytes).await?;
            self.stream.flush().await
        })
        .await?;

        let mut response = Response::default();
        let mut trap: Option<String> = None;
        loop {
            let words = within(limit, read_sentence(&mut self.stream)).await?;
            match parse_reply(words)? {
                Reply::Row(row) => response.rows.push(row),
                Reply::Empty => {}
                Reply::Trap(attrs) => {
                    // EDGE: keep the first trap; the router may send several.
                    if trap.is_none() {
                        trap = Some(attrs.get("message").cloned().unwrap_or_default());
                    }
                }
                Reply::Fatal(message) => return Err(FetchError::Fatal(message)),
                Reply::Done(attrs) => {
                    if let Some(message) = trap {
                        return Err(FetchError::Trap { message });
                    }
                    response.done = attrs;
                    return Ok(response);
                }
            }
        }
    }

    /// Shut the session down, ignoring errors from an already-dead socket.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
