//! One-shot localhost listener for the authorization redirect.

use std::future::Future;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::parser::{parse_request, CallbackRequest};

pub const DEFAULT_PORT: u16 = 3000;

// Upper bound on the request line plus headers read from one connection.
const MAX_REQUEST_HEAD: u64 = 8192;

pub const SUCCESS_BODY: &str = "User authentication was successful!!\nThe access token was output to the console.\n\nPlease close this window.";
const REJECTED_BODY: &str = "User authentication failed.\nThe callback state did not match this request.\n\nPlease close this window and retry.";

/// The redirect URI a listener on `port` answers to
pub fn redirect_uri(port: u16) -> String {
    format!("http://localhost:{}/", port)
}

/// A bound listener waiting for the single redirect of a handshake
///
/// The sockets live exactly as long as this value. [`serve_once`] consumes
/// it, so they are closed when it returns, whatever the outcome.
///
/// [`serve_once`]: CallbackListener::serve_once
#[derive(Debug)]
pub struct CallbackListener {
    port: u16,
    listener_v4: Option<TcpListener>,
    listener_v6: Option<TcpListener>,
}

impl CallbackListener {
    /// Binds the loopback addresses on `port`
    ///
    /// IPv4 is bound first and its port reused for IPv6, so port 0 yields one
    /// free port shared by both. Either family alone is enough.
    pub async fn bind(port: u16) -> Result<Self> {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener_v4) => {
                let port = listener_v4.local_addr()?.port();
                let listener_v6 = match TcpListener::bind(("::1", port)).await {
                    Ok(listener) => Some(listener),
                    Err(err) => {
                        debug!("skipping [::1]:{}: {}", port, err);
                        None
                    }
                };

                info!("listening for callback on port {}", port);

                Ok(Self {
                    port,
                    listener_v4: Some(listener_v4),
                    listener_v6,
                })
            }

            Err(v4_err) => {
                let listener_v6 = TcpListener::bind(("::1", port)).await.map_err(|v6_err| {
                    debug!("binding [::1]:{} failed too: {}", port, v6_err);
                    v4_err
                })?;
                let port = listener_v6.local_addr()?.port();

                info!("listening for callback on port {} (IPv6 only)", port);

                Ok(Self {
                    port,
                    listener_v4: None,
                    listener_v6: Some(listener_v6),
                })
            }
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The redirect URI that routes the browser back to this listener
    pub fn redirect_uri(&self) -> String {
        redirect_uri(self.port)
    }

    /// Waits for the first inbound request, runs `handler`, and answers it
    ///
    /// Any method and path is accepted. Connections that close without a
    /// request or send something that is not an HTTP request line are dropped
    /// and the listener keeps waiting. If the request carries a `state` query
    /// parameter it must equal `expected_state`, otherwise the browser gets a
    /// 400 and the handler never runs. When the handler fails its error is
    /// returned and the browser gets no answer.
    pub async fn serve_once<F, Fut, T>(self, expected_state: &str, handler: F) -> Result<T>
    where
        F: FnOnce(CallbackRequest) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (mut socket, request) = self.next_request().await?;
        info!("received callback {} {}", request.method, request.path);

        if let Some(state) = &request.state {
            if state != expected_state {
                respond(&mut socket, "400 Bad Request", REJECTED_BODY).await;
                return Err(Error::Callback("state mismatch".to_string()));
            }
        }

        let value = handler(request).await?;
        respond(&mut socket, "200 OK", SUCCESS_BODY).await;

        Ok(value)
    }

    /// Accepts connections until one of them delivers a request line
    ///
    /// Connections are read concurrently so an idle preconnect cannot hold up
    /// the redirect. Readers still pending when a request arrives are aborted
    /// with the set.
    async fn next_request(&self) -> Result<(TcpStream, CallbackRequest)> {
        let mut readers = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.accept() => {
                    readers.spawn(read_request(accepted?));
                }
                Some(joined) = readers.join_next() => match joined {
                    Ok(Ok(found)) => return Ok(found),
                    Ok(Err(err)) => debug!("dropping callback connection: {}", err),
                    Err(err) => debug!("callback reader stopped: {}", err),
                },
            }
        }
    }

    async fn accept(&self) -> Result<TcpStream> {
        let (socket, peer) = match (self.listener_v4.as_ref(), self.listener_v6.as_ref()) {
            (Some(v4), Some(v6)) => {
                tokio::select! {
                    result = v4.accept() => result?,
                    result = v6.accept() => result?,
                }
            }
            (Some(v4), None) => v4.accept().await?,
            (None, Some(v6)) => v6.accept().await?,
            (None, None) => return Err(Error::Callback("listener is not bound".to_string())),
        };

        debug!("accepted callback connection from {}", peer);
        Ok(socket)
    }
}

/// Reads the request line and the header block of one connection
async fn read_request(socket: TcpStream) -> Result<(TcpStream, CallbackRequest)> {
    let mut reader = BufReader::new(socket);
    let mut head = (&mut reader).take(MAX_REQUEST_HEAD);

    let mut line = String::new();
    if head.read_line(&mut line).await? == 0 {
        return Err(Error::Callback("connection closed without a request".to_string()));
    }

    let request = parse_request(&line)?;

    loop {
        let mut header = String::new();
        if head.read_line(&mut header).await? == 0 || header.trim_end().is_empty() {
            break;
        }
    }

    Ok((reader.into_inner(), request))
}

// The token is already in hand by the time this runs, so a browser that went
// away is only worth a warning.
async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );

    if let Err(err) = socket.write_all(response.as_bytes()).await {
        warn!("could not answer callback: {}", err);
        return;
    }

    if let Err(err) = socket.shutdown().await {
        debug!("could not close callback connection: {}", err);
    }
}
