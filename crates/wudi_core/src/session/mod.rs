//! The socket session state machine (spec.md §4.4): one driver per
//! concurrent connection, generic over a `Transport` and a `ProxyHandshake`
//! implementation (§9 REDESIGN FLAGS) instead of the original's
//! `http_socket_base_t<Derived,Proxy>` CRTP hierarchy. [`AnySession`] is the
//! enum-of-variants §9 also names as an acceptable shape, used to pick the
//! right `{transport, handshake}` pair at task start without the task
//! executor itself being generic.

pub mod handshake;
pub mod limits;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use wudi_config::ProxyConfig;
use wudi_proxy::{ProxyEndpoint, ProxyProperty, ProxyRepository};
use wudi_sites::{AdapterState, Classification, SiteAdapter, SiteOutcome};

pub use handshake::{HandshakeOutcome, NoHandshake, ProxyHandshake, Socks5Handshake};
pub use transport::{PlainTransport, Transport, TlsTransport};

/// One classified (or terminal) outcome for a single number, handed back to
/// the task executor (spec.md §4.5 "on-classification callback").
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub number: String,
    pub classification: Classification,
}

enum NumberOutcome {
    Classified(Classification),
    RequestStop,
    Stopped,
}

enum ConnectionOutcome {
    Classified(Classification),
    Rotate(Option<ProxyProperty>),
    Reconnect,
    Stopped,
}

/// Drives one number at a time through connect -> (handshake) -> (TLS?) ->
/// send -> receive -> classify -> next-number, per spec.md §4.4.
pub struct SocketSession<T: Transport, H: ProxyHandshake> {
    adapter: Arc<dyn SiteAdapter>,
    repository: Arc<ProxyRepository>,
    number_stream: Arc<crate::stream::NumberStream>,
    proxy_cfg: ProxyConfig,
    target_port: u16,
    results_tx: mpsc::UnboundedSender<SessionResult>,
    stopped: Arc<AtomicBool>,
    _transport: std::marker::PhantomData<T>,
    _handshake: std::marker::PhantomData<H>,
}

impl<T: Transport, H: ProxyHandshake> SocketSession<T, H> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Arc<dyn SiteAdapter>,
        repository: Arc<ProxyRepository>,
        number_stream: Arc<crate::stream::NumberStream>,
        proxy_cfg: ProxyConfig,
        target_port: u16,
        results_tx: mpsc::UnboundedSender<SessionResult>,
        stopped: Arc<AtomicBool>,
    ) -> Self {
        Self {
            adapter,
            repository,
            number_stream,
            proxy_cfg,
            target_port,
            results_tx,
            stopped,
            _transport: std::marker::PhantomData,
            _handshake: std::marker::PhantomData,
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Runs until the number stream closes, the proxy pool permanently
    /// drains, or the shared `stopped` flag is set. The current proxy is
    /// held across numbers (only rotated on ban/quota/exhaustion), matching
    /// the `AdapterState` per-proxy session data the site adapters rely on.
    pub async fn run(self) {
        let mut current: Option<ProxyEndpoint> = None;
        let mut adapter_state = AdapterState::default();
        let mut proxy_auth: Option<(String, String)> = None;

        loop {
            if self.is_stopped() {
                return;
            }

            let number = match self.number_stream.next() {
                Ok(n) => n,
                Err(crate::stream::StreamError::Empty) => {
                    // Ambiguity resolution (a): an idle session re-polls
                    // rather than terminating.
                    tokio::time::sleep(limits::IDLE_POLL_INTERVAL).await;
                    continue;
                }
                Err(crate::stream::StreamError::Closed) => return,
            };

            match self
                .drive_number(&number, &mut current, &mut adapter_state, &mut proxy_auth)
                .await
            {
                NumberOutcome::Classified(classification) => {
                    let _ = self.results_tx.send(SessionResult { number, classification });
                }
                NumberOutcome::RequestStop => {
                    let _ = self.results_tx.send(SessionResult {
                        number: number.clone(),
                        classification: Classification::RequestStop,
                    });
                    self.number_stream.push_back(number);
                    return;
                }
                NumberOutcome::Stopped => {
                    self.number_stream.push_back(number);
                    return;
                }
            }
        }
    }

    /// The `ChoosingProxy` loop of spec.md §4.4: acquires (or keeps) a
    /// proxy endpoint and drives one connection attempt against it,
    /// rotating or reconnecting as the classifier demands.
    async fn drive_number(
        &self,
        number: &str,
        current: &mut Option<ProxyEndpoint>,
        adapter_state: &mut AdapterState,
        proxy_auth: &mut Option<(String, String)>,
    ) -> NumberOutcome {
        loop {
            if self.is_stopped() {
                return NumberOutcome::Stopped;
            }

            if let Some(quota) = self.adapter.per_proxy_quota() {
                if current.is_some() && adapter_state.success_count >= quota {
                    current.take();
                }
            }

            if current.is_none() {
                match self.repository.next_endpoint(&self.proxy_cfg).await {
                    Some(endpoint) => {
                        *current = Some(endpoint);
                        adapter_state.reset_for_new_proxy();
                        *proxy_auth = None;
                    }
                    None => return NumberOutcome::RequestStop,
                }
            }

            let endpoint = current.clone().expect("just ensured Some above");

            match self.drive_connection(number, &endpoint, adapter_state, proxy_auth).await {
                ConnectionOutcome::Classified(classification) => return NumberOutcome::Classified(classification),
                ConnectionOutcome::Rotate(mark) => {
                    if let Some(property) = mark {
                        self.repository.mark(&endpoint.address(), property).await;
                    }
                    current.take();
                }
                ConnectionOutcome::Reconnect => {
                    // 407: same endpoint, proxy_auth now set, loop retries.
                }
                ConnectionOutcome::Stopped => return NumberOutcome::Stopped,
            }
        }
    }

    /// Connecting -> (handshake) -> (TLS) -> Sending -> Receiving ->
    /// Classifying, for one attempt against one endpoint.
    async fn drive_connection(
        &self,
        number: &str,
        endpoint: &ProxyEndpoint,
        adapter_state: &mut AdapterState,
        proxy_auth: &mut Option<(String, String)>,
    ) -> ConnectionOutcome {
        let address = endpoint.address();

        let mut tcp = None;
        for attempt in 0..=limits::MAX_CONNECT_RETRIES {
            if self.is_stopped() {
                return ConnectionOutcome::Stopped;
            }
            match timeout(limits::TCP_CONNECT_TIMEOUT, TcpStream::connect(address.as_str())).await {
                Ok(Ok(stream)) => {
                    tcp = Some(stream);
                    break;
                }
                Ok(Err(e)) => debug!(attempt, proxy = %address, error = %e, "proxy connect failed"),
                Err(_) => debug!(attempt, proxy = %address, "proxy connect timed out"),
            }
        }
        let Some(mut tcp) = tcp else {
            return ConnectionOutcome::Rotate(Some(ProxyProperty::Unresponsive));
        };

        match H::establish(&mut tcp, self.adapter.hostname(), self.target_port).await {
            Ok(HandshakeOutcome::Ready) => {}
            Ok(HandshakeOutcome::Unresponsive) | Err(_) => {
                return ConnectionOutcome::Rotate(Some(ProxyProperty::Unresponsive));
            }
        }

        let mut transport = match T::upgrade(tcp, self.adapter.hostname(), limits::TLS_HANDSHAKE_TIMEOUT).await {
            Ok(t) => t,
            Err(e) => {
                warn!(proxy = %address, error = %e, "transport upgrade failed");
                return ConnectionOutcome::Rotate(Some(ProxyProperty::Unresponsive));
            }
        };

        let auth_ref = proxy_auth.as_ref().map(|(user, pass)| (user.as_str(), pass.as_str()));
        let request = self.adapter.prepare_request(number, adapter_state, auth_ref);
        let bytes = request.into_bytes();

        let mut sent = false;
        for attempt in 0..=limits::MAX_SEND_RETRIES {
            if self.is_stopped() {
                transport.close().await;
                return ConnectionOutcome::Stopped;
            }
            let send_timeout = limits::send_timeout_for_attempt(attempt);
            match timeout(send_timeout, transport.write_all(&bytes)).await {
                Ok(Ok(())) => {
                    sent = true;
                    break;
                }
                Ok(Err(e)) => debug!(attempt, proxy = %address, error = %e, "send failed"),
                Err(_) => debug!(attempt, proxy = %address, "send timed out"),
            }
        }
        if !sent {
            transport.close().await;
            return ConnectionOutcome::Rotate(Some(ProxyProperty::Unresponsive));
        }

        let mut buf = BytesMut::new();
        let response = wudi_http::read_response(
            &mut transport,
            &mut buf,
            limits::RECEIVE_TIMEOUT,
            limits::RECEIVE_TIMEOUT,
            limits::MAX_RESPONSE_HEADER_BYTES,
            limits::MAX_RESPONSE_BODY_BYTES,
        )
        .await;
        transport.close().await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                debug!(proxy = %address, error = %e, "failed to read response");
                return ConnectionOutcome::Rotate(Some(ProxyProperty::Unresponsive));
            }
        };

        match self.adapter.classify(response.status, &response, adapter_state) {
            SiteOutcome::Classified(classification) => ConnectionOutcome::Classified(classification),
            SiteOutcome::NeedsAuth => {
                *proxy_auth = Some((endpoint.username.clone(), endpoint.password.clone()));
                ConnectionOutcome::Reconnect
            }
            SiteOutcome::Rotate { mark } => ConnectionOutcome::Rotate(mark),
        }
    }
}

/// Selects the `{transport, handshake}` pair at task start (spec.md §9's
/// "enum of socket-session variants" alternative to making the task
/// executor itself generic).
pub enum AnySession {
    PlainHttp(SocketSession<PlainTransport, NoHandshake>),
    PlainSocks5(SocketSession<PlainTransport, Socks5Handshake>),
    TlsHttp(SocketSession<TlsTransport, NoHandshake>),
    TlsSocks5(SocketSession<TlsTransport, Socks5Handshake>),
}

impl AnySession {
    pub async fn run(self) {
        match self {
            AnySession::PlainHttp(s) => s.run().await,
            AnySession::PlainSocks5(s) => s.run().await,
            AnySession::TlsHttp(s) => s.run().await,
            AnySession::TlsSocks5(s) => s.run().await,
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn build_session(
    is_tls: bool,
    protocol: wudi_config::ProxyProtocol,
    adapter: Arc<dyn SiteAdapter>,
    repository: Arc<ProxyRepository>,
    number_stream: Arc<crate::stream::NumberStream>,
    proxy_cfg: ProxyConfig,
    target_port: u16,
    results_tx: mpsc::UnboundedSender<SessionResult>,
    stopped: Arc<AtomicBool>,
) -> AnySession {
    use wudi_config::ProxyProtocol;

    match (is_tls, protocol) {
        (false, ProxyProtocol::Http) => AnySession::PlainHttp(SocketSession::new(
            adapter, repository, number_stream, proxy_cfg, target_port, results_tx, stopped,
        )),
        (false, ProxyProtocol::Socks5) => AnySession::PlainSocks5(SocketSession::new(
            adapter, repository, number_stream, proxy_cfg, target_port, results_tx, stopped,
        )),
        (true, ProxyProtocol::Http) => AnySession::TlsHttp(SocketSession::new(
            adapter, repository, number_stream, proxy_cfg, target_port, results_tx, stopped,
        )),
        (true, ProxyProtocol::Socks5) => AnySession::TlsSocks5(SocketSession::new(
            adapter, repository, number_stream, proxy_cfg, target_port, results_tx, stopped,
        )),
    }
}
