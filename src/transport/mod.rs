//! src/transport/mod.rs
//!
//! The `Transport` contract and a QUIC-backed reference implementation.
//! Generalized from a push-only telemetry transport into a bidirectional
//! request/response RPC transport: each call opens its own QUIC bidi
//! stream, writes a bincode-framed `Command`, and reads back the
//! bincode-framed `RpcResponse`.

use crate::error::{Error, Result};
use crate::wire::{EagerSyncRequest, EagerSyncResponse, Rpc, SyncRequest, SyncResponse};
use quinn::{Connection, Endpoint, TokioRuntime};
use socket2::{Domain, Protocol, Socket, Type};
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

pub mod connection;
pub mod tls;

const MAX_MESSAGE_SIZE: usize = 1_024 * 1_024;
const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// The transport boundary consumed by the node runtime.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    fn local_addr(&self) -> String;
    /// Takes the inbound-RPC receiver. Must be called at most once.
    fn consumer(&mut self) -> mpsc::Receiver<Rpc>;
    async fn sync(&self, target: &str, req: SyncRequest) -> Result<SyncResponse>;
    async fn eager_sync(&self, target: &str, req: EagerSyncRequest) -> Result<EagerSyncResponse>;
    async fn close(&self);
}

/// A QUIC-backed `Transport`. Connections are cached and reused across
/// calls; a fresh connection is dialed lazily on first use or after the
/// cached one has closed.
pub struct QuicTransport {
    endpoint: Endpoint,
    connections: Arc<Mutex<HashMap<SocketAddr, Connection>>>,
    local_addr: SocketAddr,
    inbound_rx: Option<mpsc::Receiver<Rpc>>,
}

impl QuicTransport {
    /// Binds a QUIC endpoint and spawns the accept loop. Inbound RPCs are
    /// delivered on the receiver returned by [`Transport::consumer`].
    pub fn new(bind_addr: SocketAddr, shutdown: CancellationToken) -> Result<Self> {
        let (server_config, client_config) = tls::configure_tls()?;

        let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&bind_addr.into())?;
        let std_socket: std::net::UdpSocket = socket.into();
        std_socket.set_nonblocking(true)?;

        let mut endpoint = Endpoint::new(Default::default(), Some(server_config), std_socket, Arc::new(TokioRuntime))?;
        endpoint.set_default_client_config(client_config);
        let local_addr = endpoint.local_addr()?;

        let connections = Arc::new(Mutex::new(HashMap::new()));
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let accept_endpoint = endpoint.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("transport accept loop received shutdown signal");
                        break;
                    }
                    incoming = accept_endpoint.accept() => {
                        match incoming {
                            Some(connecting) => {
                                let inbound_tx = inbound_tx.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = connection::handle_connection(connecting, inbound_tx).await {
                                        tracing::warn!(error = %e, "inbound connection handling failed");
                                    }
                                });
                            }
                            None => {
                                tracing::info!("endpoint closed, transport accept loop exiting");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            endpoint,
            connections,
            local_addr,
            inbound_rx: Some(inbound_rx),
        })
    }

    async fn call(&self, addr: SocketAddr, command: crate::wire::Command) -> Result<crate::wire::RpcResponse> {
        let conn = connection::get_or_create_connection(self.endpoint.clone(), self.connections.clone(), addr).await?;
        tokio::time::timeout(RPC_TIMEOUT, connection::send_request(conn, command))
            .await
            .map_err(|_| Error::Timeout)?
    }
}

#[async_trait::async_trait]
impl Transport for QuicTransport {
    fn local_addr(&self) -> String {
        self.local_addr.to_string()
    }

    fn consumer(&mut self) -> mpsc::Receiver<Rpc> {
        self.inbound_rx.take().expect("transport consumer taken more than once")
    }

    async fn sync(&self, target: &str, req: SyncRequest) -> Result<SyncResponse> {
        let addr: SocketAddr = target.parse().map_err(|_| Error::NoPeer)?;
        match self.call(addr, crate::wire::Command::Sync(req)).await? {
            crate::wire::RpcResponse::Sync(resp) => Ok(resp),
            _ => Err(Error::Core("peer returned mismatched response variant".into())),
        }
    }

    async fn eager_sync(&self, target: &str, req: EagerSyncRequest) -> Result<EagerSyncResponse> {
        let addr: SocketAddr = target.parse().map_err(|_| Error::NoPeer)?;
        match self.call(addr, crate::wire::Command::EagerSync(req)).await? {
            crate::wire::RpcResponse::EagerSync(resp) => Ok(resp),
            _ => Err(Error::Core("peer returned mismatched response variant".into())),
        }
    }

    async fn close(&self) {
        self.endpoint.close(0u32.into(), b"node shutdown");
        self.endpoint.wait_idle().await;
    }
}
