//! src/transport/connection.rs
//!
//! Establishing, caching, and using QUIC connections for RPC calls. Each
//! call gets its own bidirectional stream: the request is written and the
//! send side finished, then the response is read to completion.

use crate::error::{Error, Result};
use crate::transport::MAX_MESSAGE_SIZE;
use crate::wire::{Command, Rpc, RpcResponse};
use quinn::{Connection, Endpoint};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::{mpsc, oneshot, Mutex};

async fn connect_to_peer(endpoint: Endpoint, peer_addr: SocketAddr) -> Result<Connection> {
    let connecting = endpoint
        .connect(peer_addr, "localhost")
        .map_err(|e| Error::ConnectFailed(peer_addr, e))?;
    let conn = connecting
        .await
        .map_err(|e| Error::ConnectionEstablishFailed(peer_addr, e))?;
    tracing::debug!(peer = %peer_addr, "connected to peer");
    Ok(conn)
}

pub async fn get_or_create_connection(
    endpoint: Endpoint,
    connections: Arc<Mutex<HashMap<SocketAddr, Connection>>>,
    addr: SocketAddr,
) -> Result<Connection> {
    let mut guard = connections.lock().await;
    if let Some(conn) = guard.get(&addr) {
        if conn.close_reason().is_none() {
            return Ok(conn.clone());
        }
        guard.remove(&addr);
    }
    drop(guard);

    let conn = connect_to_peer(endpoint, addr).await?;
    connections.lock().await.insert(addr, conn.clone());
    Ok(conn)
}

/// Opens a fresh bidi stream, sends `command`, and returns the peer's
/// decoded `RpcResponse`.
pub async fn send_request(conn: Connection, command: Command) -> Result<RpcResponse> {
    let (mut send, mut recv) = conn.open_bi().await?;
    let bytes = bincode::serialize(&command)?;
    send.write_all(&bytes).await?;
    send.finish().await?;

    let response_bytes = recv.read_to_end(MAX_MESSAGE_SIZE).await?;
    let response: RpcResponse = bincode::deserialize(&response_bytes)?;
    Ok(response)
}

/// Accepts bidi streams on an inbound connection, decodes each as a
/// `Command`, forwards it as an `Rpc` with a one-shot reply channel, and
/// writes the eventual response back on the same stream.
pub async fn handle_connection(connecting: quinn::Connecting, inbound_tx: mpsc::Sender<Rpc>) -> Result<()> {
    let connection = connecting.await?;
    let peer_addr = connection.remote_address();
    tracing::debug!(peer = %peer_addr, "accepted inbound connection");

    loop {
        tokio::select! {
            stream = connection.accept_bi() => {
                match stream {
                    Ok((send, recv)) => {
                        let inbound_tx = inbound_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_one_rpc(send, recv, inbound_tx).await {
                                tracing::warn!(peer = %peer_addr, error = %e, "failed to serve inbound RPC");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::debug!(peer = %peer_addr, error = %e, "connection stream acceptance ended");
                        return Ok(());
                    }
                }
            }
            reason = connection.closed() => {
                tracing::debug!(peer = %peer_addr, reason = %reason, "inbound connection closed");
                return Ok(());
            }
        }
    }
}

async fn serve_one_rpc(
    mut send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    inbound_tx: mpsc::Sender<Rpc>,
) -> Result<()> {
    let request_bytes = recv.read_to_end(MAX_MESSAGE_SIZE).await?;
    let command: Command = bincode::deserialize(&request_bytes)?;

    let (respond_to, response_rx) = oneshot::channel();
    if inbound_tx.send(Rpc { command, respond_to }).await.is_err() {
        tracing::warn!("runtime dropped its inbound RPC channel");
        return Ok(());
    }

    let response = response_rx.await.map_err(|_| Error::ChannelClosed)?;
    let bytes = bincode::serialize(&response)?;
    send.write_all(&bytes).await?;
    send.finish().await?;
    Ok(())
}
