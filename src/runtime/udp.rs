// SPDX-License-Identifier: Apache-2.0 OR MIT
//! UDP transport: one socket per participating interface
//!
//! Each socket is bound to the AIMF port on its own device, joins the HELLO
//! group on that interface and sends with it as the multicast interface.
//! A receive task per socket forwards datagrams to the main loop.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use socket2::{Domain, InterfaceIndexOrAddress, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::RuntimeEvent;
use crate::engine::{Transport, TransportError};
use crate::logging::{Facility, Logger, Severity};
use crate::protocols::AIMF_HELLO_GROUP;
use crate::NetworkInterface;

/// Largest datagram accepted from the network
const RECV_BUFFER_SIZE: usize = 65_535;

const RECV_ERROR_BACKOFF: std::time::Duration = std::time::Duration::from_millis(100);

/// HELLOs are link-local
const HELLO_IP_TTL: u32 = 1;

struct BoundSocket {
    socket: Arc<UdpSocket>,
    receiver: JoinHandle<()>,
}

/// [`Transport`] over tokio UDP sockets
pub struct UdpTransport {
    sockets: HashMap<u32, BoundSocket>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    logger: Logger,
}

impl UdpTransport {
    pub fn new(event_tx: mpsc::Sender<RuntimeEvent>, logger: Logger) -> Self {
        Self {
            sockets: HashMap::new(),
            event_tx,
            logger,
        }
    }

    pub fn bound_interfaces(&self) -> Vec<u32> {
        self.sockets.keys().copied().collect()
    }
}

/// Create the per-interface socket
fn open_socket(interface: &NetworkInterface, port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    #[cfg(any(target_os = "linux", target_os = "android"))]
    socket.bind_device(Some(interface.name.as_bytes()))?;
    socket.bind(&SocketAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).into())?;
    socket.join_multicast_v4_n(
        &AIMF_HELLO_GROUP,
        &InterfaceIndexOrAddress::Index(interface.index),
    )?;
    socket.set_multicast_if_v4(&interface.address)?;
    socket.set_multicast_ttl_v4(HELLO_IP_TTL)?;
    socket.set_multicast_loop_v4(false)?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

async fn receive_loop(
    interface: u32,
    socket: Arc<UdpSocket>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    logger: Logger,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, SocketAddr::V4(from))) => {
                let event = RuntimeEvent::Datagram {
                    interface,
                    sender: *from.ip(),
                    payload: buf[..len].to_vec(),
                };
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            Ok((_, SocketAddr::V6(_))) => {}
            Err(e) => {
                log_kv!(
                    logger,
                    Severity::Warning,
                    Facility::Transport,
                    "Receive failed",
                    "iface" => &interface.to_string(),
                    "error" => &e.to_string()
                );
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
            }
        }
    }
}

impl Transport for UdpTransport {
    fn bind(&mut self, interface: &NetworkInterface, port: u16) -> Result<(), TransportError> {
        let socket = open_socket(interface, port).map_err(|source| TransportError::Bind {
            interface: interface.name.clone(),
            port,
            source,
        })?;
        let socket = Arc::new(socket);
        let receiver = tokio::spawn(receive_loop(
            interface.index,
            socket.clone(),
            self.event_tx.clone(),
            self.logger.clone(),
        ));
        if let Some(old) = self
            .sockets
            .insert(interface.index, BoundSocket { socket, receiver })
        {
            old.receiver.abort();
        }
        Ok(())
    }

    fn unbind(&mut self, interface: u32) {
        if let Some(bound) = self.sockets.remove(&interface) {
            bound.receiver.abort();
        }
    }

    fn send(
        &mut self,
        interface: u32,
        payload: &[u8],
        destination: SocketAddrV4,
    ) -> Result<(), TransportError> {
        let bound = self
            .sockets
            .get(&interface)
            .ok_or(TransportError::NotBound(interface))?;
        bound
            .socket
            .try_send_to(payload, SocketAddr::V4(destination))
            .map(|_| ())
            .map_err(|source| TransportError::Send { interface, source })
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        for (_, bound) in self.sockets.drain() {
            bound.receiver.abort();
        }
    }
}
