use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Destination for outgoing voxel packets.
pub trait PacketSink: Send + Sync {
    fn send_to(&self, peer: SocketAddr, packet: &[u8]) -> io::Result<()>;
}

/// UDP socket shared by the receive loop and the send loop.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}

impl PacketSink for UdpTransport {
    /// Datagrams that would block are dropped; the peer's marker already
    /// counts them as sent.
    fn send_to(&self, peer: SocketAddr, packet: &[u8]) -> io::Result<()> {
        self.socket.try_send_to(packet, peer).map(|_| ())
    }
}
