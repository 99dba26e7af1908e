//! LAN address discovery.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use tracing::{debug, warn};

/// Target used to pick the outbound interface. Connecting a UDP socket sends
/// nothing, so this never has to be reachable.
pub const PROBE_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 255, 255, 255), 1));

/// Address of the interface the OS would route outbound traffic through,
/// or `127.0.0.1` when there is no route.
pub fn resolve() -> Ipv4Addr {
    resolve_via(PROBE_ADDR)
}

/// Same as [`resolve`] with an explicit probe target.
pub fn resolve_via(probe: SocketAddr) -> Ipv4Addr {
    match outbound_ipv4(probe) {
        Ok(ip) => {
            debug!("Resolved LAN address {} via {}", ip, probe);
            ip
        }
        Err(e) => {
            warn!(
                "Could not determine LAN address ({}), falling back to {}",
                e,
                Ipv4Addr::LOCALHOST
            );
            Ipv4Addr::LOCALHOST
        }
    }
}

fn outbound_ipv4(probe: SocketAddr) -> io::Result<Ipv4Addr> {
    // Dropped on every return path.
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(probe)?;

    match socket.local_addr()? {
        SocketAddr::V4(addr) if !addr.ip().is_unspecified() => Ok(*addr.ip()),
        other => Err(io::Error::other(format!(
            "unusable local address {}",
            other.ip()
        ))),
    }
}
