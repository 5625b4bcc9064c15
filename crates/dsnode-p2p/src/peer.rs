use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Network address of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub addr: SocketAddr,
}

impl Peer {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Peer {
            addr: SocketAddr::new(ip, port),
        }
    }

    /// Address rendered for state-trace log lines.
    pub fn printable_ip(&self) -> String {
        self.addr.ip().to_string()
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.addr)
    }
}
