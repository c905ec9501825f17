use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// A single, unthrottled reachability attempt.
pub trait ReachabilityProbe: Send + Sync {
    fn probe(&self) -> bool;
}

/// Connect-with-timeout to a well-known TCP endpoint.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    fn addresses(&self) -> Vec<SocketAddr> {
        match (self.host.as_str(), self.port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                log::debug!("Cannot resolve {}:{}: {}", self.host, self.port, e);
                Vec::new()
            }
        }
    }
}

impl ReachabilityProbe for TcpProbe {
    fn probe(&self) -> bool {
        self.addresses()
            .iter()
            .any(|addr| TcpStream::connect_timeout(addr, self.timeout).is_ok())
    }
}
