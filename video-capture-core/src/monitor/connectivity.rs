use std::time::Duration;

use crate::models::config::ConnectivityConfig;
use crate::monitor::throttle::Throttle;
use crate::traits::reachability::{ReachabilityProbe, TcpProbe};

/// Rate-limited "are we online?" signal.
///
/// Sits on the hot path of both the recorder's flush loop and the watcher
/// cycle, so a real probe runs at most once per throttle window.
pub struct ConnectivityMonitor {
    probe: Box<dyn ReachabilityProbe>,
    state: Throttle<bool>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Box<dyn ReachabilityProbe>, throttle: Duration) -> Self {
        Self {
            probe,
            state: Throttle::new(throttle),
        }
    }

    /// TCP probe against the configured endpoint.
    pub fn from_config(config: &ConnectivityConfig) -> Self {
        let probe = TcpProbe::new(config.host.clone(), config.port, config.timeout);
        Self::new(Box::new(probe), config.throttle)
    }

    pub fn is_connected(&self) -> bool {
        let previous = self.state.cached();
        let connected = self.state.get_or_refresh(|| self.probe.probe());
        if previous != Some(connected) {
            log::debug!("Connectivity: {}", if connected { "online" } else { "offline" });
        }
        connected
    }
}
