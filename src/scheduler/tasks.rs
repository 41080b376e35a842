use tracing::{info, warn};

use crate::hub::Connector;

/// One line describing the connector's health.
pub fn heartbeat_line(connector: &dyn Connector) -> String {
    let me = connector.self_identity();
    let state = if connector.alive() {
        "connected"
    } else {
        "not connected"
    };
    format!("Heartbeat: {} ({}) event stream {}", me.nick_name, me.id, state)
}

/// Log the heartbeat line, as a warning while the stream is down.
pub fn report_heartbeat(connector: &dyn Connector) {
    if connector.alive() {
        info!("{}", heartbeat_line(connector));
    } else {
        warn!("{}", heartbeat_line(connector));
    }
}
