//! Processor-Konfiguration

use kollab_bus::BusConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub bus: BusConfig,
    /// Channel mit GatewayEvents (Gateway -> Processor)
    pub incoming_channel: String,
    /// Channel fuer BroadcastEvents (Processor -> Gateway)
    pub outgoing_channel: String,
    /// Pipeline-Logs pro Event (DEBUG/INFO); Warnungen und Fehler immer
    pub logging_aktiv: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            incoming_channel: "events:gateway".into(),
            outgoing_channel: "events:broadcast".into(),
            logging_aktiv: true,
        }
    }
}
