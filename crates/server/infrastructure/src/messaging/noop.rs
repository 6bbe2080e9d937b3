//! Disabled broker variant, selected once at boot when broker-backed
//! eventing is switched off.

use async_trait::async_trait;

use labops_server_domain::clients::BrokerStatus;

/// No-op broker: eventing disabled, never reported healthy. The dispatch
/// job bypasses the health gate entirely when `events_enabled` is false.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBroker;

#[async_trait]
impl BrokerStatus for DisabledBroker {
    fn events_enabled(&self) -> bool {
        false
    }

    async fn working(&self) -> bool {
        false
    }
}
