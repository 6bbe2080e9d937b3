//! NATS EventBus and broker monitor.
//!
//! Production messaging adapter: domain events are published as JSON on
//! subject hierarchies (`labops.work_orders.*`, `labops.jobs.*`) and the
//! broker monitor reports the live connection state to the dispatch
//! health gate.

use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use labops_server_domain::clients::BrokerStatus;
use labops_server_domain::event_bus::{EventBus, EventBusError};
use labops_server_domain::events::DomainEvent;

/// NATS connection configuration with sensible local defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    pub connection_timeout_secs: u64,
    pub name: Option<String>,
}

impl NatsConfig {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_timeout_secs: 5,
            name: Some("labops-server".to_string()),
        }
    }
}

/// EventBus backed by a core NATS connection.
#[derive(Clone)]
pub struct NatsEventBus {
    client: Client,
}

impl NatsEventBus {
    pub async fn connect(config: &NatsConfig) -> Result<Self, EventBusError> {
        let mut options = ConnectOptions::new()
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs));
        if let Some(name) = &config.name {
            options = options.name(name);
        }

        let client = options
            .connect(&config.url)
            .await
            .map_err(|e| EventBusError::ConnectionError(e.to_string()))?;

        info!(url = %config.url, "Connected to NATS");
        Ok(Self { client })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn publish(&self, event: &DomainEvent) -> Result<(), EventBusError> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| EventBusError::SerializationError(e.to_string()))?;

        self.client
            .publish(event.subject().to_string(), payload.into())
            .await
            .map_err(|e| EventBusError::PublishError(e.to_string()))?;

        debug!(
            subject = event.subject(),
            event_type = event.event_type(),
            "Event published"
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<BoxStream<'static, Result<DomainEvent, EventBusError>>, EventBusError> {
        let subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| EventBusError::SubscribeError(e.to_string()))?;

        Ok(subscriber
            .map(|message| {
                serde_json::from_slice(&message.payload)
                    .map_err(|e| EventBusError::SerializationError(e.to_string()))
            })
            .boxed())
    }
}

/// Broker health monitor over the live NATS connection.
pub struct NatsBrokerMonitor {
    client: Client,
}

impl NatsBrokerMonitor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BrokerStatus for NatsBrokerMonitor {
    fn events_enabled(&self) -> bool {
        true
    }

    async fn working(&self) -> bool {
        matches!(
            self.client.connection_state(),
            async_nats::connection::State::Connected
        )
    }
}
