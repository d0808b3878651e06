//! Protocol configurations mapped to their clients.
//!
//! Linking a protocol creates one [`WsClient`] for its endpoint and
//! registers the protocol-level subscriptions. Attributes linked through it
//! share that connection: each gets its own replay task and, optionally, a
//! message consumer. Unlinking the protocol releases the connection.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};
use wsbridge_core::{ConnectionStatus, EndpointDescriptor, LinkRef, ProtocolId, Subscription};
use wsbridge_http::HttpClient;

use crate::config::ClientConfig;
use crate::connection::WsClient;
use crate::errors::ClientError;
use crate::registry::MessageConsumer;
use crate::tasks::SubscriptionTask;

/// Registry of linked protocol configurations.
pub struct ConnectionHub {
    config: ClientConfig,
    http: Arc<dyn HttpClient>,
    clients: DashMap<ProtocolId, WsClient>,
}

impl ConnectionHub {
    /// Empty hub. Every client it creates shares `http`.
    pub fn new(config: ClientConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http,
            clients: DashMap::new(),
        }
    }

    /// Link a protocol configuration, replacing (and releasing) any client
    /// previously linked under `id`. The returned client is not connected.
    pub fn link_protocol(
        &self,
        id: ProtocolId,
        endpoint: EndpointDescriptor,
        subscriptions: Vec<Subscription>,
    ) -> WsClient {
        let client = WsClient::new(endpoint, self.config.clone(), Arc::clone(&self.http));
        if !subscriptions.is_empty() {
            let task = SubscriptionTask::new(client.executor().clone(), subscriptions);
            client.register_connected_task(LinkRef::protocol(id.clone()), task);
        }

        info!(protocol = %id, endpoint = %client.uri(), "protocol linked");
        if let Some(previous) = self.clients.insert(id, client.clone()) {
            previous.release();
        }
        client
    }

    /// Link an attribute through an already linked protocol.
    ///
    /// Re-linking the same attribute replaces its subscriptions and consumer.
    pub fn link_attribute(
        &self,
        link: LinkRef,
        subscriptions: Vec<Subscription>,
        consumer: Option<MessageConsumer>,
    ) -> Result<(), ClientError> {
        let client = self.client(link.protocol_id()).ok_or(ClientError::Released)?;

        let _ = client.remove_consumers(&link);
        if let Some(consumer) = consumer {
            client.on_message(link.clone(), consumer);
        }
        if subscriptions.is_empty() {
            let _ = client.unregister_connected_task(&link);
        } else {
            let task = SubscriptionTask::new(client.executor().clone(), subscriptions);
            client.register_connected_task(link.clone(), task);
        }
        debug!(%link, "attribute linked");
        Ok(())
    }

    /// Remove an attribute's task and consumers. Returns whether anything
    /// was registered for it.
    pub fn unlink_attribute(&self, link: &LinkRef) -> bool {
        let Some(client) = self.client(link.protocol_id()) else {
            return false;
        };
        let had_task = client.unregister_connected_task(link);
        let consumers = client.remove_consumers(link);
        debug!(%link, "attribute unlinked");
        had_task || consumers > 0
    }

    /// Unlink a protocol: every link through it is dropped and the
    /// connection is released.
    pub fn unlink_protocol(&self, id: &ProtocolId) -> bool {
        let Some((_, client)) = self.clients.remove(id) else {
            return false;
        };
        client.release();
        info!(protocol = %id, "protocol unlinked");
        true
    }

    /// Client linked under `id`.
    pub fn client(&self, id: &ProtocolId) -> Option<WsClient> {
        self.clients.get(id).map(|entry| entry.value().clone())
    }

    /// Call `connect()` on every linked client.
    pub fn connect_all(&self) {
        for client in self.snapshot() {
            client.connect();
        }
    }

    /// Call `disconnect()` on every linked client.
    pub fn disconnect_all(&self) {
        for client in self.snapshot() {
            client.disconnect();
        }
    }

    /// Current status of every linked protocol.
    pub fn statuses(&self) -> Vec<(ProtocolId, ConnectionStatus)> {
        let mut out: Vec<_> = self
            .clients
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Number of linked protocols.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// No protocol is linked.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    // Clients are cloned out so no map shard lock is held while they run
    // observers.
    fn snapshot(&self) -> Vec<WsClient> {
        self.clients.iter().map(|entry| entry.value().clone()).collect()
    }
}
