//! Builds a [`ConnectionHub`] from loaded settings.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use wsbridge_client::{ClientConfig, ConnectionHub, InboundMessage, MessageConsumer, MessageFilter};
use wsbridge_core::LinkRef;
use wsbridge_http::HttpClient;
use wsbridge_settings::{ClientSettings, WsBridgeSettings};

/// Client timings from settings.
pub fn client_config(settings: &ClientSettings) -> ClientConfig {
    ClientConfig {
        idle_timeout: settings.idle_timeout(),
        pong_timeout: settings.pong_timeout(),
        connect_timeout: settings.connect_timeout(),
        settle_delay: settings.connected_settle_delay(),
        late_registration_delay: settings.late_registration_delay(),
    }
}

/// Consumer that logs every message delivered to `link`.
fn logging_consumer(link: LinkRef) -> MessageConsumer {
    Arc::new(move |message: &InboundMessage| match message {
        InboundMessage::Text(text) => info!(%link, payload = %text, "message received"),
        InboundMessage::Binary(data) => info!(%link, bytes = data.len(), "binary message received"),
    })
}

/// Link every configured endpoint and attribute. Nothing is connected yet.
pub fn build_hub(settings: &WsBridgeSettings, http: Arc<dyn HttpClient>) -> Result<ConnectionHub> {
    let hub = ConnectionHub::new(client_config(&settings.client), http);

    for endpoint in &settings.endpoints {
        let _ = hub.link_protocol(
            endpoint.id.clone(),
            endpoint.endpoint.clone(),
            endpoint.subscriptions.clone(),
        );

        for link in &endpoint.links {
            let link_ref = link.link_ref(&endpoint.id);
            let consumer = match &link.message_match {
                Some(rule) => {
                    let filter = MessageFilter::compile(rule)
                        .with_context(|| format!("invalid message match for {link_ref}"))?;
                    filter.wrap(logging_consumer(link_ref.clone()))
                }
                None => logging_consumer(link_ref.clone()),
            };
            hub.link_attribute(link_ref.clone(), link.subscriptions.clone(), Some(consumer))
                .with_context(|| format!("failed to link {link_ref}"))?;
        }
    }

    Ok(hub)
}
