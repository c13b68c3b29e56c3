//! Product analytics events.

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::{debug, info};
use url::Url;

use crate::{APP_USER_AGENT, BoxFuture};

static ANALYTICS: OnceCell<Arc<dyn Analytics>> = OnceCell::new();

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnalyticsEvent {
    pub distinct_id: String,
    pub event: String,
    pub properties: Map<String, Value>,
    /// Group type to group key, e.g. `account` to the account id.
    pub groups: BTreeMap<String, String>,
}

impl AnalyticsEvent {
    #[must_use]
    pub fn new(distinct_id: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            distinct_id: distinct_id.into(),
            event: event.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn group(mut self, group_type: &str, key: impl Into<String>) -> Self {
        self.groups.insert(group_type.to_string(), key.into());
        self
    }
}

pub trait Analytics: Send + Sync {
    fn capture(&self, event: AnalyticsEvent) -> BoxFuture<'_, ()>;
}

/// Posts events to a `/capture/` endpoint.
pub struct HttpAnalytics {
    client: Client,
    endpoint: Url,
    api_key: SecretString,
}

impl HttpAnalytics {
    /// # Errors
    /// Returns an error if `host` is not a valid base URL or the client cannot be built.
    pub fn new(host: &str, api_key: SecretString) -> Result<Self> {
        let endpoint = Url::parse(host)
            .and_then(|base| base.join("/capture/"))
            .with_context(|| format!("invalid analytics host: {host}"))?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build analytics client")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    fn payload(&self, event: &AnalyticsEvent) -> Value {
        capture_payload(self.api_key.expose_secret(), event)
    }
}

fn capture_payload(api_key: &str, event: &AnalyticsEvent) -> Value {
    let mut properties = event.properties.clone();
    if !event.groups.is_empty() {
        properties.insert("$groups".to_string(), json!(event.groups));
    }
    json!({
        "api_key": api_key,
        "event": event.event,
        "distinct_id": event.distinct_id,
        "properties": properties,
    })
}

impl Analytics for HttpAnalytics {
    fn capture(&self, event: AnalyticsEvent) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.endpoint.clone())
                .json(&self.payload(&event))
                .send()
                .await
                .context("analytics request failed")?;
            let status = response.status();
            if !status.is_success() {
                return Err(anyhow!("analytics endpoint returned {status}"));
            }
            debug!(event = %event.event, "analytics event captured");
            Ok(())
        })
    }
}

/// Logs events instead of sending them.
#[derive(Clone, Debug)]
pub struct LogAnalytics;

impl Analytics for LogAnalytics {
    fn capture(&self, event: AnalyticsEvent) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            info!(
                event = %event.event,
                distinct_id = %event.distinct_id,
                properties = %serde_json::Value::Object(event.properties),
                "analytics capture stub"
            );
            Ok(())
        })
    }
}

/// Install the process-wide analytics client. The first call wins.
pub fn init(client: Arc<dyn Analytics>) -> Arc<dyn Analytics> {
    ANALYTICS.get_or_init(|| client).clone()
}
