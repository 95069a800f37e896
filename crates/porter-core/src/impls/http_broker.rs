//! HttpBroker - the production broker client.
//!
//! Every call is a JSON request under `<base>/api/v1/goqueue`. Control calls
//! carry the configured timeout; polls wait as long as the broker holds them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;

use crate::config::Config;
use crate::domain::JobResponse;
use crate::ports::{
    Acknowledgement, Broker, BrokerError, PublishRequest, QueueDeclaration, Subscription,
    TaskRegistration,
};

const API_PREFIX: &str = "/api/v1/goqueue";

#[derive(Debug, Clone)]
pub struct HttpBroker {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBroker {
    /// `base_uri` is `http://host:port`, without the API prefix.
    pub fn new(base_uri: impl AsRef<str>, timeout: Duration) -> Self {
        Self::with_client(Client::new(), base_uri, timeout)
    }

    pub fn with_client(client: Client, base_uri: impl AsRef<str>, timeout: Duration) -> Self {
        let base = base_uri.as_ref().trim_end_matches('/');
        Self {
            client,
            base_url: format!("{base}{API_PREFIX}"),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.broker_uri(), config.timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<(), BrokerError> {
        let request = self
            .client
            .post(self.url(path))
            .timeout(self.timeout)
            .json(body);
        send(path, request).await?;
        Ok(())
    }
}

async fn send(endpoint: &str, request: RequestBuilder) -> Result<Response, BrokerError> {
    let resp = request
        .send()
        .await
        .map_err(|e| BrokerError::Transport(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(BrokerError::Status {
            endpoint: endpoint.to_string(),
            status: resp.status().as_u16(),
        });
    }
    Ok(resp)
}

#[async_trait]
impl Broker for HttpBroker {
    async fn declare_queue(&self, declaration: &QueueDeclaration) -> Result<(), BrokerError> {
        self.post_json("/queue", declaration).await
    }

    async fn publish(&self, request: &PublishRequest) -> Result<(), BrokerError> {
        self.post_json("/", request).await
    }

    async fn register_tasks(&self, registration: &TaskRegistration) -> Result<(), BrokerError> {
        self.post_json("/task/register", registration).await
    }

    async fn subscribe(&self, subscription: &Subscription) -> Result<(), BrokerError> {
        self.post_json("/subscribe", subscription).await
    }

    async fn poll(&self, queue: &str, subscriber: &str) -> Result<JobResponse, BrokerError> {
        let path = format!("/queue/{queue}");
        let request = self
            .client
            .get(self.url(&path))
            .query(&[("sname", subscriber)]);
        let resp = send(&path, request).await?;

        let body = resp
            .bytes()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| BrokerError::Decode(e.to_string()))
    }

    async fn acknowledge(&self, ack: &Acknowledgement) -> Result<(), BrokerError> {
        self.post_json("/task/acknowledge", ack).await
    }
}
