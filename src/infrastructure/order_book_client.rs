//! Order book REST client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::domain::transactions::{OrderBookService, OrderReceipt};
use crate::shared::errors::ProviderError;

pub struct OrderBookClient {
    http_client: Client,
    base_url: String,
}

impl OrderBookClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
        })
    }

    fn order_url(&self, uid: &str) -> String {
        format!("{}/api/v1/orders/{}", self.base_url.trim_end_matches('/'), uid)
    }
}

#[async_trait]
impl OrderBookService for OrderBookClient {
    async fn get_order(&self, uid: &str) -> Result<Option<OrderReceipt>, ProviderError> {
        let url = self.order_url(uid);
        debug!("Fetching order {}", url);

        let response = self.http_client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "order book returned status {} for {}",
                response.status(),
                uid
            )));
        }

        let order: OrderReceipt = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(Some(order))
    }
}
