//! An HTTP client for the order relayer

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use swap_executor_api::orders::{CancelOrderRequest, PlacedOrder, SignedOrder};
use tracing::{info, instrument};

use crate::{
    cli::ExecutorConfig,
    collaborators::OrderRelayer,
    error::{ExecutorError, ExecutorResult},
};

// -------------
// | Constants |
// -------------

/// The header carrying the relayer API key
pub const RELAYER_API_KEY_HEADER: &str = "x-api-key";
/// The route orders are submitted to
const ORDERS_ROUTE: &str = "/orders";
/// The route cancellations are submitted to
const CANCEL_ROUTE: &str = "/orders/cancel";
/// The user agent sent to the relayer
const USER_AGENT: &str = "swap-executor";

/// A client for a configured order relayer
#[derive(Clone)]
pub struct HttpOrderRelayer {
    /// The base URL of the relayer
    base_url: String,
    /// The API key sent with every request
    api_key: Option<String>,
    /// The underlying HTTP client
    http_client: Client,
}

impl HttpOrderRelayer {
    /// Create a new relayer client
    pub fn new(base_url: &str, api_key: Option<String>) -> ExecutorResult<Self> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|_| ExecutorError::custom("failed to create reqwest client"))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self { base_url, api_key, http_client })
    }

    /// Create the relayer client configured for the executor, if any
    pub fn from_config(config: &ExecutorConfig) -> ExecutorResult<Option<Self>> {
        config
            .relayer_url
            .as_deref()
            .map(|url| Self::new(url, config.relayer_api_key.clone()))
            .transpose()
    }

    /// The base URL of the relayer
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Post to the relayer
    async fn post_relayer<Req: Serialize>(
        &self,
        path: &str,
        body: &Req,
    ) -> ExecutorResult<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http_client.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(RELAYER_API_KEY_HEADER, key);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ExecutorError::relayer(format!("{path} failed: {status}, {body}")));
        }

        Ok(resp)
    }

    /// Post to the relayer and parse the response
    async fn post_relayer_json<Req, Resp>(&self, path: &str, body: &Req) -> ExecutorResult<Resp>
    where
        Req: Serialize,
        Resp: for<'de> Deserialize<'de>,
    {
        let resp = self.post_relayer(path, body).await?;
        resp.json::<Resp>().await.map_err(ExecutorError::parse)
    }
}

#[async_trait]
impl OrderRelayer for HttpOrderRelayer {
    #[instrument(skip_all, fields(provider = %order.provider, quote_id = %order.quote_id))]
    async fn submit_order(&self, order: &SignedOrder) -> ExecutorResult<PlacedOrder> {
        let placed: PlacedOrder = self.post_relayer_json(ORDERS_ROUTE, order).await?;
        info!(order_id = %placed.order_id, "relayer accepted order");
        Ok(placed)
    }

    #[instrument(skip_all, fields(provider = %request.provider))]
    async fn cancel_orders(&self, request: &CancelOrderRequest) -> ExecutorResult<()> {
        self.post_relayer(CANCEL_ROUTE, request).await?;
        info!(count = request.order_ids.len(), "relayer accepted cancellation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;
    use swap_executor_api::orders::SigningScheme;

    use super::*;
    use crate::test_helpers::signable_order;

    /// A cancellation of a single order
    fn cancel_request() -> CancelOrderRequest {
        CancelOrderRequest {
            order_ids: vec!["0xdeadbeef".to_string()],
            signature: "0xsig".to_string(),
            signing_scheme: SigningScheme::Eip712,
            network_id: "evm--1".to_string(),
            provider: "swap_cow".to_string(),
            user_address: "0xowner".to_string(),
        }
    }

    /// Test that a signed order is posted and its id parsed
    #[tokio::test]
    async fn test_submit_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", ORDERS_ROUTE)
            .match_body(Matcher::PartialJson(json!({ "signingScheme": "eip712" })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"orderId":"0xabc"}"#)
            .create_async()
            .await;

        let order = SignedOrder {
            order: signable_order().order,
            signature: "0xsig".to_string(),
            signing_scheme: SigningScheme::Eip712,
            network_id: "evm--1".to_string(),
            provider: "swap_cow".to_string(),
            quote_id: "quote-1".to_string(),
            owner: "0xowner".to_string(),
        };
        let relayer = HttpOrderRelayer::new(&server.url(), None).unwrap();
        let placed = relayer.submit_order(&order).await.unwrap();

        assert_eq!(placed, PlacedOrder { order_id: "0xabc".to_string() });
        mock.assert_async().await;
    }

    /// Test that a cancellation is posted once with the API key
    #[tokio::test]
    async fn test_cancel_orders() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", CANCEL_ROUTE)
            .match_header(RELAYER_API_KEY_HEADER, "secret")
            .match_body(Matcher::PartialJson(json!({
                "orderIds": ["0xdeadbeef"],
                "signature": "0xsig",
            })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let relayer = HttpOrderRelayer::new(&server.url(), Some("secret".to_string())).unwrap();
        relayer.cancel_orders(&cancel_request()).await.unwrap();
        mock.assert_async().await;
    }

    /// Test that the configured relayer sends the configured API key
    #[tokio::test]
    async fn test_from_config() {
        assert!(HttpOrderRelayer::from_config(&ExecutorConfig::default()).unwrap().is_none());

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", CANCEL_ROUTE)
            .match_header(RELAYER_API_KEY_HEADER, "secret")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let config = ExecutorConfig {
            relayer_url: Some(format!("{}/", server.url())),
            relayer_api_key: Some("secret".to_string()),
            ..Default::default()
        };
        let relayer = HttpOrderRelayer::from_config(&config).unwrap().unwrap();
        assert_eq!(relayer.base_url(), server.url());

        relayer.cancel_orders(&cancel_request()).await.unwrap();
        mock.assert_async().await;
    }

    /// Test that relayer rejections surface as relayer errors
    #[tokio::test]
    async fn test_rejection_is_relayer_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", CANCEL_ROUTE)
            .with_status(400)
            .with_body("order already filled")
            .create_async()
            .await;

        let base_url = format!("{}/", server.url());
        let relayer = HttpOrderRelayer::new(&base_url, None).unwrap();
        let err = relayer.cancel_orders(&cancel_request()).await.unwrap_err();
        assert!(matches!(&err, ExecutorError::Relayer(msg) if msg.contains("already filled")));
    }
}
