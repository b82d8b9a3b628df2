use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::CopyError;
use crate::models::{
    ApiEnvelope, ExecutionSearchReq, ExecutionSearchRes, FillRecord, PlaceOrderReq, PlaceOrderRes,
    SessionCloseReq, SessionOpenReq, SessionOpenRes,
};
use crate::session::{BrokerSession, CopyOrder};

// =============== Gateway client =================
/// HTTP session against one brokerage gateway endpoint. The client id must
/// be unique among API clients of that endpoint, or the open is rejected.
pub struct GatewayClient {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    http: Client,
    token: RwLock<Option<String>>,
}

impl GatewayClient {
    pub fn new(host: String, port: u16, client_id: i32) -> Self {
        Self {
            host,
            port,
            client_id,
            http: Client::new(),
            token: RwLock::new(None),
        }
    }

    fn base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    async fn open_session(&self) -> anyhow::Result<String> {
        let url = format!("{}/api/Session/open", self.base());
        let body = SessionOpenReq {
            client_id: self.client_id,
        };
        let resp = self.http.post(url).json(&body).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(anyhow!("session open http status {}", resp.status()));
        }
        let env: ApiEnvelope<SessionOpenRes> = resp.json().await?;
        if !env.success && env.error_code != 0 {
            return Err(anyhow!(
                "gateway error {}: {:?}",
                env.error_code,
                env.error_message
            ));
        }
        let token = env
            .token
            .ok_or_else(|| anyhow!("missing token in session open response"))?;
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn bearer(&self) -> anyhow::Result<String> {
        if let Some(tok) = self.token.read().await.clone() {
            return Ok(tok);
        }
        self.open_session().await
    }

    async fn authed_post<T: for<'de> Deserialize<'de>, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let token = self.bearer().await?;
            let url = format!("{}{}", self.base(), path);
            let resp = self.http.post(url).bearer_auth(&token).json(body).send().await?;

            if resp.status() == StatusCode::UNAUTHORIZED && attempts < 2 {
                // refresh session token once
                self.open_session().await?;
                continue;
            }
            if !resp.status().is_success() {
                let status = resp.status();
                let txt = resp.text().await.unwrap_or_default();
                return Err(anyhow!("POST {} failed: {} — {}", path, status, txt));
            }
            let env: ApiEnvelope<T> = resp.json().await?;
            if !env.success && env.error_code != 0 {
                return Err(anyhow!("gateway error {}: {:?}", env.error_code, env.error_message));
            }
            return Ok(env.data);
        }
    }

    async fn submit_market_order(&self, order: &CopyOrder) -> anyhow::Result<PlaceOrderRes> {
        let path = "/api/Order/place";
        let req = PlaceOrderReq {
            symbol: &order.symbol,
            r#type: 2, // market
            side: order.action.wire_side(),
            quantity: order.quantity,
            limit_price: None,
            stop_price: None,
        };
        let mut attempts = 0;

        loop {
            attempts += 1;
            let token = self.bearer().await?;
            let url = format!("{}{}", self.base(), path);

            let resp = self
                .http
                .post(url)
                .bearer_auth(&token)
                .header(ACCEPT, "application/json")
                .json(&req)
                .send()
                .await?;

            if resp.status() == StatusCode::UNAUTHORIZED && attempts < 2 {
                self.open_session().await?;
                continue;
            }

            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!("HTTP {} — {}", status, body));
            }

            // Envelope: if present and success==false -> hard error
            if let Ok(v) = serde_json::from_str::<Value>(&body) {
                if let Some(s) = v.get("success").and_then(|x| x.as_bool()) {
                    if !s {
                        let code = v.get("errorCode").and_then(|x| x.as_i64()).unwrap_or_default();
                        let msg = v
                            .get("errorMessage")
                            .and_then(|x| x.as_str())
                            .unwrap_or("unknown error");
                        return Err(anyhow!("gateway error (code {}): {}", code, msg));
                    }
                }
                // orderId from either shape
                if let Some(oid) = v
                    .get("orderId")
                    .and_then(|x| x.as_i64())
                    .or_else(|| v.get("data").and_then(|d| d.get("orderId")).and_then(|x| x.as_i64()))
                {
                    return Ok(PlaceOrderRes { order_id: oid });
                }
            }

            // Direct model
            if let Ok(p) = serde_json::from_str::<PlaceOrderRes>(&body) {
                return Ok(p);
            }

            // Accept empty/OK-ish 2xx as success with synthetic id
            let trimmed = body.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("ok") || trimmed == "true" {
                debug!("place order: 2xx with empty/non-JSON body: {:?}", trimmed);
                return Ok(PlaceOrderRes { order_id: 0 });
            }

            tracing::warn!("place order: 2xx but unknown body: {}", body);
            return Ok(PlaceOrderRes { order_id: 0 });
        }
    }
}

#[async_trait]
impl BrokerSession for GatewayClient {
    async fn connect(&self) -> Result<(), CopyError> {
        info!(
            "opening session to {}:{} as client {}...",
            self.host, self.port, self.client_id
        );
        self.open_session()
            .await
            .map_err(|e| CopyError::Connection(format!("{}:{} — {:#}", self.host, self.port, e)))?;
        info!("session to {}:{} established", self.host, self.port);
        Ok(())
    }

    async fn list_fills(&self) -> Result<Vec<FillRecord>, CopyError> {
        let req = ExecutionSearchReq {
            client_id: self.client_id,
        };
        let res: ExecutionSearchRes = self
            .authed_post("/api/Execution/search", &req)
            .await
            .map_err(|e| CopyError::Listing(format!("{e:#}")))?;
        Ok(res.fills)
    }

    async fn place_order(&self, order: &CopyOrder) -> Result<i64, CopyError> {
        let res = self
            .submit_market_order(order)
            .await
            .map_err(|e| CopyError::Submission(format!("{e:#}")))?;
        Ok(res.order_id)
    }

    async fn disconnect(&self) {
        let token = self.token.write().await.take();
        let Some(token) = token else {
            return; // already closed
        };
        let url = format!("{}/api/Session/close", self.base());
        let req = SessionCloseReq {
            client_id: self.client_id,
        };
        match self.http.post(url).bearer_auth(&token).json(&req).send().await {
            Ok(_) => info!("session to {}:{} closed", self.host, self.port),
            Err(e) => debug!("session close to {}:{} ignored: {}", self.host, self.port, e),
        }
    }
}
