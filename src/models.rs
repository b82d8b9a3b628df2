use serde::{Deserialize, Serialize};

// ===== Common API envelope =====
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_code: i32,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

// ===== Session open/close =====
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOpenReq {
    pub client_id: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionOpenRes {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCloseReq {
    pub client_id: i32,
}

// ===== Execution search =====
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSearchReq {
    pub client_id: i32,
}

/// One execution record from the gateway. The listing endpoint returns the
/// cumulative set for the trading day, not an increment since last call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillRecord {
    pub exec_id: String,
    pub symbol: String,
    /// "BOT" (bought) or "SLD" (sold) on the wire.
    pub side: String,
    pub shares: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub time: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSearchRes {
    #[serde(default)]
    pub fills: Vec<FillRecord>,
}

// ===== Orders =====
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderReq<'a> {
    pub symbol: &'a str,
    pub r#type: i32, // 2 = Market
    pub side: i32,   // 0 buy, 1 sell
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRes {
    pub order_id: i64,
}
