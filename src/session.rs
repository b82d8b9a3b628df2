use async_trait::async_trait;

use crate::errors::CopyError;
use crate::models::FillRecord;

/// Direction of a copy order on the destination account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    /// Numeric side the gateway expects: 0 buy, 1 sell.
    pub fn wire_side(self) -> i32 {
        match self {
            OrderAction::Buy => 0,
            OrderAction::Sell => 1,
        }
    }
}

/// Ephemeral market order derived from a source fill. Built right before
/// submission and dropped afterwards; nothing retains it.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyOrder {
    pub symbol: String,
    pub action: OrderAction,
    pub quantity: f64,
}

impl CopyOrder {
    /// Translate a source fill into the order that mirrors it.
    ///
    /// "BOT" means the source bought, so the copy buys; "SLD" sells. Any
    /// other side value is rejected as `UnknownSide` and never submitted.
    pub fn from_fill(fill: &FillRecord) -> Result<Self, CopyError> {
        let action = match fill.side.as_str() {
            "BOT" => OrderAction::Buy,
            "SLD" => OrderAction::Sell,
            other => return Err(CopyError::UnknownSide(other.to_string())),
        };
        Ok(Self {
            symbol: fill.symbol.clone(),
            action,
            quantity: fill.shares,
        })
    }
}

/// The three capabilities the copier needs from a brokerage session, plus
/// teardown. The loop is written against this trait so tests can drive it
/// with an in-process fake instead of a live gateway.
#[async_trait]
pub trait BrokerSession {
    async fn connect(&self) -> Result<(), CopyError>;

    /// Current cumulative list of today's fills on this session.
    async fn list_fills(&self) -> Result<Vec<FillRecord>, CopyError>;

    /// Submit a market order; returns the gateway-assigned order id.
    async fn place_order(&self, order: &CopyOrder) -> Result<i64, CopyError>;

    /// Idempotent: closing an already-closed session is a no-op.
    async fn disconnect(&self);
}

/// The two long-lived sessions: fills are read from `source`, orders are
/// placed on `dest`.
pub struct SessionPair<S, D> {
    pub source: S,
    pub dest: D,
}

impl<S: BrokerSession, D: BrokerSession> SessionPair<S, D> {
    pub fn new(source: S, dest: D) -> Self {
        Self { source, dest }
    }

    /// Open both sessions sequentially, source first. Fails with the first
    /// connect error; no retry — the caller reports and exits.
    pub async fn connect(&self) -> Result<(), CopyError> {
        self.source.connect().await?;
        self.dest.connect().await
    }

    pub async fn disconnect(&self) {
        self.source.disconnect().await;
        self.dest.disconnect().await;
    }
}
