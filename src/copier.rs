use std::time::Duration;

use ahash::AHashSet;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::models::FillRecord;
use crate::session::{BrokerSession, CopyOrder, SessionPair};

/// Polling copy loop: reads the source session's cumulative fill list on a
/// fixed interval and replays each newly observed fill as a market order on
/// the destination session.
pub struct Copier<S, D> {
    sessions: SessionPair<S, D>,
    poll_interval: Duration,
    // Exec ids already handled this process lifetime. In-memory only: a
    // restart clears it and today's fills replay once more.
    processed: AHashSet<String>,
}

impl<S: BrokerSession, D: BrokerSession> Copier<S, D> {
    pub fn new(sessions: SessionPair<S, D>, poll_interval: Duration) -> Self {
        Self {
            sessions,
            poll_interval,
            processed: AHashSet::new(),
        }
    }

    /// Split out the fills not seen before, in list order, marking each as
    /// processed. Marking happens here, before any submission attempt, so a
    /// failed or skipped copy is never retried (at-most-once).
    fn take_new(&mut self, fills: Vec<FillRecord>) -> Vec<FillRecord> {
        fills
            .into_iter()
            .filter(|f| self.processed.insert(f.exec_id.clone()))
            .collect()
    }

    async fn copy_fill(&self, fill: &FillRecord) {
        let order = match CopyOrder::from_fill(fill) {
            Ok(order) => order,
            Err(e) => {
                warn!("skipping fill {}: {}", fill.exec_id, e);
                return;
            }
        };
        match self.sessions.dest.place_order(&order).await {
            Ok(order_id) => {
                info!(
                    "copied fill {} => destination order {} ({:?} {} {})",
                    fill.exec_id, order_id, order.action, order.quantity, order.symbol
                );
            }
            Err(e) => {
                error!("copy of fill {} failed, not retrying: {}", fill.exec_id, e);
            }
        }
    }

    /// One poll cycle: list source fills, dedup, submit copies. A listing
    /// failure skips the cycle; a submission failure only loses that copy.
    pub async fn run_cycle(&mut self) {
        let fills = match self.sessions.source.list_fills().await {
            Ok(fills) => fills,
            Err(e) => {
                warn!("source fill poll failed: {}", e);
                return;
            }
        };
        for fill in self.take_new(fills) {
            info!(
                "new fill on source: {} {} {} @ {} at {} (exec id {})",
                fill.side, fill.shares, fill.symbol, fill.price, fill.time, fill.exec_id
            );
            self.copy_fill(&fill).await;
        }
    }

    /// Poll until the shutdown flag flips, then close both sessions. The
    /// flag is checked at the top of each cycle and during the sleep.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "trade copier started; polling source fills every {:?}",
            self.poll_interval
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.run_cycle().await;
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("trade copier stopping; closing sessions");
        self.sessions.disconnect().await;
    }
}

#[cfg(test)]
pub mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::errors::CopyError;
    use crate::session::OrderAction;

    #[derive(Default)]
    struct FakeInner {
        fills: Vec<FillRecord>,
        placed: Vec<CopyOrder>,
        connected: bool,
        connect_calls: u32,
        fail_connect: bool,
        fail_listing: bool,
        fail_submission: bool,
        next_order_id: i64,
    }

    /// In-process stand-in for a gateway session: scripted fill list,
    /// recorded orders, failure toggles. Clones share state so tests can
    /// inspect it after the copier consumes the pair.
    #[derive(Clone, Default)]
    pub struct FakeSession(Arc<Mutex<FakeInner>>);

    impl FakeSession {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fills(&self, fills: Vec<FillRecord>) {
            self.0.lock().unwrap().fills = fills;
        }

        pub fn push_fill(&self, fill: FillRecord) {
            self.0.lock().unwrap().fills.push(fill);
        }

        pub fn placed(&self) -> Vec<CopyOrder> {
            self.0.lock().unwrap().placed.clone()
        }

        pub fn connected(&self) -> bool {
            self.0.lock().unwrap().connected
        }

        pub fn connect_calls(&self) -> u32 {
            self.0.lock().unwrap().connect_calls
        }

        pub fn fail_connect(&self) {
            self.0.lock().unwrap().fail_connect = true;
        }

        pub fn fail_submission(&self, fail: bool) {
            self.0.lock().unwrap().fail_submission = fail;
        }

        pub fn fail_listing(&self, fail: bool) {
            self.0.lock().unwrap().fail_listing = fail;
        }
    }

    #[async_trait]
    impl BrokerSession for FakeSession {
        async fn connect(&self) -> Result<(), CopyError> {
            let mut inner = self.0.lock().unwrap();
            if inner.fail_connect {
                return Err(CopyError::Connection("connection refused".into()));
            }
            inner.connect_calls += 1;
            inner.connected = true;
            Ok(())
        }

        async fn list_fills(&self) -> Result<Vec<FillRecord>, CopyError> {
            let inner = self.0.lock().unwrap();
            if inner.fail_listing {
                return Err(CopyError::Listing("gateway timeout".into()));
            }
            Ok(inner.fills.clone())
        }

        async fn place_order(&self, order: &CopyOrder) -> Result<i64, CopyError> {
            let mut inner = self.0.lock().unwrap();
            if inner.fail_submission {
                return Err(CopyError::Submission("order rejected".into()));
            }
            inner.placed.push(order.clone());
            inner.next_order_id += 1;
            Ok(inner.next_order_id)
        }

        async fn disconnect(&self) {
            self.0.lock().unwrap().connected = false;
        }
    }

    fn fill(exec_id: &str, symbol: &str, side: &str, shares: f64, price: f64) -> FillRecord {
        FillRecord {
            exec_id: exec_id.into(),
            symbol: symbol.into(),
            side: side.into(),
            shares,
            price,
            time: "2025-03-14T10:30:00Z".into(),
        }
    }

    fn copier_over(source: &FakeSession, dest: &FakeSession) -> Copier<FakeSession, FakeSession> {
        let pair = SessionPair::new(source.clone(), dest.clone());
        Copier::new(pair, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn same_fill_listed_twice_is_copied_once() {
        let source = FakeSession::new();
        let dest = FakeSession::new();
        source.set_fills(vec![fill("E1", "ABC", "BOT", 100.0, 10.0)]);

        let mut copier = copier_over(&source, &dest);
        copier.run_cycle().await;
        copier.run_cycle().await;
        copier.run_cycle().await;

        assert_eq!(dest.placed().len(), 1);
    }

    #[tokio::test]
    async fn bought_fill_becomes_buy_order() {
        let source = FakeSession::new();
        let dest = FakeSession::new();
        source.set_fills(vec![fill("E1", "ABC", "BOT", 100.0, 10.0)]);

        let mut copier = copier_over(&source, &dest);
        copier.run_cycle().await;

        let placed = dest.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].action, OrderAction::Buy);
        assert_eq!(placed[0].symbol, "ABC");
        assert_eq!(placed[0].quantity, 100.0);
    }

    #[tokio::test]
    async fn sold_fill_becomes_sell_order() {
        let source = FakeSession::new();
        let dest = FakeSession::new();
        source.set_fills(vec![fill("E2", "XYZ", "SLD", 50.0, 25.5)]);

        let mut copier = copier_over(&source, &dest);
        copier.run_cycle().await;
        copier.run_cycle().await;

        let placed = dest.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].action, OrderAction::Sell);
        assert_eq!(placed[0].quantity, 50.0);
    }

    #[tokio::test]
    async fn unknown_side_is_skipped_but_marked_processed() {
        let source = FakeSession::new();
        let dest = FakeSession::new();
        source.set_fills(vec![fill("E3", "ABC", "XYZ", 10.0, 1.0)]);

        let mut copier = copier_over(&source, &dest);
        copier.run_cycle().await;
        copier.run_cycle().await;

        // Never submitted, and never reconsidered on later cycles.
        assert!(dest.placed().is_empty());
        assert!(copier.processed.contains("E3"));
    }

    #[tokio::test]
    async fn one_additional_fill_yields_exactly_one_copy() {
        let source = FakeSession::new();
        let dest = FakeSession::new();
        source.set_fills(vec![
            fill("E1", "ABC", "BOT", 100.0, 10.0),
            fill("E2", "ABC", "SLD", 40.0, 10.2),
            fill("E3", "DEF", "BOT", 5.0, 99.0),
        ]);

        let mut copier = copier_over(&source, &dest);
        copier.run_cycle().await;
        assert_eq!(dest.placed().len(), 3);

        source.push_fill(fill("E4", "ABC", "BOT", 10.0, 10.4));
        copier.run_cycle().await;

        let placed = dest.placed();
        assert_eq!(placed.len(), 4);
        assert_eq!(placed[3].quantity, 10.0);
    }

    #[tokio::test]
    async fn submission_failure_is_not_retried() {
        let source = FakeSession::new();
        let dest = FakeSession::new();
        source.set_fills(vec![fill("E1", "ABC", "BOT", 100.0, 10.0)]);
        dest.fail_submission(true);

        let mut copier = copier_over(&source, &dest);
        copier.run_cycle().await;
        assert!(dest.placed().is_empty());

        // Destination recovers, but the fill stays marked processed.
        dest.fail_submission(false);
        copier.run_cycle().await;
        assert!(dest.placed().is_empty());
    }

    #[tokio::test]
    async fn listing_failure_skips_cycle_and_loop_recovers() {
        let source = FakeSession::new();
        let dest = FakeSession::new();
        source.set_fills(vec![fill("E1", "ABC", "BOT", 100.0, 10.0)]);
        source.fail_listing(true);

        let mut copier = copier_over(&source, &dest);
        copier.run_cycle().await;
        assert!(dest.placed().is_empty());

        source.fail_listing(false);
        copier.run_cycle().await;
        assert_eq!(dest.placed().len(), 1);
    }

    #[tokio::test]
    async fn restart_replays_todays_fills_once_more() {
        let source = FakeSession::new();
        let dest = FakeSession::new();
        source.set_fills(vec![fill("E1", "ABC", "BOT", 100.0, 10.0)]);

        let mut copier = copier_over(&source, &dest);
        copier.run_cycle().await;
        assert_eq!(dest.placed().len(), 1);

        // Fresh process: dedup state is gone, the day's fills copy again.
        let mut restarted = copier_over(&source, &dest);
        restarted.run_cycle().await;
        assert_eq!(dest.placed().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_flag_stops_loop_and_closes_sessions() {
        let source = FakeSession::new();
        let dest = FakeSession::new();
        source.set_fills(vec![fill("E1", "ABC", "BOT", 100.0, 10.0)]);

        let pair = SessionPair::new(source.clone(), dest.clone());
        pair.connect().await.unwrap();
        let copier = Copier::new(pair, Duration::from_millis(5));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(copier.run(rx));
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(!source.connected());
        assert!(!dest.connected());
        // At most the cycle already in flight ran before the flag was seen.
        assert!(dest.placed().len() <= 1);
    }
}
