//! Trade orchestrator
//!
//! Sequences one trade from input to confirmation: detects the trade mode,
//! keeps the quote current, submits with slippage bounds and hands the
//! transaction to the tracker.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    ConfirmationListener, Goal, GoalTracker, PoolDataRefresher, QuoteBounds, RefreshTask, SubmittedTx,
    SwapOrder, TracingGoalTracker, TradeDetails, TradeInputs, TradePhase, TradeSubmitter,
    DEFAULT_REFRESH_INTERVAL,
};
use crate::domain::quote::{
    PriceImpact, Quote, QuoteEngine, QuoteOutcome, QuoteRequest, SwapDirection, TradeMode, WrapperPairs,
};
use crate::domain::transactions::{
    NewTransaction, Receipt, TransactionAction, TransactionTracker, TransactionType,
};
use crate::math::{max_in, min_out};
use crate::shared::errors::{OracleError, QuoteError, TradeError};
use crate::shared::types::{Address, TokenInfo};
use crate::shared::utils::format_amount;

#[derive(Debug, Clone)]
pub struct TradeConfig {
    /// Fractional buffer applied to the quoted amounts
    pub slippage_tolerance: Decimal,
    /// Refuse to submit while price impact is above the high threshold
    pub block_on_high_price_impact: bool,
    pub refresh_interval: Duration,
    pub pool_fetch_timeout: Duration,
    /// Re-run the last quote after every pool refresh
    pub requote_on_refresh: bool,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            slippage_tolerance: dec!(0.01),
            block_on_high_price_impact: false,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            pool_fetch_timeout: Duration::from_secs(30),
            requote_on_refresh: true,
        }
    }
}

struct TradeState {
    inputs: TradeInputs,
    mode: TradeMode,
    phase: TradePhase,
    quote: Option<Quote>,
    price_impact: PriceImpact,
    high_price_impact: bool,
    trading: bool,
    confirming: bool,
    slippage_error: bool,
    latest_tx_hash: Option<String>,
}

impl TradeState {
    fn new() -> Self {
        Self {
            inputs: TradeInputs::default(),
            mode: TradeMode::Swap,
            phase: TradePhase::Idle,
            quote: None,
            price_impact: PriceImpact::ZERO,
            high_price_impact: false,
            trading: false,
            confirming: false,
            slippage_error: false,
            latest_tx_hash: None,
        }
    }

    /// Quote updates move the phase only while no trade is in flight
    fn set_quote_phase(&mut self, phase: TradePhase) {
        if !self.trading && !self.confirming {
            self.phase = phase;
        }
    }
}

/// A submitted trade and the task waiting for its confirmation
pub struct SubmittedTrade {
    pub hash: String,
    pub confirmation: JoinHandle<TradePhase>,
}

pub struct TradeOrchestrator {
    engine: Arc<QuoteEngine>,
    wrappers: WrapperPairs,
    tokens: HashMap<Address, TokenInfo>,
    submitter: Arc<dyn TradeSubmitter>,
    listener: Arc<dyn ConfirmationListener>,
    tracker: Arc<TransactionTracker>,
    goals: Arc<dyn GoalTracker>,
    refresher: Arc<PoolDataRefresher>,
    config: TradeConfig,
    state: RwLock<TradeState>,
    quote_seq: AtomicU64,
}

impl TradeOrchestrator {
    pub fn new(
        engine: Arc<QuoteEngine>,
        wrappers: WrapperPairs,
        tokens: Vec<TokenInfo>,
        submitter: Arc<dyn TradeSubmitter>,
        listener: Arc<dyn ConfirmationListener>,
        tracker: Arc<TransactionTracker>,
        config: TradeConfig,
    ) -> Self {
        let refresher = Arc::new(PoolDataRefresher::new(
            Arc::clone(engine.oracle()),
            config.refresh_interval,
            config.pool_fetch_timeout,
        ));
        Self {
            engine,
            wrappers,
            tokens: tokens.into_iter().map(|t| (t.address.clone(), t)).collect(),
            submitter,
            listener,
            tracker,
            goals: Arc::new(TracingGoalTracker),
            refresher,
            config,
            state: RwLock::new(TradeState::new()),
            quote_seq: AtomicU64::new(0),
        }
    }

    pub fn with_goal_tracker(mut self, goals: Arc<dyn GoalTracker>) -> Self {
        self.goals = goals;
        self
    }

    pub fn config(&self) -> &TradeConfig {
        &self.config
    }

    pub fn refresher(&self) -> &Arc<PoolDataRefresher> {
        &self.refresher
    }

    pub fn pools_loading(&self) -> bool {
        self.refresher.pools_loading()
    }

    pub async fn inputs(&self) -> TradeInputs {
        self.state.read().await.inputs.clone()
    }

    pub async fn mode(&self) -> TradeMode {
        self.state.read().await.mode
    }

    pub async fn phase(&self) -> TradePhase {
        self.state.read().await.phase.clone()
    }

    pub async fn current_quote(&self) -> Option<Quote> {
        self.state.read().await.quote.clone()
    }

    pub async fn price_impact(&self) -> PriceImpact {
        self.state.read().await.price_impact
    }

    pub async fn high_price_impact(&self) -> bool {
        self.state.read().await.high_price_impact
    }

    /// A submission is in progress
    pub async fn trading(&self) -> bool {
        self.state.read().await.trading
    }

    pub async fn confirming(&self) -> bool {
        self.state.read().await.confirming
    }

    pub async fn slippage_error(&self) -> bool {
        self.state.read().await.slippage_error
    }

    pub async fn latest_tx_hash(&self) -> Option<String> {
        self.state.read().await.latest_tx_hash.clone()
    }

    /// Load the first pool snapshot and quote the current inputs
    pub async fn init_quote_engine(&self) -> Result<(), OracleError> {
        self.refresher.init().await?;
        info!("✅ Quote engine initialized");
        if let Err(e) = self.handle_amount_change().await {
            debug!("Initial quote failed: {}", e);
        }
        Ok(())
    }

    /// Refresh pools in the background until the task is stopped
    pub fn start_pool_refresh(self: &Arc<Self>) -> RefreshTask {
        let orchestrator: Weak<Self> = Arc::downgrade(self);
        let requote = self.config.requote_on_refresh;
        self.refresher.spawn(move || {
            let orchestrator = orchestrator.clone();
            async move {
                if !requote {
                    return;
                }
                if let Some(orchestrator) = orchestrator.upgrade() {
                    if let Err(e) = orchestrator.handle_amount_change().await {
                        debug!("Re-quote after pool refresh failed: {}", e);
                    }
                }
            }
        })
    }

    /// Replace the inputs and re-quote
    pub async fn update_inputs(&self, inputs: TradeInputs) -> Result<Option<QuoteOutcome>, QuoteError> {
        self.state.write().await.inputs = inputs;
        self.handle_amount_change().await
    }

    /// Re-derive the trade mode and quote the current inputs. Returns `None`
    /// when a newer quote was requested before this one completed.
    pub async fn handle_amount_change(&self) -> Result<Option<QuoteOutcome>, QuoteError> {
        let seq = self.quote_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let request = {
            let mut state = self.state.write().await;
            state.mode = self
                .wrappers
                .detect(state.inputs.token_in.as_ref(), state.inputs.token_out.as_ref());
            state.set_quote_phase(TradePhase::Quoting);
            self.quote_request(&state.inputs, state.mode)
        };

        let snapshot = self.refresher.snapshot().await;
        let result = self.engine.quote(&request, snapshot.as_deref()).await;

        let mut state = self.state.write().await;
        if self.quote_seq.load(Ordering::SeqCst) != seq {
            debug!("Dropping stale quote #{}", seq);
            return Ok(None);
        }

        match result {
            Ok(outcome) => {
                let mode = state.mode;
                state.inputs.set_dependent_amount(outcome.dependent_amount().to_string());
                state.quote = outcome
                    .quote()
                    .filter(|quote| quote.has_route || mode.wrap_direction().is_some())
                    .cloned();
                state.price_impact = outcome.price_impact();
                state.high_price_impact = state
                    .price_impact
                    .is_high(self.engine.config().high_price_impact_threshold);
                let phase = if state.quote.is_some() {
                    TradePhase::Quoted(mode)
                } else {
                    TradePhase::Idle
                };
                state.set_quote_phase(phase);
                Ok(Some(outcome))
            }
            Err(e) => {
                warn!("Quote failed: {}", e);
                state.inputs.set_dependent_amount(String::new());
                state.quote = None;
                state.price_impact = PriceImpact::ZERO;
                state.high_price_impact = false;
                state.set_quote_phase(TradePhase::Idle);
                Err(e)
            }
        }
    }

    fn quote_request(&self, inputs: &TradeInputs, mode: TradeMode) -> QuoteRequest {
        let decimals = |token: &Option<Address>| {
            token
                .as_ref()
                .and_then(|address| self.tokens.get(address))
                .map(|info| info.decimals)
        };
        QuoteRequest {
            token_in: inputs.token_in.clone(),
            token_out: inputs.token_out.clone(),
            token_in_decimals: decimals(&inputs.token_in),
            token_out_decimals: decimals(&inputs.token_out),
            direction: inputs.direction,
            amount: inputs.fixed_amount().to_string(),
            mode,
        }
    }

    /// Slippage bounds of the current quote
    pub async fn get_quote(&self) -> Result<QuoteBounds, TradeError> {
        let state = self.state.read().await;
        let quote = state.quote.as_ref().ok_or(TradeError::NoQuote)?;
        self.bounds_for(quote)
    }

    fn bounds_for(&self, quote: &Quote) -> Result<QuoteBounds, TradeError> {
        let slippage = self.config.slippage_tolerance;
        Ok(QuoteBounds {
            fee_amount_in_token: "0".to_string(),
            fee_amount_out_token: "0".to_string(),
            maximum_in_amount: max_in(quote.amount_in, slippage)?.to_string(),
            minimum_out_amount: min_out(quote.amount_out, slippage)?.to_string(),
        })
    }

    pub async fn reset_state(&self) {
        let mut state = self.state.write().await;
        state.high_price_impact = false;
        if matches!(state.phase, TradePhase::Confirmed { .. } | TradePhase::Failed { .. }) {
            state.phase = TradePhase::Idle;
        }
    }

    pub async fn clear_slippage_error(&self) {
        self.state.write().await.slippage_error = false;
    }

    /// Submit the current quote. On success the transaction is registered
    /// with the tracker and a task waits for its confirmation.
    pub async fn trade(self: &Arc<Self>) -> Result<SubmittedTrade, TradeError> {
        self.goals.track(Goal::ClickSwap);

        let (quote, mode, inputs, price_impact) = {
            let mut state = self.state.write().await;
            if state.trading {
                return Err(TradeError::TradeInProgress);
            }
            let quote = state.quote.clone().ok_or(TradeError::NoQuote)?;
            if state.high_price_impact {
                if self.config.block_on_high_price_impact {
                    return Err(TradeError::HighPriceImpact(state.price_impact.value()));
                }
                warn!("Submitting with high price impact {}", state.price_impact.value());
            }
            state.trading = true;
            state.phase = TradePhase::Submitting;
            (quote, state.mode, state.inputs.clone(), state.price_impact)
        };

        let submitted = match self.submit(&quote, mode).await {
            Ok(submitted) => submitted,
            Err(e) => {
                self.abort_trade(&e).await;
                return Err(e);
            }
        };
        info!("✅ Submitted {} {}", mode.as_str(), submitted.hash);

        let registered = match self.transaction_record(&submitted, &quote, mode, &inputs, price_impact) {
            Ok(record) => self.tracker.add_transaction(record).await.map_err(TradeError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = registered {
            self.abort_trade(&e).await;
            return Err(e);
        }

        {
            let mut state = self.state.write().await;
            state.trading = false;
            state.confirming = true;
            state.phase = TradePhase::Confirming {
                hash: submitted.hash.clone(),
            };
        }

        let orchestrator = Arc::clone(self);
        let tx = submitted.clone();
        let confirmation = tokio::spawn(async move { orchestrator.await_confirmation(tx).await });

        Ok(SubmittedTrade {
            hash: submitted.hash,
            confirmation,
        })
    }

    async fn submit(&self, quote: &Quote, mode: TradeMode) -> Result<SubmittedTx, TradeError> {
        let slippage = self.config.slippage_tolerance;
        let submitted = match mode {
            TradeMode::Wrap => {
                let wrapper = WrapperPairs::wrapper_for(mode, &quote.token_in, &quote.token_out);
                self.submitter.submit_wrap(wrapper, quote.amount_in).await?
            }
            TradeMode::Unwrap => {
                let wrapper = WrapperPairs::wrapper_for(mode, &quote.token_in, &quote.token_out);
                self.submitter.submit_unwrap(wrapper, quote.amount_in).await?
            }
            TradeMode::Swap => {
                let mut order = SwapOrder {
                    token_in: quote.token_in.clone(),
                    token_out: quote.token_out.clone(),
                    amount_in: quote.amount_in,
                    amount_out: quote.amount_out,
                    limit: 0,
                    route_plan: quote.route_plan.clone(),
                };
                match quote.direction {
                    SwapDirection::ExactIn => {
                        order.limit = min_out(quote.amount_out, slippage)?;
                        self.submitter.submit_swap_in(&order).await?
                    }
                    SwapDirection::ExactOut => {
                        order.limit = max_in(quote.amount_in, slippage)?;
                        self.submitter.submit_swap_out(&order).await?
                    }
                }
            }
        };
        Ok(submitted)
    }

    async fn abort_trade(&self, error: &TradeError) {
        let mut state = self.state.write().await;
        if let TradeError::Submission(submission) = error {
            if submission.is_slippage_error() {
                state.slippage_error = true;
            }
        }
        state.trading = false;
        state.confirming = false;
        state.phase = TradePhase::Idle;
        warn!("Trade failed: {}", error);
    }

    fn token(&self, address: &Address) -> Result<&TokenInfo, TradeError> {
        self.tokens
            .get(address)
            .ok_or_else(|| TradeError::UnknownToken(address.clone()))
    }

    fn transaction_record(
        &self,
        submitted: &SubmittedTx,
        quote: &Quote,
        mode: TradeMode,
        inputs: &TradeInputs,
        price_impact: PriceImpact,
    ) -> Result<NewTransaction, TradeError> {
        let token_in = self.token(&quote.token_in)?;
        let token_out = self.token(&quote.token_out)?;
        let amount_in = format_amount(quote.amount_in_decimal()?);
        let amount_out = format_amount(quote.amount_out_decimal()?);

        let (action, summary) = match mode {
            TradeMode::Wrap => (
                TransactionAction::Wrap,
                format!("Wrap {} {} to {}", amount_in, token_in.symbol, token_out.symbol),
            ),
            TradeMode::Unwrap => (
                TransactionAction::Unwrap,
                format!("Unwrap {} {} to {}", amount_in, token_in.symbol, token_out.symbol),
            ),
            TradeMode::Swap => (
                TransactionAction::Trade,
                format!(
                    "{} {} -> {} {}",
                    amount_in, token_in.symbol, amount_out, token_out.symbol
                ),
            ),
        };

        let details = TradeDetails {
            token_in: token_in.clone(),
            token_out: token_out.clone(),
            token_in_amount: inputs.token_in_amount.clone(),
            token_out_amount: inputs.token_out_amount.clone(),
            exact_in: quote.direction.is_exact_in(),
            quote: self.bounds_for(quote)?,
            price_impact,
            slippage_buffer_rate: self.config.slippage_tolerance,
        };

        Ok(NewTransaction {
            id: submitted.hash.clone(),
            kind: TransactionType::Tx,
            action,
            summary,
            details: serde_json::to_value(&details).ok(),
            receipt: None,
        })
    }

    async fn await_confirmation(&self, tx: SubmittedTx) -> TradePhase {
        match self.listener.wait(&tx).await {
            Ok(receipt) => {
                if let Err(e) = self
                    .tracker
                    .finalize_transaction(&tx.hash, TransactionType::Tx, Receipt::Tx(receipt))
                    .await
                {
                    warn!("Failed to finalize {}: {}", tx.hash, e);
                }
                self.tracker.mark_processed(&tx.hash).await;
                self.goals.track(Goal::Swapped);

                let mut state = self.state.write().await;
                state.latest_tx_hash = Some(tx.hash.clone());
                state.confirming = false;
                state.phase = TradePhase::Confirmed { hash: tx.hash };
                info!("✅ Trade confirmed");
                state.phase.clone()
            }
            Err(e) => {
                warn!("Trade {} failed: {}", tx.hash, e);
                let mut state = self.state.write().await;
                state.confirming = false;
                state.phase = TradePhase::Failed { hash: tx.hash };
                state.phase.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::test_support::{addr, snapshot, FeeWrapper, MockOracle};
    use crate::domain::quote::{
        PoolSnapshot, QuoteEngineConfig, RoutingOracle, SwapRequest, SwapRoute, WrapperPair,
    };
    use crate::domain::transactions::tracker_support::{harness, Harness};
    use crate::domain::transactions::{TransactionStatus, TxReceipt};
    use crate::shared::errors::{ListenerError, SubmissionError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const E18: u128 = 1_000_000_000_000_000_000;
    const USDC: u128 = 1_000_000;

    fn eth() -> TokenInfo {
        TokenInfo::new(addr(0xee), "ETH", 18)
    }

    fn weth() -> TokenInfo {
        TokenInfo::new(addr(0x11), "WETH", 18)
    }

    fn usdc() -> TokenInfo {
        TokenInfo::new(addr(0x22), "USDC", 6)
    }

    fn inputs(token_in: TokenInfo, token_out: TokenInfo, direction: SwapDirection, amount: &str) -> TradeInputs {
        let mut inputs = TradeInputs {
            token_in: Some(token_in.address),
            token_out: Some(token_out.address),
            direction,
            ..Default::default()
        };
        match direction {
            SwapDirection::ExactIn => inputs.token_in_amount = amount.to_string(),
            SwapDirection::ExactOut => inputs.token_out_amount = amount.to_string(),
        }
        inputs
    }

    struct MockSubmitter {
        result: Mutex<Result<SubmittedTx, SubmissionError>>,
        calls: Mutex<Vec<(&'static str, Address, u128)>>,
    }

    impl MockSubmitter {
        fn returning(result: Result<SubmittedTx, SubmissionError>) -> Self {
            Self {
                result: Mutex::new(result),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, kind: &'static str, address: &Address, amount: u128) -> Result<SubmittedTx, SubmissionError> {
            self.calls.lock().unwrap().push((kind, address.clone(), amount));
            self.result.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TradeSubmitter for MockSubmitter {
        async fn submit_wrap(&self, wrapper: &Address, amount: u128) -> Result<SubmittedTx, SubmissionError> {
            self.record("wrap", wrapper, amount)
        }

        async fn submit_unwrap(&self, wrapper: &Address, amount: u128) -> Result<SubmittedTx, SubmissionError> {
            self.record("unwrap", wrapper, amount)
        }

        async fn submit_swap_in(&self, order: &SwapOrder) -> Result<SubmittedTx, SubmissionError> {
            self.record("swap_in", &order.token_in, order.limit)
        }

        async fn submit_swap_out(&self, order: &SwapOrder) -> Result<SubmittedTx, SubmissionError> {
            self.record("swap_out", &order.token_in, order.limit)
        }
    }

    struct MockListener {
        result: Result<TxReceipt, ListenerError>,
    }

    #[async_trait]
    impl ConfirmationListener for MockListener {
        async fn wait(&self, _tx: &SubmittedTx) -> Result<TxReceipt, ListenerError> {
            self.result.clone()
        }
    }

    #[derive(Default)]
    struct RecordingGoals {
        goals: Mutex<Vec<Goal>>,
    }

    impl GoalTracker for RecordingGoals {
        fn track(&self, goal: Goal) {
            self.goals.lock().unwrap().push(goal);
        }
    }

    /// Answers amount 1 slowly and any other amount at once
    struct SlowFirstOracle;

    #[async_trait]
    impl RoutingOracle for SlowFirstOracle {
        async fn refresh_pools(&self) -> Result<PoolSnapshot, OracleError> {
            Ok(snapshot())
        }

        fn has_pool_data(&self) -> bool {
            true
        }

        async fn set_cost_output_token(&self, _: &Address, _: u32, _: Option<Decimal>) -> Result<(), OracleError> {
            Ok(())
        }

        async fn best_swap(&self, request: &SwapRequest, _: &PoolSnapshot) -> Result<SwapRoute, OracleError> {
            let return_amount = if request.amount == E18 {
                tokio::time::sleep(Duration::from_millis(50)).await;
                1000 * USDC
            } else {
                4000 * USDC
            };
            Ok(SwapRoute {
                has_route: true,
                return_amount,
                market_spot_price: dec!(0.0005),
                plan: serde_json::json!({}),
            })
        }
    }

    struct Fixture {
        orchestrator: Arc<TradeOrchestrator>,
        submitter: Arc<MockSubmitter>,
        goals: Arc<RecordingGoals>,
        tracker: Harness,
    }

    fn confirmed_receipt() -> TxReceipt {
        crate::domain::transactions::tests::tx_receipt("0xhash", 1)
    }

    fn fixture_with(
        oracle: Arc<dyn RoutingOracle>,
        submitted: Result<SubmittedTx, SubmissionError>,
        listened: Result<TxReceipt, ListenerError>,
        config: TradeConfig,
    ) -> Fixture {
        let engine = Arc::new(QuoteEngine::new(oracle, Arc::new(FeeWrapper), QuoteEngineConfig::default()));
        let wrappers = WrapperPairs::new(vec![WrapperPair {
            base: eth().address,
            wrapper: weth().address,
        }]);
        let submitter = Arc::new(MockSubmitter::returning(submitted));
        let goals = Arc::new(RecordingGoals::default());
        let tracker = harness();
        let orchestrator = TradeOrchestrator::new(
            engine,
            wrappers,
            vec![eth(), weth(), usdc()],
            submitter.clone(),
            Arc::new(MockListener { result: listened }),
            tracker.tracker.clone(),
            config,
        )
        .with_goal_tracker(goals.clone());

        Fixture {
            orchestrator: Arc::new(orchestrator),
            submitter,
            goals,
            tracker,
        }
    }

    fn fixture(spot: Decimal) -> Fixture {
        fixture_with(
            Arc::new(MockOracle::returning(2000 * USDC, spot)),
            Ok(SubmittedTx {
                hash: "0xhash".to_string(),
            }),
            Ok(confirmed_receipt()),
            TradeConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_exact_in_quote_fills_output() {
        let f = fixture(dec!(0.0005));
        f.orchestrator.init_quote_engine().await.unwrap();

        f.orchestrator
            .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "1"))
            .await
            .unwrap()
            .unwrap();

        let state = f.orchestrator.inputs().await;
        assert_eq!(state.token_out_amount, "2000.000000");
        assert_eq!(f.orchestrator.mode().await, TradeMode::Swap);
        assert_eq!(f.orchestrator.phase().await, TradePhase::Quoted(TradeMode::Swap));
        assert_eq!(f.orchestrator.price_impact().await.value(), dec!(0.0001));
        assert!(!f.orchestrator.high_price_impact().await);
        assert!(!f.orchestrator.pools_loading());
    }

    #[tokio::test]
    async fn test_swap_without_pools_leaves_output_blank() {
        let f = fixture(dec!(0.0005));

        f.orchestrator
            .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "1"))
            .await
            .unwrap();

        assert_eq!(f.orchestrator.inputs().await.token_out_amount, "");
        assert!(f.orchestrator.current_quote().await.is_none());
        assert_eq!(f.orchestrator.phase().await, TradePhase::Idle);
    }

    #[tokio::test]
    async fn test_latest_quote_wins() {
        let f = fixture_with(
            Arc::new(SlowFirstOracle),
            Ok(SubmittedTx {
                hash: "0xhash".to_string(),
            }),
            Ok(confirmed_receipt()),
            TradeConfig::default(),
        );
        f.orchestrator.init_quote_engine().await.unwrap();

        let (slow, fast) = tokio::join!(
            f.orchestrator
                .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "1")),
            f.orchestrator
                .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "2")),
        );

        assert_eq!(slow.unwrap(), None);
        assert!(fast.unwrap().is_some());
        let state = f.orchestrator.inputs().await;
        assert_eq!(state.token_in_amount, "2");
        assert_eq!(state.token_out_amount, "4000.000000");
    }

    #[tokio::test]
    async fn test_trade_registers_and_confirms() {
        let f = fixture(dec!(0.0005));
        f.orchestrator.init_quote_engine().await.unwrap();
        f.orchestrator
            .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "1"))
            .await
            .unwrap();

        let submitted = f.orchestrator.trade().await.unwrap();
        assert_eq!(submitted.hash, "0xhash");
        assert!(!f.orchestrator.trading().await);

        let calls = f.submitter.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("swap_in", weth().address, 1_980_198_019)]);

        let phase = submitted.confirmation.await.unwrap();
        assert_eq!(phase, TradePhase::Confirmed { hash: "0xhash".to_string() });
        assert_eq!(f.orchestrator.latest_tx_hash().await.as_deref(), Some("0xhash"));
        assert!(!f.orchestrator.confirming().await);

        let record = f
            .tracker
            .tracker
            .get_transaction("0xhash", TransactionType::Tx)
            .await
            .unwrap();
        assert_eq!(record.action, TransactionAction::Trade);
        assert_eq!(record.summary, "1 WETH -> 2000 USDC");
        assert_eq!(record.status, TransactionStatus::Confirmed);
        let details: TradeDetails = serde_json::from_value(record.details.unwrap()).unwrap();
        assert_eq!(details.quote.minimum_out_amount, "1980198019");
        assert!(details.exact_in);

        assert!(f.tracker.tracker.is_processed("0xhash").await);
        assert_eq!(*f.goals.goals.lock().unwrap(), vec![Goal::ClickSwap, Goal::Swapped]);
    }

    #[tokio::test]
    async fn test_wrap_trade() {
        let f = fixture(dec!(0.0005));
        f.orchestrator.init_quote_engine().await.unwrap();
        f.orchestrator
            .update_inputs(inputs(eth(), weth(), SwapDirection::ExactIn, "1"))
            .await
            .unwrap();

        assert_eq!(f.orchestrator.mode().await, TradeMode::Wrap);
        assert_eq!(f.orchestrator.price_impact().await, PriceImpact::ZERO);
        assert_eq!(f.orchestrator.inputs().await.token_out_amount, "0.999");

        let submitted = f.orchestrator.trade().await.unwrap();
        submitted.confirmation.await.unwrap();

        let calls = f.submitter.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("wrap", weth().address, E18)]);
        let record = f
            .tracker
            .tracker
            .get_transaction("0xhash", TransactionType::Tx)
            .await
            .unwrap();
        assert_eq!(record.action, TransactionAction::Wrap);
        assert_eq!(record.summary, "Wrap 1 ETH to WETH");
    }

    #[tokio::test]
    async fn test_slippage_error_sets_sticky_flag() {
        let f = fixture_with(
            Arc::new(MockOracle::returning(2000 * USDC, dec!(0.0005))),
            Err(SubmissionError::new("execution reverted: BAL#507")),
            Ok(confirmed_receipt()),
            TradeConfig::default(),
        );
        f.orchestrator.init_quote_engine().await.unwrap();
        f.orchestrator
            .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "1"))
            .await
            .unwrap();

        let err = f.orchestrator.trade().await.err().unwrap();
        assert!(matches!(err, TradeError::Submission(_)));
        assert!(f.orchestrator.slippage_error().await);
        assert!(!f.orchestrator.trading().await);
        assert_eq!(f.orchestrator.phase().await, TradePhase::Idle);
        assert!(f.tracker.tracker.transactions().await.is_empty());

        f.orchestrator.clear_slippage_error().await;
        assert!(!f.orchestrator.slippage_error().await);
    }

    #[tokio::test]
    async fn test_other_submission_error_leaves_flag() {
        let f = fixture_with(
            Arc::new(MockOracle::returning(2000 * USDC, dec!(0.0005))),
            Err(SubmissionError::new("user rejected transaction")),
            Ok(confirmed_receipt()),
            TradeConfig::default(),
        );
        f.orchestrator.init_quote_engine().await.unwrap();
        f.orchestrator
            .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "1"))
            .await
            .unwrap();

        assert!(f.orchestrator.trade().await.is_err());
        assert!(!f.orchestrator.slippage_error().await);
    }

    #[tokio::test]
    async fn test_listener_failure_marks_failed() {
        let f = fixture_with(
            Arc::new(MockOracle::returning(2000 * USDC, dec!(0.0005))),
            Ok(SubmittedTx {
                hash: "0xhash".to_string(),
            }),
            Err(ListenerError::Reverted("0xhash".to_string())),
            TradeConfig::default(),
        );
        f.orchestrator.init_quote_engine().await.unwrap();
        f.orchestrator
            .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "1"))
            .await
            .unwrap();

        let submitted = f.orchestrator.trade().await.unwrap();
        let phase = submitted.confirmation.await.unwrap();

        assert_eq!(phase, TradePhase::Failed { hash: "0xhash".to_string() });
        assert!(!f.orchestrator.slippage_error().await);
        let record = f
            .tracker
            .tracker
            .get_transaction("0xhash", TransactionType::Tx)
            .await
            .unwrap();
        assert_eq!(record.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_high_price_impact_is_advisory_by_default() {
        let f = fixture(dec!(0.0004));
        f.orchestrator.init_quote_engine().await.unwrap();
        f.orchestrator
            .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "1"))
            .await
            .unwrap();

        assert!(f.orchestrator.high_price_impact().await);
        assert!(f.orchestrator.trade().await.is_ok());

        f.orchestrator.reset_state().await;
        assert!(!f.orchestrator.high_price_impact().await);
    }

    #[tokio::test]
    async fn test_high_price_impact_blocks_when_configured() {
        let f = fixture_with(
            Arc::new(MockOracle::returning(2000 * USDC, dec!(0.0004))),
            Ok(SubmittedTx {
                hash: "0xhash".to_string(),
            }),
            Ok(confirmed_receipt()),
            TradeConfig {
                block_on_high_price_impact: true,
                ..Default::default()
            },
        );
        f.orchestrator.init_quote_engine().await.unwrap();
        f.orchestrator
            .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "1"))
            .await
            .unwrap();

        let err = f.orchestrator.trade().await.err().unwrap();
        assert_eq!(err, TradeError::HighPriceImpact(dec!(0.25)));
        assert!(f.submitter.calls.lock().unwrap().is_empty());
        assert!(!f.orchestrator.trading().await);
    }

    #[tokio::test]
    async fn test_get_quote_bounds() {
        let f = fixture(dec!(0.0005));
        assert_eq!(f.orchestrator.get_quote().await, Err(TradeError::NoQuote));

        f.orchestrator.init_quote_engine().await.unwrap();
        f.orchestrator
            .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "1"))
            .await
            .unwrap();

        let bounds = f.orchestrator.get_quote().await.unwrap();
        assert_eq!(bounds.fee_amount_in_token, "0");
        assert_eq!(bounds.fee_amount_out_token, "0");
        assert_eq!(bounds.maximum_in_amount, "1010000000000000000");
        assert_eq!(bounds.minimum_out_amount, "1980198019");
    }

    #[tokio::test]
    async fn test_trade_without_quote() {
        let f = fixture(dec!(0.0005));
        let err = f.orchestrator.trade().await.err().unwrap();
        assert_eq!(err, TradeError::NoQuote);
        assert_eq!(*f.goals.goals.lock().unwrap(), vec![Goal::ClickSwap]);
    }

    #[tokio::test]
    async fn test_pool_refresh_requotes() {
        let oracle = Arc::new(MockOracle::returning(2000 * USDC, dec!(0.0005)));
        let f = fixture_with(
            oracle.clone(),
            Ok(SubmittedTx {
                hash: "0xhash".to_string(),
            }),
            Ok(confirmed_receipt()),
            TradeConfig {
                refresh_interval: Duration::from_millis(10),
                ..Default::default()
            },
        );
        f.orchestrator.init_quote_engine().await.unwrap();
        f.orchestrator
            .update_inputs(inputs(weth(), usdc(), SwapDirection::ExactIn, "1"))
            .await
            .unwrap();

        let task = f.orchestrator.start_pool_refresh();
        oracle.set_route(Ok(SwapRoute {
            has_route: true,
            return_amount: 3000 * USDC,
            market_spot_price: dec!(0.0005),
            plan: serde_json::json!({}),
        }));
        tokio::time::sleep(Duration::from_millis(60)).await;
        task.stop().await;

        assert_eq!(f.orchestrator.inputs().await.token_out_amount, "3000.000000");
    }
}
