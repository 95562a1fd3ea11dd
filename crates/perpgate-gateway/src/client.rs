//! Typed USDT-M futures REST client.
//!
//! Every endpoint goes through the shared `RetryingExecutor`, so all calls
//! made through one `FuturesClient` (and its clones) share one rate limiter.

use crate::config::{ClientConfig, Credentials};
use crate::error::{ConfigError, ErrorKind, GatewayError, GatewayResult};
use crate::executor::RetryingExecutor;
use crate::signer::{HttpMethod, SignedRequest};
use crate::transport::{HttpTransport, ReqwestTransport};
use perpgate_core::{
    AccountInfo, BookTicker, ClientOrderId, Depth, DepthLimit, FundingRate, Income, Kline,
    KlineInterval, LongShortRatio, MarginType, MarkPrice, NewOrder, OpenInterest, Order, Position,
    RatioPeriod, RecentTrade, ServerTime, Symbol, SymbolInfo, Ticker24h, UserTrade,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default page size for funding rate history.
pub const DEFAULT_FUNDING_HISTORY_LIMIT: u16 = 100;

/// Identifies an existing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    /// Exchange-assigned id.
    Id(i64),
    /// Client-assigned id (`origClientOrderId`).
    Client(ClientOrderId),
}

impl OrderRef {
    fn apply(&self, request: SignedRequest) -> SignedRequest {
        match self {
            Self::Id(id) => request.param("orderId", id),
            Self::Client(id) => request.param("origClientOrderId", id),
        }
    }
}

/// Leverage change acknowledgement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverageChange {
    pub symbol: String,
    pub leverage: u32,
    #[serde(default)]
    pub max_notional_value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionMode {
    dual_side_position: bool,
}

#[derive(Deserialize)]
struct ExchangeInfo {
    #[serde(default)]
    symbols: Vec<SymbolInfo>,
}

/// Filters for `income_history`. Unset fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct IncomeQuery {
    pub symbol: Option<Symbol>,
    pub income_type: Option<String>,
    pub limit: Option<u16>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

/// Futures REST client.
#[derive(Clone)]
pub struct FuturesClient {
    executor: Arc<RetryingExecutor>,
}

impl FuturesClient {
    /// Validate configuration and build a client over `reqwest`.
    pub fn new(credentials: Credentials, config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate(&credentials)?;
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Self::with_transport(credentials, config, transport)
    }

    /// Validate configuration and build a client over `transport`.
    pub fn with_transport(
        credentials: Credentials,
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ConfigError> {
        config.validate(&credentials)?;
        info!(
            base_url = %config.base_url(),
            api_key = %credentials.masked_api_key(),
            max_retries = config.max_retries,
            rate_limit = config.rate_limit_capacity,
            "Futures client configured"
        );

        let executor = RetryingExecutor::from_config(&config, credentials, transport);
        Ok(Self {
            executor: Arc::new(executor),
        })
    }

    pub fn executor(&self) -> &RetryingExecutor {
        &self.executor
    }

    /// Generic call for endpoints without a typed wrapper.
    pub async fn execute<I, K, V>(
        &self,
        method: HttpMethod,
        path: &str,
        params: I,
        requires_auth: bool,
    ) -> GatewayResult<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.executor
            .execute_raw(method, path, params, requires_auth)
            .await
    }

    async fn fetch<T: DeserializeOwned>(&self, what: &str, request: SignedRequest) -> GatewayResult<T> {
        let body = self.executor.execute(request).await?;
        decode(what, body)
    }

    // ========================================================================
    // Public market data
    // ========================================================================

    /// Connectivity check.
    pub async fn ping(&self) -> GatewayResult<()> {
        self.executor
            .execute(SignedRequest::public("/fapi/v1/ping"))
            .await
            .map(|_| ())
    }

    pub async fn server_time(&self) -> GatewayResult<ServerTime> {
        self.fetch("server time", SignedRequest::public("/fapi/v1/time"))
            .await
    }

    /// Contract metadata for every listed symbol.
    pub async fn exchange_info(&self) -> GatewayResult<Vec<SymbolInfo>> {
        let info: ExchangeInfo = self
            .fetch("exchange info", SignedRequest::public("/fapi/v1/exchangeInfo"))
            .await?;
        Ok(info.symbols)
    }

    pub async fn ticker_24h(&self, symbol: &Symbol) -> GatewayResult<Ticker24h> {
        let request = SignedRequest::public("/fapi/v1/ticker/24hr").param("symbol", symbol);
        self.fetch("24h ticker", request).await
    }

    /// Order book. Malformed levels are skipped.
    pub async fn depth(&self, symbol: &Symbol, limit: DepthLimit) -> GatewayResult<Depth> {
        let request = SignedRequest::public("/fapi/v1/depth")
            .param("symbol", symbol)
            .param("limit", limit.levels());
        self.fetch("depth", request).await
    }

    /// Closed klines, oldest first.
    ///
    /// Rows are decoded positionally; short or malformed rows are skipped.
    /// When more than one row comes back the last one is still forming and
    /// is dropped.
    pub async fn klines(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        limit: u16,
    ) -> GatewayResult<Vec<Kline>> {
        let request = SignedRequest::public("/fapi/v1/klines")
            .param("symbol", symbol)
            .param("interval", interval)
            .param_opt("limit", (limit > 0).then_some(limit));
        let rows: Vec<Vec<Value>> = self.fetch("klines", request).await?;
        Ok(Kline::decode_rows(&rows))
    }

    pub async fn klines_1h(&self, symbol: &Symbol, limit: u16) -> GatewayResult<Vec<Kline>> {
        self.klines(symbol, KlineInterval::OneHour, limit).await
    }

    pub async fn klines_4h(&self, symbol: &Symbol, limit: u16) -> GatewayResult<Vec<Kline>> {
        self.klines(symbol, KlineInterval::FourHours, limit).await
    }

    pub async fn recent_trades(&self, symbol: &Symbol, limit: u16) -> GatewayResult<Vec<RecentTrade>> {
        let request = SignedRequest::public("/fapi/v1/trades")
            .param("symbol", symbol)
            .param_opt("limit", (limit > 0).then_some(limit));
        self.fetch("recent trades", request).await
    }

    pub async fn mark_price(&self, symbol: &Symbol) -> GatewayResult<MarkPrice> {
        let request = SignedRequest::public("/fapi/v1/premiumIndex").param("symbol", symbol);
        self.fetch("mark price", request).await
    }

    /// Most recent funding settlement.
    pub async fn latest_funding_rate(&self, symbol: &Symbol) -> GatewayResult<FundingRate> {
        let request = SignedRequest::public("/fapi/v1/fundingRate")
            .param("symbol", symbol)
            .param("limit", 1);
        let mut rates: Vec<FundingRate> = self.fetch("funding rate", request).await?;
        if rates.is_empty() {
            return Err(GatewayError::new(
                ErrorKind::InvalidSymbol,
                format!("No funding rate for {symbol}"),
            ));
        }
        Ok(rates.swap_remove(0))
    }

    /// Funding settlements, oldest first. `limit` 0 means the default page.
    pub async fn funding_rate_history(
        &self,
        symbol: &Symbol,
        limit: u16,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> GatewayResult<Vec<FundingRate>> {
        let limit = if limit == 0 {
            DEFAULT_FUNDING_HISTORY_LIMIT
        } else {
            limit
        };
        let request = SignedRequest::public("/fapi/v1/fundingRate")
            .param("symbol", symbol)
            .param("limit", limit)
            .param_opt("startTime", start_time)
            .param_opt("endTime", end_time);
        self.fetch("funding rate history", request).await
    }

    pub async fn open_interest(&self, symbol: &Symbol) -> GatewayResult<OpenInterest> {
        let request = SignedRequest::public("/fapi/v1/openInterest").param("symbol", symbol);
        self.fetch("open interest", request).await
    }

    pub async fn book_ticker(&self, symbol: &Symbol) -> GatewayResult<BookTicker> {
        let request = SignedRequest::public("/fapi/v1/ticker/bookTicker").param("symbol", symbol);
        self.fetch("book ticker", request).await
    }

    /// Top-trader long/short ratio by position size.
    pub async fn top_long_short_position_ratio(
        &self,
        symbol: &Symbol,
        period: RatioPeriod,
        limit: u16,
    ) -> GatewayResult<Vec<LongShortRatio>> {
        self.long_short_ratio("/futures/data/topLongShortPositionRatio", symbol, period, limit)
            .await
    }

    /// Top-trader long/short ratio by account count.
    pub async fn top_long_short_account_ratio(
        &self,
        symbol: &Symbol,
        period: RatioPeriod,
        limit: u16,
    ) -> GatewayResult<Vec<LongShortRatio>> {
        self.long_short_ratio("/futures/data/topLongShortAccountRatio", symbol, period, limit)
            .await
    }

    async fn long_short_ratio(
        &self,
        path: &str,
        symbol: &Symbol,
        period: RatioPeriod,
        limit: u16,
    ) -> GatewayResult<Vec<LongShortRatio>> {
        let request = SignedRequest::public(path)
            .param("symbol", symbol)
            .param("period", period)
            .param_opt("limit", (limit > 0).then_some(limit));
        self.fetch("long/short ratio", request).await
    }

    // ========================================================================
    // Account
    // ========================================================================

    /// Income records (realized PnL, funding fees, commission, ...).
    pub async fn income_history(&self, query: &IncomeQuery) -> GatewayResult<Vec<Income>> {
        let request = SignedRequest::signed(HttpMethod::Get, "/fapi/v1/income")
            .param_opt("symbol", query.symbol.as_ref())
            .param_opt("incomeType", query.income_type.as_deref())
            .param_opt("limit", query.limit.filter(|l| *l > 0))
            .param_opt("startTime", query.start_time)
            .param_opt("endTime", query.end_time);
        self.fetch("income history", request).await
    }

    pub async fn account_info(&self) -> GatewayResult<AccountInfo> {
        let request = SignedRequest::signed(HttpMethod::Get, "/fapi/v2/account");
        self.fetch("account", request).await
    }

    /// Position rows for `symbol`, one per position side.
    pub async fn positions(&self, symbol: &Symbol) -> GatewayResult<Vec<Position>> {
        let request =
            SignedRequest::signed(HttpMethod::Get, "/fapi/v2/positionRisk").param("symbol", symbol);
        self.fetch("positions", request).await
    }

    pub async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> GatewayResult<LeverageChange> {
        let request = SignedRequest::signed(HttpMethod::Post, "/fapi/v1/leverage")
            .param("symbol", symbol)
            .param("leverage", leverage);
        self.fetch("leverage", request).await
    }

    pub async fn set_margin_type(&self, symbol: &Symbol, margin_type: MarginType) -> GatewayResult<()> {
        let request = SignedRequest::signed(HttpMethod::Post, "/fapi/v1/marginType")
            .param("symbol", symbol)
            .param("marginType", margin_type.as_str());
        self.executor.execute(request).await.map(|_| ())
    }

    /// Switch between hedge (`true`) and one-way (`false`) position mode.
    pub async fn set_position_mode(&self, dual_side: bool) -> GatewayResult<()> {
        let request = SignedRequest::signed(HttpMethod::Post, "/fapi/v1/positionSide/dual")
            .param("dualSidePosition", dual_side);
        self.executor.execute(request).await.map(|_| ())
    }

    /// Whether hedge mode is enabled.
    pub async fn position_mode(&self) -> GatewayResult<bool> {
        let request = SignedRequest::signed(HttpMethod::Get, "/fapi/v1/positionSide/dual");
        let mode: PositionMode = self.fetch("position mode", request).await?;
        Ok(mode.dual_side_position)
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Submit `order`.
    ///
    /// The request carries `order.client_order_id` and is signed once, so a
    /// retry after a lost response is rejected as a duplicate instead of
    /// opening a second order. In that case the committed order is fetched
    /// and returned.
    pub async fn place_order(&self, order: &NewOrder) -> GatewayResult<Order> {
        let request =
            SignedRequest::signed(HttpMethod::Post, "/fapi/v1/order").params(order.params());
        let outcome = self.executor.execute_tracked(request).await;

        match outcome.result {
            Ok(body) => {
                let placed: Order = decode("order", body)?;
                info!(
                    symbol = %placed.symbol,
                    order_id = placed.order_id,
                    client_order_id = %placed.client_order_id,
                    side = %placed.side,
                    order_type = %placed.order_type,
                    "Order placed"
                );
                Ok(placed)
            }
            Err(err) if err.kind == ErrorKind::DuplicateOrder && outcome.attempts > 1 => {
                warn!(
                    client_order_id = %order.client_order_id,
                    attempts = outcome.attempts,
                    "Order already accepted by an earlier attempt, fetching it"
                );
                self.get_order(&order.symbol, &OrderRef::Client(order.client_order_id.clone()))
                    .await
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get_order(&self, symbol: &Symbol, order: &OrderRef) -> GatewayResult<Order> {
        let request = order.apply(
            SignedRequest::signed(HttpMethod::Get, "/fapi/v1/order").param("symbol", symbol),
        );
        self.fetch("order", request).await
    }

    pub async fn cancel_order(&self, symbol: &Symbol, order: &OrderRef) -> GatewayResult<Order> {
        let request = order.apply(
            SignedRequest::signed(HttpMethod::Delete, "/fapi/v1/order").param("symbol", symbol),
        );
        let canceled: Order = self.fetch("canceled order", request).await?;
        debug!(order_id = canceled.order_id, status = ?canceled.status, "Order canceled");
        Ok(canceled)
    }

    /// Cancel every open order on `symbol`.
    pub async fn cancel_all_open_orders(&self, symbol: &Symbol) -> GatewayResult<()> {
        let request = SignedRequest::signed(HttpMethod::Delete, "/fapi/v1/allOpenOrders")
            .param("symbol", symbol);
        self.executor.execute(request).await.map(|_| ())
    }

    /// Open orders, for one symbol or (with `None`) all of them.
    pub async fn open_orders(&self, symbol: Option<&Symbol>) -> GatewayResult<Vec<Order>> {
        let request = SignedRequest::signed(HttpMethod::Get, "/fapi/v1/openOrders")
            .param_opt("symbol", symbol);
        self.fetch("open orders", request).await
    }

    /// Recent orders in any state.
    pub async fn order_history(&self, symbol: &Symbol, limit: u16) -> GatewayResult<Vec<Order>> {
        let request = SignedRequest::signed(HttpMethod::Get, "/fapi/v1/allOrders")
            .param("symbol", symbol)
            .param_opt("limit", (limit > 0).then_some(limit));
        self.fetch("order history", request).await
    }

    pub async fn user_trades(&self, symbol: &Symbol, limit: u16) -> GatewayResult<Vec<UserTrade>> {
        let request = SignedRequest::signed(HttpMethod::Get, "/fapi/v1/userTrades")
            .param("symbol", symbol)
            .param_opt("limit", (limit > 0).then_some(limit));
        self.fetch("user trades", request).await
    }
}

fn decode<T: DeserializeOwned>(what: &str, body: String) -> GatewayResult<T> {
    match serde_json::from_str(&body) {
        Ok(value) => Ok(value),
        Err(e) => Err(GatewayError::decode(what, &e, body)),
    }
}
