//! REST API client for Binance account endpoints

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

use super::auth::{signed_query, API_KEY_HEADER};
use super::messages::*;
use crate::common::decimal::parse_decimal;
use crate::common::errors::{OpsError, Result};
use crate::common::traits::AccountGateway;
use crate::common::types::{
    AccountType, BalanceEntry, BorrowReceipt, BorrowRequest, LoanPosition, MarginBorrowReceipt,
    OrderAck, OrderRequest, OrderType, TradingRule, TransferReceipt, WithdrawReceipt,
    WithdrawRequest,
};
use crate::config::types::{ApiCredentials, BinanceConfig};

/// Signed REST client bound to one account's credentials
#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    /// HTTP client
    client: Client,
    /// Base URL for the REST API
    base_url: String,
    /// Credentials used to sign every account request
    credentials: ApiCredentials,
    /// Signed request validity window
    recv_window_ms: u64,
}

impl BinanceRestClient {
    /// Create a new REST client with the default timeout
    pub fn new(base_url: &str, credentials: ApiCredentials) -> Result<Self> {
        Self::with_timeout(base_url, credentials, Duration::from_secs(30))
    }

    /// Create a new REST client with custom timeout
    pub fn with_timeout(base_url: &str, credentials: ApiCredentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OpsError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms: 5000,
        })
    }

    /// Create a client from application configuration
    pub fn from_config(config: &BinanceConfig, credentials: ApiCredentials) -> Result<Self> {
        let mut client = Self::with_timeout(
            &config.rest_url,
            credentials,
            Duration::from_secs(config.request_timeout_seconds),
        )?;
        client.recv_window_ms = config.recv_window_ms;
        Ok(client)
    }

    /// Send a signed request and decode the JSON body
    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let query = signed_query(
            params,
            &self.credentials.api_secret,
            chrono::Utc::now().timestamp_millis(),
            self.recv_window_ms,
        )?;
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!("{} {}", method, path);

        let response = self
            .client
            .request(method, &url)
            .header(API_KEY_HEADER, &self.credentials.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        decode(response).await
    }

    /// Send an unsigned GET
    async fn public_get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", path);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(map_transport_error)?;

        decode(response).await
    }
}

fn map_transport_error(err: reqwest::Error) -> OpsError {
    if err.is_timeout() {
        OpsError::Timeout(err.to_string())
    } else {
        OpsError::HttpRequest(err)
    }
}

/// Map a response to its body or to the exchange error it carries
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        let body = response.text().await?;
        return Ok(serde_json::from_str(&body)?);
    }

    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        let retry_after_seconds = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let message = response.text().await.unwrap_or_default();
        return Err(OpsError::RateLimit {
            message,
            retry_after_seconds,
        });
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => Err(OpsError::Exchange {
            code: err.code,
            message: err.msg,
        }),
        Err(_) => Err(OpsError::InvalidResponse(format!(
            "Server returned status {}: {}",
            status, body
        ))),
    }
}

#[async_trait]
impl AccountGateway for BinanceRestClient {
    #[instrument(skip(self))]
    async fn query_balance(
        &self,
        account: AccountType,
        asset: Option<String>,
    ) -> Result<Vec<BalanceEntry>> {
        let mut params = Vec::new();
        if let Some(asset) = asset.clone() {
            params.push(("asset", asset));
        }

        match account {
            AccountType::Spot => {
                let rows: Vec<AssetBalance> = self
                    .signed(Method::POST, "/sapi/v3/asset/getUserAsset", &params)
                    .await?;
                rows.into_iter().map(AssetBalance::into_entry).collect()
            }
            AccountType::Funding => {
                let rows: Vec<AssetBalance> = self
                    .signed(Method::POST, "/sapi/v1/asset/get-funding-asset", &params)
                    .await?;
                rows.into_iter().map(AssetBalance::into_entry).collect()
            }
            AccountType::Margin => {
                let margin: MarginAccountResponse =
                    self.signed(Method::GET, "/sapi/v1/margin/account", &[]).await?;
                margin
                    .user_assets
                    .into_iter()
                    .filter(|a| asset.as_deref().map_or(true, |wanted| a.asset == wanted))
                    .map(MarginAsset::into_entry)
                    .collect()
            }
        }
    }

    #[instrument(skip(self))]
    async fn query_trading_rule(&self, symbol: &str) -> Result<TradingRule> {
        let info: ExchangeInfoResponse = self
            .public_get("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())])
            .await?;
        info.lot_size(symbol)
    }

    #[instrument(skip(self))]
    async fn query_loan_status(&self) -> Result<Vec<LoanPosition>> {
        let orders: LoanOrdersResponse = self
            .signed(Method::GET, "/sapi/v2/loan/flexible/ongoing/orders", &[])
            .await?;
        orders.rows.into_iter().map(LoanOrderRow::into_position).collect()
    }

    #[instrument(skip(self))]
    async fn borrow(&self, request: &BorrowRequest) -> Result<BorrowReceipt> {
        let mut params = vec![
            ("loanCoin", request.loan_coin.clone()),
            ("collateralCoin", request.collateral_coin.clone()),
        ];
        if let Some(amount) = request.loan_amount {
            params.push(("loanAmount", amount.normalize().to_string()));
        }
        if let Some(amount) = request.collateral_amount {
            params.push(("collateralAmount", amount.normalize().to_string()));
        }

        let response: BorrowResponse = self
            .signed(Method::POST, "/sapi/v2/loan/flexible/borrow", &params)
            .await?;

        let loan_amount = match response.loan_amount.as_deref() {
            Some(raw) => parse_decimal(raw)?,
            None => request.loan_amount.unwrap_or(Decimal::ZERO),
        };
        Ok(BorrowReceipt {
            loan_coin: response.loan_coin,
            loan_amount,
            status: response.status,
        })
    }

    #[instrument(skip(self))]
    async fn margin_borrow(&self, asset: &str, amount: Decimal) -> Result<MarginBorrowReceipt> {
        let params = vec![
            ("asset", asset.to_string()),
            ("isIsolated", "FALSE".to_string()),
            ("amount", amount.normalize().to_string()),
            ("type", "BORROW".to_string()),
        ];
        let response: TranIdResponse = self
            .signed(Method::POST, "/sapi/v1/margin/borrow-repay", &params)
            .await?;
        Ok(MarginBorrowReceipt {
            asset: asset.to_string(),
            amount,
            tran_id: response.tran_id,
        })
    }

    #[instrument(skip(self))]
    async fn transfer(
        &self,
        asset: &str,
        amount: Decimal,
        from: AccountType,
        to: AccountType,
    ) -> Result<TransferReceipt> {
        let transfer_type = transfer_type(from, to).ok_or_else(|| {
            OpsError::Validation(format!("unsupported transfer from {} to {}", from, to))
        })?;
        let params = vec![
            ("type", transfer_type.to_string()),
            ("asset", asset.to_string()),
            ("amount", amount.normalize().to_string()),
        ];
        let response: TranIdResponse = self
            .signed(Method::POST, "/sapi/v1/asset/transfer", &params)
            .await?;
        Ok(TransferReceipt {
            tran_id: response.tran_id,
        })
    }

    #[instrument(skip(self, request), fields(coin = %request.coin, amount = %request.amount))]
    async fn withdraw(&self, request: &WithdrawRequest) -> Result<WithdrawReceipt> {
        let mut params = vec![
            ("coin", request.coin.clone()),
            ("address", request.address.clone()),
            ("amount", request.amount.normalize().to_string()),
            ("walletType", request.wallet.code().to_string()),
        ];
        if let Some(network) = &request.network {
            params.push(("network", network.clone()));
        }
        let response: WithdrawResponse = self
            .signed(Method::POST, "/sapi/v1/capital/withdraw/apply", &params)
            .await?;
        Ok(WithdrawReceipt {
            id: response.id,
            coin: request.coin.clone(),
            amount: request.amount,
        })
    }

    #[instrument(skip(self))]
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck> {
        let mut params = vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.to_string()),
            ("type", request.order_type.to_string()),
            ("quantity", request.quantity.normalize().to_string()),
        ];
        if request.order_type == OrderType::Limit {
            let price = request
                .price
                .ok_or_else(|| OpsError::Validation("limit order requires a price".into()))?;
            params.push(("timeInForce", "GTC".to_string()));
            params.push(("price", price.normalize().to_string()));
        }

        let response: NewOrderResponse = self.signed(Method::POST, "/api/v3/order", &params).await?;
        let executed_quantity = match response.executed_qty.as_deref() {
            Some(raw) => parse_decimal(raw)?,
            None => Decimal::ZERO,
        };
        Ok(OrderAck {
            order_id: response.order_id,
            status: response.status.unwrap_or_else(|| "NEW".to_string()),
            executed_quantity,
        })
    }

    #[instrument(skip(self))]
    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let _: serde_json::Value = self
            .signed(Method::DELETE, "/api/v3/openOrders", &[("symbol", symbol.to_string())])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> ApiCredentials {
        ApiCredentials::new("key".into(), "secret".into())
    }

    #[test]
    fn test_client_creation() {
        let client = BinanceRestClient::new("https://api.binance.com", credentials());
        assert!(client.is_ok());
    }

    #[test]
    fn test_url_normalization() {
        let client = BinanceRestClient::new("https://api.binance.com/", credentials()).unwrap();
        assert!(!client.base_url.ends_with('/'));
    }

    #[test]
    fn test_from_config_applies_recv_window() {
        let config = BinanceConfig {
            recv_window_ms: 10_000,
            ..BinanceConfig::default()
        };
        let client = BinanceRestClient::from_config(&config, credentials()).unwrap();
        assert_eq!(client.recv_window_ms, 10_000);
    }
}
