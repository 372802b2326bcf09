//! FastConnect API paths and token exchange types.

use serde::{Deserialize, Serialize};

/// Market-data REST paths.
pub mod data_paths {
    /// Token exchange.
    pub const ACCESS_TOKEN: &str = "api/v2/Market/AccessToken";
    /// Securities list.
    pub const SECURITIES: &str = "api/v2/Market/Securities";
    /// Security details.
    pub const SECURITIES_DETAILS: &str = "api/v2/Market/SecuritiesDetails";
    /// Index constituents.
    pub const INDEX_COMPONENTS: &str = "api/v2/Market/IndexComponents";
    /// Index list.
    pub const INDEX_LIST: &str = "api/v2/Market/IndexList";
    /// Daily OHLC bars.
    pub const DAILY_OHLC: &str = "api/v2/Market/DailyOhlc";
    /// Intraday OHLC bars.
    pub const INTRADAY_OHLC: &str = "api/v2/Market/IntradayOhlc";
    /// Daily index values.
    pub const DAILY_INDEX: &str = "api/v2/Market/DailyIndex";
    /// Daily stock prices.
    pub const DAILY_STOCK_PRICE: &str = "api/v2/Market/DailyStockPrice";
}

/// Trading REST paths.
pub mod trading_paths {
    /// Token exchange.
    pub const ACCESS_TOKEN: &str = "api/v2/Trading/AccessToken";
    /// New stock order.
    pub const NEW_ORDER: &str = "api/v2/Trading/NewOrder";
    /// Modify stock order.
    pub const MODIFY_ORDER: &str = "api/v2/Trading/ModifyOrder";
    /// Cancel stock order.
    pub const CANCEL_ORDER: &str = "api/v2/Trading/CancelOrder";
    /// New derivative order.
    pub const DER_NEW_ORDER: &str = "api/v2/Trading/derNewOrder";
    /// Modify derivative order.
    pub const DER_MODIFY_ORDER: &str = "api/v2/Trading/derModifyOrder";
    /// Cancel derivative order.
    pub const DER_CANCEL_ORDER: &str = "api/v2/Trading/derCancelOrder";
    /// Request a one-time password.
    pub const GET_OTP: &str = "api/v2/Trading/GetOTP";
    /// Order history.
    pub const ORDER_HISTORY: &str = "api/v2/Trading/orderHistory";
    /// Order book.
    pub const ORDER_BOOK: &str = "api/v2/Trading/orderBook";
    /// Audit order book.
    pub const AUDIT_ORDER_BOOK: &str = "api/v2/Trading/auditOrderBook";
    /// Derivative positions.
    pub const DER_POSITION: &str = "api/v2/Trading/derivPosition";
    /// Stock positions.
    pub const STOCK_POSITION: &str = "api/v2/Trading/stockPosition";
    /// Maximum buy quantity.
    pub const MAX_BUY_QTY: &str = "api/v2/Trading/maxBuyQty";
    /// Maximum sell quantity.
    pub const MAX_SELL_QTY: &str = "api/v2/Trading/maxSellQty";
    /// Cash account balance.
    pub const ACCOUNT_BALANCE: &str = "api/v2/Trading/cashAcctBal";
    /// Derivative account balance.
    pub const DER_ACCOUNT_BALANCE: &str = "api/v2/Trading/derivAcctBal";
    /// PP/MMR account.
    pub const PPMMR_ACCOUNT: &str = "api/v2/Trading/ppmmraccount";
}

/// Join a base URL and a path with exactly one slash between them.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Token exchange request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenRequest<'a> {
    /// Consumer id.
    #[serde(rename = "consumerID")]
    pub consumer_id: &'a str,
    /// Consumer secret.
    pub consumer_secret: &'a str,
    /// Two-factor type (0 = PIN, 1 = OTP); trading only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub two_factor_type: Option<u8>,
    /// PIN or OTP; trading only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'a str>,
    /// Whether the venue should remember the device; trading only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_save: Option<bool>,
}

impl<'a> AccessTokenRequest<'a> {
    /// Build a market-data token request.
    #[must_use]
    pub const fn data(consumer_id: &'a str, consumer_secret: &'a str) -> Self {
        Self {
            consumer_id,
            consumer_secret,
            two_factor_type: None,
            code: None,
            is_save: None,
        }
    }

    /// Build a trading token request authenticated by PIN.
    #[must_use]
    pub fn trading(consumer_id: &'a str, consumer_secret: &'a str, code: Option<&'a str>) -> Self {
        Self {
            consumer_id,
            consumer_secret,
            two_factor_type: Some(0),
            code: Some(code.unwrap_or_default()),
            is_save: Some(true),
        }
    }
}

/// Response envelope used by every FastConnect endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueEnvelope<T> {
    /// Application status; `200` on success.
    #[serde(default)]
    pub status: u16,
    /// Human readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// Payload.
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

/// Token exchange payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenData {
    /// Issued bearer token.
    #[serde(default)]
    pub access_token: Option<String>,
}
