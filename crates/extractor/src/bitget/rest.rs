use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use common::{Credentials, Error, ExchangeClient, OrderPage, PageRequest, Result};

use super::signer::RequestSigner;

const HISTORY_ORDERS_PATH: &str = "/api/v2/spot/trade/history-orders";
const OPEN_ORDERS_PATH: &str = "/api/v2/spot/trade/unfilled-orders";
const SUCCESS_CODE: &str = "00000";

/// Bitget codes that mean the key, signature, passphrase or timestamp is wrong.
const AUTH_CODES: &[&str] = &[
    "40001", "40002", "40003", "40004", "40005", "40006", "40008", "40009", "40011", "40012",
    "40037",
];
const RATE_LIMIT_CODES: &[&str] = &["429", "43001"];

/// REST client for Bitget spot order queries. Read-only: it never places orders.
pub struct BitgetClient {
    credentials: Credentials,
    base_url: String,
    http: Client,
}

impl BitgetClient {
    pub fn new(credentials: Credentials, base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn signed_get(&self, request_path: &str) -> Result<(StatusCode, Option<Duration>, String)> {
        let ts = Utc::now().timestamp_millis();
        let headers = RequestSigner::new(&self.credentials).headers("GET", request_path, "", ts);
        let url = format!("{}{request_path}", self.base_url);

        let mut req = self
            .http
            .get(&url)
            .header("Content-Type", "application/json")
            .header("locale", "en-US");
        for (name, value) in headers.as_pairs() {
            req = req.header(name, value);
        }

        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text().await.map_err(transport_error)?;
        Ok((status, retry_after, body))
    }
}

#[async_trait]
impl ExchangeClient for BitgetClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<OrderPage> {
        let path = request_path(request);
        debug!(symbol = %request.symbol, path = %path, "Fetching Bitget order page");

        let (status, retry_after, body) = self.signed_get(&path).await?;
        if !status.is_success() {
            return Err(classify_http(status.as_u16(), retry_after, &body));
        }
        parse_page(&body, request.limit, retry_after)
    }

    fn name(&self) -> &'static str {
        "bitget"
    }
}

/// Build `path?query` for one page. Parameter order is fixed because the
/// query string is part of the signed prehash.
pub fn request_path(request: &PageRequest) -> String {
    // Product suffixes such as `_SPBL` are not accepted by the v2 endpoints.
    let symbol = request.symbol.split('_').next().unwrap_or(&request.symbol);

    let (path, mut params) = match request.window {
        Some(w) => (
            HISTORY_ORDERS_PATH,
            vec![
                format!("symbol={symbol}"),
                format!("startTime={}", w.start_ms),
                // Bitget's endTime is inclusive; our windows are half-open.
                format!("endTime={}", w.end_ms - 1),
            ],
        ),
        None => (OPEN_ORDERS_PATH, vec![format!("symbol={symbol}")]),
    };
    params.push(format!("limit={}", request.limit));
    if let Some(cursor) = &request.cursor {
        params.push(format!("idLessThan={cursor}"));
    }
    format!("{path}?{}", params.join("&"))
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transient(format!("request timed out: {e}"))
    } else if e.is_decode() {
        Error::Decode(e.to_string())
    } else {
        Error::Transient(e.to_string())
    }
}

#[derive(Deserialize)]
struct Envelope {
    code: Value,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn code(&self) -> String {
        match &self.code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Map a non-2xx response to the error taxonomy.
pub fn classify_http(status: u16, retry_after: Option<Duration>, body: &str) -> Error {
    match status {
        429 => Error::RateLimited { retry_after },
        401 | 403 => Error::Authentication(format!("HTTP {status}: {body}")),
        408 => Error::Transient(format!("HTTP {status}: {body}")),
        s if s >= 500 => Error::Transient(format!("HTTP {s}: {body}")),
        s => match serde_json::from_str::<Envelope>(body) {
            Ok(env) => classify_code(&env.code(), &env.msg, s, retry_after),
            Err(_) => Error::Rejected {
                status: s,
                message: body.to_string(),
            },
        },
    }
}

fn classify_code(code: &str, msg: &str, status: u16, retry_after: Option<Duration>) -> Error {
    if RATE_LIMIT_CODES.contains(&code) {
        Error::RateLimited { retry_after }
    } else if AUTH_CODES.contains(&code) {
        Error::Authentication(format!("{code}: {msg}"))
    } else {
        Error::Rejected {
            status,
            message: format!("{code}: {msg}"),
        }
    }
}

/// Parse a 2xx response body into a page.
///
/// `data` is either a bare list (cursor = last `orderId` when the page is
/// full) or an object wrapping the list and an explicit cursor. Bitget may
/// report a rate limit inside a 2xx body; `retry_after` is the response's
/// header hint for that case.
pub fn parse_page(body: &str, limit: u32, retry_after: Option<Duration>) -> Result<OrderPage> {
    let env: Envelope =
        serde_json::from_str(body).map_err(|e| Error::Decode(format!("{e}: {body}")))?;
    let code = env.code();
    if code != SUCCESS_CODE {
        return Err(classify_code(&code, &env.msg, 200, retry_after));
    }

    match env.data {
        Value::Null => Ok(OrderPage::default()),
        Value::Array(items) => {
            let next_cursor = if !items.is_empty() && items.len() >= limit as usize {
                items.last().and_then(|o| scalar_string(o.get("orderId")))
            } else {
                None
            };
            Ok(OrderPage { items, next_cursor })
        }
        Value::Object(mut map) => {
            let items = ["list", "data", "result", "rows", "orderList"]
                .iter()
                .find_map(|k| match map.remove(*k) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                })
                .unwrap_or_default();
            let next_cursor = ["cursor", "nextCursor", "next", "idLessThan", "endId"]
                .iter()
                .find_map(|k| scalar_string(map.get(*k)));
            Ok(OrderPage { items, next_cursor })
        }
        other => Err(Error::Decode(format!("unexpected data payload: {other}"))),
    }
}

/// Non-empty string or number rendered as a string.
fn scalar_string(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TimeWindow;
    use serde_json::json;

    fn page_request(window: Option<TimeWindow>, cursor: Option<&str>) -> PageRequest {
        PageRequest {
            symbol: "BTCUSDT".into(),
            window,
            cursor: cursor.map(String::from),
            limit: 100,
        }
    }

    #[test]
    fn history_path_uses_inclusive_end_and_cursor() {
        let window = TimeWindow::new(1_000, 2_000).unwrap();
        let path = request_path(&page_request(Some(window), Some("998877")));
        assert_eq!(
            path,
            "/api/v2/spot/trade/history-orders?symbol=BTCUSDT&startTime=1000&endTime=1999&limit=100&idLessThan=998877"
        );
    }

    #[test]
    fn open_orders_path_without_window() {
        let path = request_path(&page_request(None, None));
        assert_eq!(path, "/api/v2/spot/trade/unfilled-orders?symbol=BTCUSDT&limit=100");
    }

    #[test]
    fn product_suffix_is_stripped() {
        let mut req = page_request(None, None);
        req.symbol = "ETHUSDT_SPBL".into();
        assert!(request_path(&req).contains("symbol=ETHUSDT&"));
    }

    #[test]
    fn full_list_page_yields_last_order_id_as_cursor() {
        let body = json!({
            "code": "00000",
            "msg": "success",
            "data": [{"orderId": "3"}, {"orderId": "2"}]
        })
        .to_string();
        let page = parse_page(&body, 2, None).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("2"));
    }

    #[test]
    fn short_list_page_has_no_cursor() {
        let body = json!({"code": "00000", "data": [{"orderId": "3"}]}).to_string();
        let page = parse_page(&body, 100, None).unwrap();
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn wrapped_page_reads_explicit_cursor() {
        let body = json!({
            "code": "00000",
            "data": {"list": [{"orderId": "9"}], "cursor": "abc"}
        })
        .to_string();
        let page = parse_page(&body, 100, None).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn null_data_is_an_empty_page() {
        let page = parse_page(r#"{"code":"00000","data":null}"#, 100, None).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn error_code_in_success_body_is_classified() {
        let err = parse_page(r#"{"code":"40009","msg":"sign signature error"}"#, 100, None).unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));

        let err = parse_page(r#"{"code":"429","msg":"too many requests"}"#, 100, None).unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));

        let err = parse_page(r#"{"code":"40034","msg":"param error"}"#, 100, None).unwrap_err();
        assert!(matches!(err, Error::Rejected { status: 200, .. }));
    }

    #[test]
    fn rate_limit_in_success_body_keeps_header_hint() {
        let hint = Some(Duration::from_secs(7));
        match parse_page(r#"{"code":"429","msg":"too many requests"}"#, 100, hint) {
            Err(Error::RateLimited { retry_after }) => assert_eq!(retry_after, hint),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        assert!(matches!(parse_page("<html>", 100, None), Err(Error::Decode(_))));
    }

    #[test]
    fn http_statuses_map_to_taxonomy() {
        let hint = Some(Duration::from_secs(2));
        match classify_http(429, hint, "") {
            Error::RateLimited { retry_after } => assert_eq!(retry_after, hint),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(classify_http(401, None, ""), Error::Authentication(_)));
        assert!(matches!(classify_http(503, None, "busy"), Error::Transient(_)));
        assert!(matches!(
            classify_http(400, None, "not json"),
            Error::Rejected { status: 400, .. }
        ));
        assert!(matches!(
            classify_http(400, None, r#"{"code":"40006","msg":"invalid key"}"#),
            Error::Authentication(_)
        ));
    }
}
