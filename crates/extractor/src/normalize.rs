use serde_json::Value;

use common::{millis_to_utc, OrderRecord, OrderSide};

/// Convert one raw Bitget order into an `OrderRecord`.
///
/// `symbol` is the shard's symbol and always wins over the raw field, so
/// records stay attributable to the slice that produced them.
pub fn normalize_order(raw: &Value, symbol: &str) -> Result<OrderRecord, String> {
    let obj = raw.as_object().ok_or("order is not a JSON object")?;

    let order_id = text(obj.get("orderId"))
        .or_else(|| text(obj.get("order_id")))
        .ok_or("missing orderId")?;

    let side = match text(obj.get("side")).map(|s| s.to_lowercase()).as_deref() {
        Some("buy") => OrderSide::Buy,
        Some("sell") => OrderSide::Sell,
        Some(other) => return Err(format!("unknown side '{other}'")),
        None => return Err("missing side".into()),
    };

    let created_ms = number(obj.get("cTime"))
        .or_else(|| number(obj.get("createTime")))
        .ok_or("missing or invalid cTime")? as i64;
    let created_at = millis_to_utc(created_ms).ok_or("cTime out of range")?;
    let updated_at = number(obj.get("uTime")).and_then(|ms| millis_to_utc(ms as i64));

    // Market orders report price 0; the average fill price is the useful figure.
    let price = match number(obj.get("price")) {
        Some(p) if p > 0.0 => p,
        _ => number(obj.get("priceAvg")).unwrap_or(0.0),
    };
    let quantity = number(obj.get("size"))
        .or_else(|| number(obj.get("quantity")))
        .ok_or("missing or invalid size")?;

    Ok(OrderRecord {
        order_id,
        symbol: symbol.to_string(),
        side,
        order_type: text(obj.get("orderType")),
        price,
        quantity,
        status: text(obj.get("status")).unwrap_or_else(|| "unknown".to_string()),
        created_at,
        updated_at,
    })
}

/// Non-empty string, or a number rendered as a string.
fn text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Finite number from either a JSON number or a numeric string.
fn number(v: Option<&Value>) -> Option<f64> {
    let n = match v? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
