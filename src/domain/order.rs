//! Order aggregate as published on the ingestion channel.

use serde::{Deserialize, Deserializer, Serialize};

use super::error::DomainError;

/// A customer order keyed by its globally unique `order_uid`.
///
/// Orders are append-only: once persisted they are never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: i64,
    pub delivery_service: String,
    pub shardkey: i32,
    pub sm_id: i32,
    /// Creation timestamp exactly as the producer formatted it.
    pub date_created: String,
    pub oof_shard: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Payment timestamp; producers send either a string or a number.
    #[serde(deserialize_with = "text_or_number")]
    pub payment_dt: String,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: i32,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Text(text) => text,
        TextOrNumber::Integer(value) => value.to_string(),
        TextOrNumber::Unsigned(value) => value.to_string(),
        TextOrNumber::Float(value) => value.to_string(),
    })
}

impl Order {
    /// Decode a channel payload into an order.
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Check the invariants an order must satisfy before it can be stored.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.order_uid.trim().is_empty() {
            return Err(DomainError::validation("order_uid must not be empty"));
        }
        if self.order_uid.len() > 255 {
            return Err(DomainError::validation(
                "order_uid must be at most 255 characters",
            ));
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample_order;
    use super::*;

    #[test]
    fn decodes_channel_payload() {
        let payload = serde_json::to_vec(&sample_order("b563feb7b2b84b6test")).expect("encode");
        let order = Order::from_json(&payload).expect("decode");
        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.date_created, "2021-11-26T06:22:19Z");
    }

    #[test]
    fn accepts_textual_and_numeric_payment_time() {
        let mut value = serde_json::to_value(sample_order("text-dt")).expect("encode");
        value["payment"]["payment_dt"] = serde_json::json!("40817810599999999999");
        value["date_created"] = serde_json::json!("2019-03-14 08:41:02 +0000 UTC");
        let order = Order::from_json(value.to_string().as_bytes()).expect("decode text");
        assert_eq!(order.payment.payment_dt, "40817810599999999999");
        assert_eq!(order.date_created, "2019-03-14 08:41:02 +0000 UTC");

        value["payment"]["payment_dt"] = serde_json::json!(1_637_907_727);
        let order = Order::from_json(value.to_string().as_bytes()).expect("decode number");
        assert_eq!(order.payment.payment_dt, "1637907727");
    }

    #[test]
    fn rejects_non_scalar_payment_time() {
        let mut value = serde_json::to_value(sample_order("bad-dt")).expect("encode");
        value["payment"]["payment_dt"] = serde_json::json!({ "seconds": 1 });
        let err = Order::from_json(value.to_string().as_bytes()).unwrap_err();
        assert!(err.is_data());
    }

    #[test]
    fn rejects_payload_with_missing_fields() {
        let err = Order::from_json(br#"{"order_uid":"abc"}"#).unwrap_err();
        assert!(err.is_data());
    }

    #[test]
    fn rejects_invalid_json() {
        let err = Order::from_json(b"{not json").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn blank_order_uid_fails_validation() {
        let order = sample_order("   ");
        assert!(matches!(
            order.validate(),
            Err(DomainError::Validation { .. })
        ));
        assert!(sample_order("ok").validate().is_ok());
    }
}
