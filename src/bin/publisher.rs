//! Publishes randomly generated orders on the ingestion channel.

use std::{process, time::Duration};

use clap::Parser;
use ordercache::{
    domain::order::{Delivery, Item, Order, Payment},
    infra::error::InfraError,
};
use rand::{Rng, seq::IndexedRandom};
use sqlx::postgres::{PgPool, PgPoolOptions};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{error, info};
use uuid::Uuid;

const LOCALES: &[&str] = &["en", "ru", "de", "fr"];
const CURRENCIES: &[&str] = &["USD", "EUR", "RUB"];
const CITIES: &[&str] = &["Kiryat Mozkin", "Moscow", "Berlin", "Lyon"];
const BRANDS: &[&str] = &["Vivienne Sabo", "Acme", "Northwind", "Globex"];

#[derive(Debug, Parser)]
#[command(
    name = "publisher",
    version,
    about = "Publish random order payloads for the ordercache ingestion listener"
)]
struct PublisherArgs {
    /// Database connection URL.
    #[arg(long = "database-url", env = "ORDERCACHE__DATABASE__URL", value_name = "URL")]
    database_url: String,

    /// Notification channel the service listens on.
    #[arg(long, default_value = "orders", value_name = "NAME")]
    channel: String,

    /// Pause between two payloads.
    #[arg(long = "interval-ms", default_value_t = 5_000, value_name = "MS")]
    interval_ms: u64,

    /// Stop after this many payloads; runs until interrupted when omitted.
    #[arg(long, value_name = "COUNT")]
    count: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().compact().init();

    let args = PublisherArgs::parse();
    if let Err(err) = run(args).await {
        error!(error = %err, "publisher failed");
        process::exit(1);
    }
}

async fn run(args: PublisherArgs) -> Result<(), InfraError> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&args.database_url)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut sent = 0u64;
    while args.count.is_none_or(|limit| sent < limit) {
        interval.tick().await;
        let order = random_order(&mut rand::rng())?;
        publish(&pool, &args.channel, &order).await?;
        sent += 1;
        info!(order_uid = %order.order_uid, sent, "order published");
    }

    Ok(())
}

async fn publish(pool: &PgPool, channel: &str, order: &Order) -> Result<(), InfraError> {
    let payload = serde_json::to_string(order)
        .map_err(|err| InfraError::configuration(format!("failed to encode order: {err}")))?;

    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(channel)
        .bind(payload)
        .execute(pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(())
}

fn random_order(rng: &mut impl Rng) -> Result<Order, InfraError> {
    let now = OffsetDateTime::now_utc();
    let date_created = now
        .format(&Rfc3339)
        .map_err(|err| InfraError::configuration(format!("failed to format timestamp: {err}")))?;

    let order_uid = Uuid::new_v4().simple().to_string();
    let track_number = format!("WB{}", &order_uid[..10].to_uppercase());
    let amount: i64 = rng.random_range(100..10_000);
    let delivery_cost: i64 = rng.random_range(100..2_000);
    let item_count = rng.random_range(1..4);

    Ok(Order {
        order_uid: order_uid.clone(),
        track_number: track_number.clone(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: format!("Customer {}", rng.random_range(1..10_000)),
            phone: format!("+972{:07}", rng.random_range(0..10_000_000)),
            zip: format!("{:07}", rng.random_range(0..10_000_000)),
            city: pick(rng, CITIES).to_string(),
            address: format!("Street {}", rng.random_range(1..200)),
            region: "Kraiot".to_string(),
            email: format!("{}@example.com", &order_uid[..8]),
        },
        payment: Payment {
            transaction: order_uid.clone(),
            request_id: String::new(),
            currency: pick(rng, CURRENCIES).to_string(),
            provider: "wbpay".to_string(),
            amount,
            payment_dt: now.unix_timestamp().to_string(),
            bank: "alpha".to_string(),
            delivery_cost,
            goods_total: amount - delivery_cost.min(amount),
            custom_fee: 0,
        },
        items: (0..item_count)
            .map(|_| random_item(rng, &track_number))
            .collect(),
        locale: pick(rng, LOCALES).to_string(),
        internal_signature: String::new(),
        customer_id: rng.random_range(0..100),
        delivery_service: "meest".to_string(),
        shardkey: rng.random_range(0..10),
        sm_id: rng.random_range(10..100),
        date_created,
        oof_shard: rng.random_range(0..10),
    })
}

fn random_item(rng: &mut impl Rng, track_number: &str) -> Item {
    let price: i64 = rng.random_range(100..10_000);
    let sale: i32 = rng.random_range(5..99);
    Item {
        chrt_id: rng.random_range(100_000..9_999_999),
        track_number: track_number.to_string(),
        price,
        rid: Uuid::new_v4().simple().to_string(),
        name: format!("Item {}", rng.random_range(1..1_000)),
        sale,
        size: rng.random_range(0..10),
        total_price: price * i64::from(100 - sale) / 100,
        nm_id: rng.random_range(1_000..99_999),
        brand: pick(rng, BRANDS).to_string(),
        status: rng.random_range(100..600),
    }
}

fn pick<'a>(rng: &mut impl Rng, values: &[&'a str]) -> &'a str {
    values.choose(rng).copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn random_orders_stay_in_range_and_decode() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..64 {
            let order = random_order(&mut rng).expect("random order");

            assert!((100..10_000).contains(&order.payment.amount));
            assert!(order.payment.goods_total >= 0);
            assert!((1..4).contains(&order.items.len()));
            assert!(CITIES.contains(&order.delivery.city.as_str()));
            assert!(CURRENCIES.contains(&order.payment.currency.as_str()));
            assert!(LOCALES.contains(&order.locale.as_str()));
            assert!(order.payment.payment_dt.parse::<i64>().is_ok());
            assert!(OffsetDateTime::parse(&order.date_created, &Rfc3339).is_ok());
            for item in &order.items {
                assert!((5..99).contains(&item.sale));
                assert!(item.total_price <= item.price);
                assert!(BRANDS.contains(&item.brand.as_str()));
            }

            let payload = serde_json::to_vec(&order).expect("encode");
            let decoded = Order::from_json(&payload).expect("decode");
            assert_eq!(decoded, order);
            assert!(decoded.validate().is_ok());
        }
    }
}
