use async_trait::async_trait;

use crate::{
    application::repos::{OrdersRepo, RepoError},
    domain::order::{Delivery, Item, Order, Payment},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: i64,
    delivery_service: String,
    shardkey: i32,
    sm_id: i32,
    date_created: String,
    oof_shard: i32,
    delivery_name: String,
    delivery_phone: String,
    delivery_zip: String,
    delivery_city: String,
    delivery_address: String,
    delivery_region: String,
    delivery_email: String,
    payment_transaction: String,
    payment_request_id: String,
    payment_currency: String,
    payment_provider: String,
    payment_amount: i64,
    payment_dt: String,
    payment_bank: String,
    payment_delivery_cost: i64,
    payment_goods_total: i64,
    payment_custom_fee: i64,
}

impl OrderRow {
    fn into_order(self, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: Delivery {
                name: self.delivery_name,
                phone: self.delivery_phone,
                zip: self.delivery_zip,
                city: self.delivery_city,
                address: self.delivery_address,
                region: self.delivery_region,
                email: self.delivery_email,
            },
            payment: Payment {
                transaction: self.payment_transaction,
                request_id: self.payment_request_id,
                currency: self.payment_currency,
                provider: self.payment_provider,
                amount: self.payment_amount,
                payment_dt: self.payment_dt,
                bank: self.payment_bank,
                delivery_cost: self.payment_delivery_cost,
                goods_total: self.payment_goods_total,
                custom_fee: self.payment_custom_fee,
            },
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    chrt_id: i64,
    track_number: String,
    price: i64,
    rid: String,
    name: String,
    sale: i32,
    size: i32,
    total_price: i64,
    nm_id: i64,
    brand: String,
    status: i32,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            rid: row.rid,
            name: row.name,
            sale: row.sale,
            size: row.size,
            total_price: row.total_price,
            nm_id: row.nm_id,
            brand: row.brand,
            status: row.status,
        }
    }
}

#[async_trait]
impl OrdersRepo for PostgresRepositories {
    async fn write_order(&self, order: &Order) -> Result<String, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let delivery = &order.delivery;
        let delivery_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO delivery (name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let payment = &order.payment;
        let payment_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO payment (
                transaction, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(&payment.transaction)
        .bind(&payment.request_id)
        .bind(&payment.currency)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(&payment.payment_dt)
        .bind(&payment.bank)
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let order_uid: String = sqlx::query_scalar(
            r#"
            INSERT INTO orders (
                order_uid, payment_id, delivery_id, track_number, entry, locale,
                internal_signature, customer_id, delivery_service, shardkey, sm_id,
                date_created, oof_shard
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING order_uid
            "#,
        )
        .bind(&order.order_uid)
        .bind(payment_id)
        .bind(delivery_id)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(order.customer_id)
        .bind(&order.delivery_service)
        .bind(order.shardkey)
        .bind(order.sm_id)
        .bind(&order.date_created)
        .bind(order.oof_shard)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        for (position, item) in order.items.iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| RepoError::InvalidInput {
                message: "order has too many items".to_string(),
            })?;

            let item_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO items (
                    chrt_id, track_number, price, rid, name, sale, size,
                    total_price, nm_id, brand, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING item_id
                "#,
            )
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            sqlx::query(
                r#"
                INSERT INTO order_items (order_uid, item_id, position)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(&order_uid)
            .bind(item_id)
            .bind(position)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(order_uid)
    }

    async fn read_order(&self, order_uid: &str) -> Result<Order, RepoError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT
                o.order_uid,
                o.track_number,
                o.entry,
                o.locale,
                o.internal_signature,
                o.customer_id,
                o.delivery_service,
                o.shardkey,
                o.sm_id,
                o.date_created,
                o.oof_shard,
                d.name AS delivery_name,
                d.phone AS delivery_phone,
                d.zip AS delivery_zip,
                d.city AS delivery_city,
                d.address AS delivery_address,
                d.region AS delivery_region,
                d.email AS delivery_email,
                p.transaction AS payment_transaction,
                p.request_id AS payment_request_id,
                p.currency AS payment_currency,
                p.provider AS payment_provider,
                p.amount AS payment_amount,
                p.payment_dt,
                p.bank AS payment_bank,
                p.delivery_cost AS payment_delivery_cost,
                p.goods_total AS payment_goods_total,
                p.custom_fee AS payment_custom_fee
            FROM orders o
            INNER JOIN delivery d ON d.id = o.delivery_id
            INNER JOIN payment p ON p.id = o.payment_id
            WHERE o.order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        let items = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT
                i.chrt_id, i.track_number, i.price, i.rid, i.name, i.sale, i.size,
                i.total_price, i.nm_id, i.brand, i.status
            FROM order_items oi
            INNER JOIN items i ON i.item_id = oi.item_id
            WHERE oi.order_uid = $1
            ORDER BY oi.position
            "#,
        )
        .bind(order_uid)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into_order(items.into_iter().map(Item::from).collect()))
    }
}
