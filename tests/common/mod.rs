#![allow(dead_code)]

use ordercache::domain::order::{Delivery, Item, Order, Payment};

pub fn sample_order(order_uid: &str) -> Order {
    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: "1637907727".to_string(),
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: vec![
            item(9_934_930, "Mascaras", 453),
            item(9_934_931, "Lipstick", 120),
            item(9_934_932, "Powder", 310),
        ],
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: 42,
        delivery_service: "meest".to_string(),
        shardkey: 9,
        sm_id: 99,
        date_created: "2021-11-26T06:22:19Z".to_string(),
        oof_shard: 1,
    }
}

fn item(chrt_id: i64, name: &str, price: i64) -> Item {
    Item {
        chrt_id,
        track_number: "WBILMTESTTRACK".to_string(),
        price,
        rid: format!("rid-{chrt_id}"),
        name: name.to_string(),
        sale: 30,
        size: 0,
        total_price: price * 70 / 100,
        nm_id: 2_389_212,
        brand: "Vivienne Sabo".to_string(),
        status: 202,
    }
}
