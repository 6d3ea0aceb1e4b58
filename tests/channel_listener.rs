use std::time::Duration;

use ordercache::infra::listener::ChannelListener;
use sqlx::PgPool;
use tokio::sync::mpsc;

#[sqlx::test(migrations = "./migrations")]
async fn notifications_are_forwarded_to_the_queue(pool: PgPool) {
    let (sender, mut receiver) = mpsc::channel(8);
    let listener = ChannelListener::new(pool.clone(), "orders_test");
    let handle = tokio::spawn(listener.run(sender));

    // The subscription is established asynchronously; publish until one arrives.
    let mut received = None;
    for _ in 0..50 {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind("orders_test")
            .bind("{\"order_uid\":\"abc\"}")
            .execute(&pool)
            .await
            .expect("notify");
        if let Ok(Some(payload)) =
            tokio::time::timeout(Duration::from_millis(100), receiver.recv()).await
        {
            received = Some(payload);
            break;
        }
    }
    assert_eq!(received.as_deref(), Some("{\"order_uid\":\"abc\"}"));

    // Dropping the queue stops the listener on the next notification.
    drop(receiver);
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind("orders_test")
        .bind("late")
        .execute(&pool)
        .await
        .expect("notify");
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener stops")
        .expect("listener task");
    assert!(result.is_ok());
}
