mod support;

use std::time::Duration;

use cart_backend::cart::CartStatus;
use cart_backend::reclaimer::Reclaimer;
use cart_backend::reservation::LineRequest;
use tokio::sync::watch;

use support::{B1, Fixture, U1, U2, noon};

const HOUR: Duration = Duration::from_secs(3600);

fn add(quantity: u32) -> LineRequest {
    LineRequest::new(B1, quantity, CartStatus::Opened)
}

#[tokio::test]
async fn second_sweep_is_a_no_op() {
    let fx = Fixture::new().await;
    let cart = fx.engine.add_to_cart(U1, add(10)).await.unwrap();
    fx.clock.advance(chrono::Duration::hours(2));

    let first = fx.engine.reclaim_idle(HOUR).await.unwrap();
    let second = fx.engine.reclaim_idle(HOUR).await.unwrap();

    assert_eq!(first.carts_released, 1);
    assert_eq!(second.carts_released, 0);
    assert_eq!(second.units_returned, 0);
    assert_eq!(fx.stock(B1).await, 50);
    assert!(!fx.reserved(cart.cart_id).await);
    assert_eq!(fx.counters.snapshot().carts_reclaimed, 1);
    assert_eq!(fx.counters.snapshot().units_reclaimed, 10);
}

#[tokio::test]
async fn only_idle_open_reserved_carts_are_released() {
    let fx = Fixture::new().await;
    fx.engine.register_buyer(3, "buyer-three").await.unwrap();

    // idle and open
    let idle = fx.engine.add_to_cart(U1, add(5)).await.unwrap();
    // idle but closed
    let closed = fx.engine.add_to_cart(U2, add(7)).await.unwrap();
    fx.engine.close_cart(closed.cart_id, U2).await.unwrap();

    fx.clock.advance(chrono::Duration::minutes(90));

    // recently touched
    let fresh = fx.engine.add_to_cart(3, add(1)).await.unwrap();

    let report = fx.engine.reclaim_idle(HOUR).await.unwrap();

    assert_eq!(report.carts_released, 1);
    assert_eq!(report.units_returned, 5);
    assert!(!fx.reserved(idle.cart_id).await);
    assert!(fx.reserved(closed.cart_id).await);
    assert!(fx.reserved(fresh.cart_id).await);
    assert_eq!(fx.stock(B1).await, 50 - 7 - 1);
}

#[tokio::test]
async fn exactly_at_threshold_is_not_idle() {
    let fx = Fixture::new().await;
    let cart = fx.engine.add_to_cart(U1, add(10)).await.unwrap();
    fx.clock.advance(chrono::Duration::minutes(60));

    let report = fx.engine.reclaim_idle(HOUR).await.unwrap();

    assert_eq!(report.carts_released, 0);
    assert!(fx.reserved(cart.cart_id).await);
}

#[tokio::test]
async fn touch_restarts_the_idle_clock() {
    let fx = Fixture::new().await;
    let cart = fx.engine.add_to_cart(U1, add(10)).await.unwrap();
    fx.clock.advance(chrono::Duration::minutes(50));
    fx.engine.add_to_cart(U1, add(1)).await.unwrap();
    fx.clock.advance(chrono::Duration::minutes(50));

    let report = fx.engine.reclaim_idle(HOUR).await.unwrap();

    assert_eq!(report.carts_released, 0);
    assert!(fx.reserved(cart.cart_id).await);
    assert_eq!(fx.stock(B1).await, 39);
}

#[tokio::test]
async fn sweep_leaves_no_stale_reserved_cart() {
    let fx = Fixture::new().await;
    for buyer in 10..15 {
        fx.engine.register_buyer(buyer, "b").await.unwrap();
        fx.engine.add_to_cart(buyer, add(2)).await.unwrap();
        fx.clock.advance(chrono::Duration::minutes(20));
    }

    fx.engine.reclaim_idle(HOUR).await.unwrap();

    let cutoff = cart_backend::time::to_epoch_ms(noon() + chrono::Duration::minutes(100 - 60));
    let stale: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM carts WHERE status = 'OPENED' AND reserved = 1 AND updated_at_ms < ?;",
    )
    .bind(cutoff)
    .fetch_one(fx.db.pool())
    .await
    .unwrap();

    assert_eq!(stale, 0);
    assert_eq!(fx.accounted_units().await, 50);
}

#[tokio::test]
async fn run_loop_sweeps_until_shutdown() {
    let fx = Fixture::new().await;
    let cart = fx.engine.add_to_cart(U1, add(10)).await.unwrap();
    fx.set_updated_at(cart.cart_id, noon() - chrono::Duration::hours(3))
        .await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = Reclaimer::new(fx.engine.clone(), Duration::from_millis(20), HOUR)
        .spawn(shutdown_rx);

    let mut released = false;
    for _ in 0..100 {
        if fx.stock(B1).await == 50 {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("reclaimer did not stop")
        .unwrap();

    assert!(released);
    assert!(!fx.reserved(cart.cart_id).await);
}
