//! End-to-end scenarios driving the coordinator through its public API.
//!
//! Each test uses `inspect_pair` as a barrier: the reply only arrives after
//! the partition has drained everything admitted before it.

use std::sync::Arc;

use algex::config::{DedupConfig, EngineConfig};
use algex::domain::{
    ExecutionEvent, MarketTick, OrderStatus, OrderType, RejectReason, Side, Signal,
};
use algex::engine::{ExecutionCoordinator, PartitionSnapshot, TickOutcome};
use algex::services::Metrics;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

fn coordinator_with(
    config: EngineConfig,
) -> (
    Arc<ExecutionCoordinator>,
    mpsc::UnboundedReceiver<ExecutionEvent>,
) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let coordinator = ExecutionCoordinator::new(
        config,
        &DedupConfig::default(),
        events_tx,
        Arc::new(Metrics::new()),
    );
    (Arc::new(coordinator), events_rx)
}

fn signal(
    id: &str,
    account: &str,
    symbol: &str,
    side: Side,
    order_type: OrderType,
    quantity: Decimal,
    limit_price: Option<Decimal>,
) -> Signal {
    Signal {
        signal_id: id.to_string(),
        account_id: account.to_string(),
        symbol: symbol.to_string(),
        side,
        order_type,
        quantity,
        limit_price,
        received_at: Utc::now(),
    }
}

async fn settle(coordinator: &ExecutionCoordinator, account: &str, symbol: &str) -> PartitionSnapshot {
    coordinator
        .inspect_pair(account, symbol)
        .await
        .expect("partition should exist")
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// Scenario A: a market order with no price yet rests until the first tick,
// then fills at the tick price adjusted by slippage.
#[tokio::test]
async fn market_order_waits_for_first_tick_then_fills_with_slippage() {
    let (coordinator, mut rx) = coordinator_with(EngineConfig::default());

    coordinator
        .handle_signal(signal(
            "sig-a",
            "acct-1",
            "BTCUSDT",
            Side::Buy,
            OrderType::Market,
            dec!(10),
            None,
        ))
        .unwrap();

    let snap = settle(&coordinator, "acct-1", "BTCUSDT").await;
    let order = snap.order_for_signal("sig-a").unwrap();
    assert_eq!(order.status, OrderStatus::Working);
    assert!(drain(&mut rx).is_empty());

    coordinator
        .handle_tick(MarketTick::new("BTCUSDT", dec!(50000), 1))
        .unwrap();

    let snap = settle(&coordinator, "acct-1", "BTCUSDT").await;
    let order = snap.order_for_signal("sig-a").unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.filled_quantity, dec!(10));
    // 50000 * (1 + 5/10000) = 50025, default 5 bps against the buyer
    assert_eq!(order.average_fill_price, Some(dec!(50025.0000)));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ExecutionEvent::Filled { fill, .. } => {
            assert_eq!(fill.quantity, dec!(10));
            assert_eq!(fill.tick_sequence_used, 1);
            assert_eq!(fill.slippage_bps, 5);
        }
        other => panic!("expected a fill event, got {:?}", other),
    }
}

// Scenario B: the same signal id submitted twice creates exactly one order.
#[tokio::test]
async fn duplicate_signal_is_an_idempotent_noop() {
    let (coordinator, mut rx) = coordinator_with(EngineConfig::default());
    coordinator
        .handle_tick(MarketTick::new("BTCUSDT", dec!(50000), 1))
        .unwrap();

    for _ in 0..2 {
        coordinator
            .handle_signal(signal(
                "sig-b",
                "acct-1",
                "BTCUSDT",
                Side::Buy,
                OrderType::Market,
                dec!(1),
                None,
            ))
            .unwrap();
    }

    let snap = settle(&coordinator, "acct-1", "BTCUSDT").await;
    assert_eq!(snap.orders.len(), 1);
    // One fill event from the single accepted order
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
}

// Scenario C: a sell limit rests through a non-qualifying price and fills
// at the price of the tick that crosses its level, with no slippage.
#[tokio::test]
async fn sell_limit_fills_on_the_crossing_tick_at_its_price() {
    let (coordinator, mut rx) = coordinator_with(EngineConfig::default());
    coordinator
        .handle_tick(MarketTick::new("ETHUSDT", dec!(49000), 1))
        .unwrap();

    coordinator
        .handle_signal(signal(
            "sig-c",
            "acct-1",
            "ETHUSDT",
            Side::Sell,
            OrderType::Limit,
            dec!(5),
            Some(dec!(48000)),
        ))
        .unwrap();

    // Limit orders are not matched against the pre-existing snapshot
    let snap = settle(&coordinator, "acct-1", "ETHUSDT").await;
    assert_eq!(
        snap.order_for_signal("sig-c").unwrap().status,
        OrderStatus::Working
    );

    coordinator
        .handle_tick(MarketTick::new("ETHUSDT", dec!(47900), 2))
        .unwrap();

    let snap = settle(&coordinator, "acct-1", "ETHUSDT").await;
    let order = snap.order_for_signal("sig-c").unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.average_fill_price, Some(dec!(47900)));

    let events = drain(&mut rx);
    match &events[..] {
        [ExecutionEvent::Filled { fill, .. }] => {
            assert_eq!(fill.price, dec!(47900));
            assert_eq!(fill.slippage_bps, 0);
            assert_eq!(fill.tick_sequence_used, 2);
        }
        other => panic!("expected one fill event, got {:?}", other),
    }
}

// Scenario D: a cancel admitted before a qualifying tick wins the race;
// the canceled order never fills.
#[tokio::test]
async fn canceled_order_never_fills_on_a_later_tick() {
    let (coordinator, mut rx) = coordinator_with(EngineConfig::default());
    coordinator
        .handle_tick(MarketTick::new("BTCUSDT", dec!(50000), 1))
        .unwrap();

    coordinator
        .handle_signal(signal(
            "sig-d",
            "acct-1",
            "BTCUSDT",
            Side::Buy,
            OrderType::Limit,
            dec!(2),
            Some(dec!(48000)),
        ))
        .unwrap();
    let snap = settle(&coordinator, "acct-1", "BTCUSDT").await;
    let order_id = snap.order_for_signal("sig-d").unwrap().order_id;

    coordinator
        .cancel_order("acct-1", "BTCUSDT", order_id)
        .unwrap();
    // Qualifying tick arrives after the cancel
    coordinator
        .handle_tick(MarketTick::new("BTCUSDT", dec!(47000), 2))
        .unwrap();

    let snap = settle(&coordinator, "acct-1", "BTCUSDT").await;
    let order = snap.order_for_signal("sig-d").unwrap();
    assert_eq!(order.status, OrderStatus::Canceled);
    assert_eq!(order.filled_quantity, dec!(0));
    assert!(snap.position.is_flat());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ExecutionEvent::Canceled { .. }));
    // The reservation is released with the cancel
    let account = coordinator.account("acct-1").unwrap();
    assert_eq!(account.reserved_cash, dec!(0));
}

// Scenario E: cash moves by exactly fill price × quantity (no fees
// configured), debited on a buy and credited on a sell.
#[tokio::test]
async fn cash_is_debited_and_credited_by_exact_notional() {
    let config = EngineConfig {
        slippage_bps: 0,
        starting_cash: dec!(100000),
        ..EngineConfig::default()
    };
    let (coordinator, _rx) = coordinator_with(config);
    coordinator
        .handle_tick(MarketTick::new("ETHUSDT", dec!(100), 1))
        .unwrap();

    coordinator
        .handle_signal(signal(
            "sig-e1",
            "acct-1",
            "ETHUSDT",
            Side::Buy,
            OrderType::Market,
            dec!(10),
            None,
        ))
        .unwrap();
    settle(&coordinator, "acct-1", "ETHUSDT").await;
    let account = coordinator.account("acct-1").unwrap();
    assert_eq!(account.cash_balance, dec!(99000));

    coordinator
        .handle_tick(MarketTick::new("ETHUSDT", dec!(110), 2))
        .unwrap();
    coordinator
        .handle_signal(signal(
            "sig-e2",
            "acct-1",
            "ETHUSDT",
            Side::Sell,
            OrderType::Market,
            dec!(10),
            None,
        ))
        .unwrap();
    let snap = settle(&coordinator, "acct-1", "ETHUSDT").await;

    let account = coordinator.account("acct-1").unwrap();
    assert_eq!(account.cash_balance, dec!(100100));
    assert!(snap.position.is_flat());
    assert_eq!(snap.position.realized_pnl, dec!(100));
}

// Stale ticks are discarded and never reach resting orders.
#[tokio::test]
async fn stale_ticks_are_discarded() {
    let (coordinator, mut rx) = coordinator_with(EngineConfig::default());
    coordinator
        .handle_tick(MarketTick::new("BTCUSDT", dec!(50000), 5))
        .unwrap();

    coordinator
        .handle_signal(signal(
            "sig-s",
            "acct-1",
            "BTCUSDT",
            Side::Buy,
            OrderType::Limit,
            dec!(1),
            Some(dec!(48000)),
        ))
        .unwrap();
    settle(&coordinator, "acct-1", "BTCUSDT").await;

    // Sequence 4 would qualify on price but is stale
    let outcome = coordinator
        .handle_tick(MarketTick::new("BTCUSDT", dec!(47000), 4))
        .unwrap();
    assert_eq!(outcome, TickOutcome::Stale);

    let snap = settle(&coordinator, "acct-1", "BTCUSDT").await;
    assert_eq!(
        snap.order_for_signal("sig-s").unwrap().status,
        OrderStatus::Working
    );
    assert!(drain(&mut rx).is_empty());
}

// Validation failures produce an order born REJECTED and a terminal
// rejection on the event stream.
#[tokio::test]
async fn invalid_signals_are_rejected_with_reasons() {
    let config = EngineConfig {
        symbols: vec!["BTCUSDT".to_string()],
        ..EngineConfig::default()
    };
    let (coordinator, mut rx) = coordinator_with(config);

    coordinator
        .handle_signal(signal(
            "sig-r1",
            "acct-1",
            "BTCUSDT",
            Side::Buy,
            OrderType::Market,
            dec!(0),
            None,
        ))
        .unwrap();
    coordinator
        .handle_signal(signal(
            "sig-r2",
            "acct-1",
            "BTCUSDT",
            Side::Buy,
            OrderType::Limit,
            dec!(1),
            None,
        ))
        .unwrap();
    coordinator
        .handle_signal(signal(
            "sig-r3",
            "acct-1",
            "DOGEUSDT",
            Side::Buy,
            OrderType::Market,
            dec!(1),
            None,
        ))
        .unwrap();
    settle(&coordinator, "acct-1", "BTCUSDT").await;
    settle(&coordinator, "acct-1", "DOGEUSDT").await;

    let events = drain(&mut rx);
    let mut reasons: Vec<RejectReason> = events
        .iter()
        .map(|e| match e {
            ExecutionEvent::Rejected { reason, .. } => *reason,
            other => panic!("expected rejections, got {:?}", other),
        })
        .collect();
    reasons.sort_by_key(|r| r.as_str());
    assert_eq!(
        reasons,
        vec![
            RejectReason::MissingLimitPrice,
            RejectReason::NonPositiveQuantity,
            RejectReason::UnknownSymbol,
        ]
    );
}

// A limit buy the account cannot cover is rejected before it rests.
#[tokio::test]
async fn limit_buy_beyond_available_cash_is_rejected() {
    let config = EngineConfig {
        starting_cash: dec!(1000),
        ..EngineConfig::default()
    };
    let (coordinator, mut rx) = coordinator_with(config);

    coordinator
        .handle_signal(signal(
            "sig-poor",
            "acct-1",
            "BTCUSDT",
            Side::Buy,
            OrderType::Limit,
            dec!(1),
            Some(dec!(48000)),
        ))
        .unwrap();
    let snap = settle(&coordinator, "acct-1", "BTCUSDT").await;

    assert_eq!(
        snap.order_for_signal("sig-poor").unwrap().status,
        OrderStatus::Rejected
    );
    let events = drain(&mut rx);
    assert!(matches!(
        &events[..],
        [ExecutionEvent::Rejected {
            reason: RejectReason::InsufficientCash,
            ..
        }]
    ));
}

// A resting limit buy holds its notional in reserved cash until it fills.
#[tokio::test]
async fn limit_buy_reserves_notional_until_filled() {
    let config = EngineConfig {
        starting_cash: dec!(100000),
        ..EngineConfig::default()
    };
    let (coordinator, _rx) = coordinator_with(config);
    coordinator
        .handle_tick(MarketTick::new("ETHUSDT", dec!(3000), 1))
        .unwrap();

    coordinator
        .handle_signal(signal(
            "sig-res",
            "acct-1",
            "ETHUSDT",
            Side::Buy,
            OrderType::Limit,
            dec!(10),
            Some(dec!(2900)),
        ))
        .unwrap();
    settle(&coordinator, "acct-1", "ETHUSDT").await;

    let account = coordinator.account("acct-1").unwrap();
    assert_eq!(account.reserved_cash, dec!(29000));
    assert_eq!(account.available_cash(), dec!(71000));

    coordinator
        .handle_tick(MarketTick::new("ETHUSDT", dec!(2880), 2))
        .unwrap();
    settle(&coordinator, "acct-1", "ETHUSDT").await;

    let account = coordinator.account("acct-1").unwrap();
    assert_eq!(account.reserved_cash, dec!(0));
    // Filled at the triggering tick's price, not the limit
    assert_eq!(account.cash_balance, dec!(71200));
}

// filled_quantity always equals the sum of the order's fill events.
#[tokio::test]
async fn filled_quantity_matches_fill_events() {
    let (coordinator, mut rx) = coordinator_with(EngineConfig::default());
    coordinator
        .handle_tick(MarketTick::new("BTCUSDT", dec!(50000), 1))
        .unwrap();

    for (i, qty) in [dec!(3), dec!(7), dec!(2)].iter().enumerate() {
        coordinator
            .handle_signal(signal(
                &format!("sig-q{i}"),
                "acct-1",
                "BTCUSDT",
                Side::Buy,
                OrderType::Market,
                *qty,
                None,
            ))
            .unwrap();
    }
    let snap = settle(&coordinator, "acct-1", "BTCUSDT").await;

    let events = drain(&mut rx);
    for order in &snap.orders {
        let filled: Decimal = events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::Filled { order_id, fill, .. } if *order_id == order.order_id => {
                    Some(fill.quantity)
                }
                _ => None,
            })
            .sum();
        assert_eq!(filled, order.filled_quantity);
        assert!(order.filled_quantity <= order.quantity);
    }
}

// Position is the running signed sum of fills for the pair.
#[tokio::test]
async fn position_tracks_signed_fill_sum() {
    let config = EngineConfig {
        slippage_bps: 0,
        ..EngineConfig::default()
    };
    let (coordinator, _rx) = coordinator_with(config);
    coordinator
        .handle_tick(MarketTick::new("ETHUSDT", dec!(100), 1))
        .unwrap();

    let legs = [
        (Side::Buy, dec!(10)),
        (Side::Sell, dec!(4)),
        (Side::Sell, dec!(9)),
    ];
    for (i, (side, qty)) in legs.iter().enumerate() {
        coordinator
            .handle_signal(signal(
                &format!("sig-p{i}"),
                "acct-1",
                "ETHUSDT",
                *side,
                OrderType::Market,
                *qty,
                None,
            ))
            .unwrap();
    }
    let snap = settle(&coordinator, "acct-1", "ETHUSDT").await;

    // 10 - 4 - 9 = -3: reduced to flat then reversed short
    assert_eq!(snap.position.net_quantity, dec!(-3));
    assert_eq!(snap.position.average_entry_price, dec!(100));
}

// Pairs are independent: an account's activity on one symbol does not
// order-couple with another symbol.
#[tokio::test]
async fn partitions_are_independent_per_pair() {
    let (coordinator, _rx) = coordinator_with(EngineConfig::default());
    coordinator
        .handle_tick(MarketTick::new("BTCUSDT", dec!(50000), 1))
        .unwrap();
    coordinator
        .handle_tick(MarketTick::new("ETHUSDT", dec!(3000), 1))
        .unwrap();

    coordinator
        .handle_signal(signal(
            "sig-x1",
            "acct-1",
            "BTCUSDT",
            Side::Buy,
            OrderType::Market,
            dec!(1),
            None,
        ))
        .unwrap();
    coordinator
        .handle_signal(signal(
            "sig-x2",
            "acct-2",
            "BTCUSDT",
            Side::Sell,
            OrderType::Market,
            dec!(2),
            None,
        ))
        .unwrap();
    coordinator
        .handle_signal(signal(
            "sig-x3",
            "acct-1",
            "ETHUSDT",
            Side::Buy,
            OrderType::Market,
            dec!(3),
            None,
        ))
        .unwrap();

    let btc1 = settle(&coordinator, "acct-1", "BTCUSDT").await;
    let btc2 = settle(&coordinator, "acct-2", "BTCUSDT").await;
    let eth1 = settle(&coordinator, "acct-1", "ETHUSDT").await;

    assert_eq!(coordinator.partition_count(), 3);
    assert_eq!(btc1.position.net_quantity, dec!(1));
    assert_eq!(btc2.position.net_quantity, dec!(-2));
    assert_eq!(eth1.position.net_quantity, dec!(3));
}
