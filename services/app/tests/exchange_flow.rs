//! End-to-end flows through the whole trading core: deposits, order entry,
//! matching, stops, OCO pairs, and the two-eyes withdrawal workflow.

use std::sync::Arc;

use app::bootstrap;
use bus::Event;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use store::Store;
use types::config::default_config;
use types::errors::{AdminError, AdmissionError, EngineError};
use types::ids::{AdminId, Asset, UserId};
use types::numeric::{Price, Quantity};
use types::order::{OrderRequest, OrderStatus, Side, TimeInForce};
use types::transaction::{TransactionStatus, WithdrawalStage};
use wallet::DepositObserved;

fn alt() -> Asset {
    Asset::new("ALT")
}

fn usdt() -> Asset {
    Asset::new("USDT")
}

/// Register a user and credit a confirmed deposit
fn fund(context: &app::AppContext, email: &str, asset: Asset, amount: Decimal) -> UserId {
    let user = context.accounts.create_user(email, "hunter2").unwrap();
    context
        .wallet
        .on_deposit_observed(
            DepositObserved {
                user_id: user.id,
                asset,
                amount,
                tx_hash: format!("0xdeposit-{email}"),
                confirmations: 6,
            },
            1,
        )
        .unwrap();
    user.id
}

fn limit(side: Side, price: u64, amount: &str) -> OrderRequest {
    OrderRequest::limit(
        "ALT/USDT".into(),
        side,
        Price::from_u64(price),
        amount.parse().unwrap(),
    )
}

fn balance(context: &app::AppContext, user: UserId, asset: Asset) -> (Decimal, Decimal) {
    let b = context.accounts.balance(user, &asset).unwrap();
    (b.available, b.locked)
}

#[test]
fn full_match_settles_accounts_and_fees() {
    let context = bootstrap(default_config()).unwrap();
    let events = context.bus.subscribe("*");

    let alice = fund(&context, "alice@x.io", usdt(), dec!(1000));
    let bob = fund(&context, "bob@x.io", alt(), dec!(10));

    let buy = context
        .accounts
        .place_order(alice, limit(Side::Buy, 100, "10"))
        .unwrap();
    assert_eq!(buy.status, OrderStatus::Open);

    let sell = context
        .accounts
        .place_order(bob, limit(Side::Sell, 100, "10"))
        .unwrap();
    assert_eq!(sell.status, OrderStatus::Filled);
    assert_eq!(
        context.store.get_order(buy.id).unwrap().status,
        OrderStatus::Filled
    );

    // Alice (buyer, maker, 0.1%) nets 9.99 ALT; Bob (seller, taker, 0.2%)
    // nets 998 USDT
    assert_eq!(balance(&context, alice, alt()), (dec!(9.99), dec!(0)));
    assert_eq!(balance(&context, alice, usdt()), (dec!(0), dec!(0)));
    assert_eq!(balance(&context, bob, alt()), (dec!(0), dec!(0)));
    assert_eq!(balance(&context, bob, usdt()), (dec!(998), dec!(0)));

    // Fees landed in the fee account; totals are conserved
    assert_eq!(context.ledger.total_for_asset(&alt()), dec!(10));
    assert_eq!(context.ledger.total_for_asset(&usdt()), dec!(1000));

    // Commit-ordered event stream: submit(A) < accept(A) < submit(B) < trade
    let stream = events.drain();
    let topic_at = |index: usize| stream[index].event.topic();
    let position = |topic: &str| {
        stream
            .iter()
            .position(|e| e.event.topic() == topic)
            .unwrap_or_else(|| panic!("missing topic {topic}"))
    };
    assert!(position("order.submitted") < position("order.accepted"));
    assert!(position("order.accepted") < position("trade.executed"));
    for pair in stream.windows(2) {
        assert!(pair[0].sequence < pair[1].sequence, "bus sequence regressed");
    }
    let trade_pos = position("trade.executed");
    assert!(matches!(
        &stream[trade_pos].event,
        Event::TradeExecuted { price, amount, .. }
            if *price == Price::from_u64(100) && *amount == Quantity::from_u64(10)
    ));
    // First event of the flow is a deposit-side balance change
    assert!(topic_at(0).starts_with("balance.") || topic_at(0).starts_with("deposit."));
}

#[test]
fn price_improvement_accrues_to_taker() {
    let context = bootstrap(default_config()).unwrap();
    let maker = fund(&context, "maker@x.io", alt(), dec!(5));
    let taker = fund(&context, "taker@x.io", usdt(), dec!(525));

    context
        .accounts
        .place_order(maker, limit(Side::Sell, 100, "5"))
        .unwrap();
    let buy = context
        .accounts
        .place_order(taker, limit(Side::Buy, 105, "5"))
        .unwrap();

    assert_eq!(buy.status, OrderStatus::Filled);
    let trades = context.accounts.trades(taker, 10).unwrap();
    assert_eq!(trades.len(), 1);
    // Executed at the maker's 100, not the taker's 105
    assert_eq!(trades[0].price, Price::from_u64(100));
    // The unspent 25 of the 525 reservation came back
    assert_eq!(balance(&context, taker, usdt()), (dec!(25), dec!(0)));
}

#[test]
fn fok_one_unit_short_rejects_cleanly() {
    let context = bootstrap(default_config()).unwrap();
    let seller = fund(&context, "seller@x.io", alt(), dec!(8));
    let buyer = fund(&context, "buyer@x.io", usdt(), dec!(1010));

    context
        .accounts
        .place_order(seller, limit(Side::Sell, 100, "5"))
        .unwrap();
    context
        .accounts
        .place_order(seller, limit(Side::Sell, 101, "3"))
        .unwrap();

    let request = OrderRequest::limit_with_tif(
        "ALT/USDT".into(),
        Side::Buy,
        Price::from_u64(101),
        "10".parse().unwrap(),
        TimeInForce::FOK,
    );
    let err = context.accounts.place_order(buyer, request).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Admission(AdmissionError::FokUnfillable)
    ));

    // Book unchanged, balances exactly restored
    let snapshot = context.engines.snapshot(&"ALT/USDT".into(), 5).unwrap();
    assert_eq!(snapshot.asks.len(), 2);
    assert_eq!(balance(&context, buyer, usdt()), (dec!(1010), dec!(0)));

    // The same amount with exactly enough liquidity fills
    let request = OrderRequest::limit_with_tif(
        "ALT/USDT".into(),
        Side::Buy,
        Price::from_u64(101),
        "8".parse().unwrap(),
        TimeInForce::FOK,
    );
    let order = context.accounts.place_order(buyer, request).unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
}

#[test]
fn stop_order_activates_after_crossing_trade() {
    let context = bootstrap(default_config()).unwrap();
    let seller = fund(&context, "seller@x.io", alt(), dec!(4));
    let buyer = fund(&context, "buyer@x.io", usdt(), dec!(1000));
    let stopper = fund(&context, "stopper@x.io", usdt(), dec!(200));

    // Last trade at 100
    context
        .accounts
        .place_order(seller, limit(Side::Sell, 100, "1"))
        .unwrap();
    context
        .accounts
        .place_order(buyer, limit(Side::Buy, 100, "1"))
        .unwrap();

    // Buy-stop at 105, armed
    let stop = context
        .accounts
        .place_order(
            stopper,
            OrderRequest::stop(
                "ALT/USDT".into(),
                Side::Buy,
                Price::from_u64(105),
                "1".parse().unwrap(),
                Some(dec!(200)),
            ),
        )
        .unwrap();
    assert_eq!(stop.status, OrderStatus::Open);

    // A trade at 106 triggers it; it executes as a market buy immediately
    context
        .accounts
        .place_order(seller, limit(Side::Sell, 106, "3"))
        .unwrap();
    context
        .accounts
        .place_order(buyer, limit(Side::Buy, 106, "1"))
        .unwrap();

    let triggered = context.store.get_order(stop.id).unwrap();
    assert_eq!(triggered.status, OrderStatus::Filled);
    let trades = context.accounts.trades(stopper, 10).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, Price::from_u64(106));
    // Envelope residue released: 200 - 106 = 94
    assert_eq!(balance(&context, stopper, usdt()), (dec!(94), dec!(0)));
}

#[test]
fn oco_fill_cancels_stop_leg_atomically() {
    let context = bootstrap(default_config()).unwrap();
    let alice = fund(&context, "alice@x.io", alt(), dec!(5));
    let bob = fund(&context, "bob@x.io", usdt(), dec!(550));

    let (limit_leg, stop_leg) = context
        .accounts
        .place_oco(
            alice,
            accounts::OcoParams {
                market: "ALT/USDT".into(),
                side: Side::Sell,
                amount: "5".parse().unwrap(),
                limit_price: Price::from_u64(110),
                stop_price: Price::from_u64(90),
                stop_limit_price: Some(Price::from_u64(89)),
                max_quote: None,
            },
        )
        .unwrap();
    assert_eq!(limit_leg.status, OrderStatus::Open);
    assert_eq!(stop_leg.status, OrderStatus::Open);
    // Shared reservation: 5 ALT once, not twice
    assert_eq!(balance(&context, alice, alt()), (dec!(0), dec!(5)));

    let events = context.bus.subscribe("order.canceled");

    // A buy at 110 fills the limit leg; the stop leg cancels in the same
    // command, before any further command is processed
    context
        .accounts
        .place_order(bob, limit(Side::Buy, 110, "5"))
        .unwrap();

    assert_eq!(
        context.store.get_order(limit_leg.id).unwrap().status,
        OrderStatus::Filled
    );
    let stop_after = context.store.get_order(stop_leg.id).unwrap();
    assert!(matches!(stop_after.status, OrderStatus::Canceled(_)));

    let canceled = events.drain();
    assert_eq!(canceled.len(), 1);
    assert!(matches!(
        &canceled[0].event,
        Event::OrderCanceled { order_id, .. } if *order_id == stop_leg.id
    ));

    // Exactly one leg filled; the reservation is fully consumed
    assert_eq!(balance(&context, alice, alt()), (dec!(0), dec!(0)));
    // 550 minus the 0.1% maker fee on the quote leg
    assert_eq!(balance(&context, alice, usdt()), (dec!(549.45), dec!(0)));
}

#[test]
fn two_eyes_withdrawal_flow() {
    let context = bootstrap(default_config()).unwrap();
    let user = fund(&context, "user@x.io", usdt(), dec!(500));

    let tx = context
        .wallet
        .request_withdrawal(user, usdt(), dec!(100), "0xdest".into(), 10)
        .unwrap();
    // 100 plus the 1 USDT network fee locked
    assert_eq!(balance(&context, user, usdt()), (dec!(399), dec!(101)));

    context
        .admin
        .approve_withdrawal(tx.id, AdminId(1), None, 11)
        .unwrap();
    let err = context
        .admin
        .approve_withdrawal(tx.id, AdminId(1), None, 12)
        .unwrap_err();
    assert!(matches!(err, AdminError::SameApprover { .. }));

    let stage = context
        .admin
        .approve_withdrawal(tx.id, AdminId(2), None, 13)
        .unwrap();
    assert_eq!(stage, WithdrawalStage::Confirmed);

    // Locked decreased by 101; available unchanged
    assert_eq!(balance(&context, user, usdt()), (dec!(399), dec!(0)));
    assert_eq!(
        context.store.get_transaction(tx.id).unwrap().status,
        TransactionStatus::Confirmed
    );
}

#[test]
fn deposit_replay_is_idempotent() {
    let context = bootstrap(default_config()).unwrap();
    let user = context.accounts.create_user("u@x.io", "pw").unwrap();

    for round in 0..3 {
        context
            .wallet
            .on_deposit_observed(
                DepositObserved {
                    user_id: user.id,
                    asset: usdt(),
                    amount: dec!(100),
                    tx_hash: "0xsame".into(),
                    confirmations: 6 + round,
                },
                round as i64,
            )
            .unwrap();
    }
    assert_eq!(balance(&context, user.id, usdt()), (dec!(100), dec!(0)));
}

#[test]
fn submit_then_cancel_restores_balances_bit_exactly() {
    let context = bootstrap(default_config()).unwrap();
    let user = fund(&context, "u@x.io", usdt(), dec!(123.456789));

    let before = balance(&context, user, usdt());
    let order = context
        .accounts
        .place_order(
            user,
            OrderRequest::limit(
                "ALT/USDT".into(),
                Side::Buy,
                "1.23".parse().unwrap(),
                "100.357".parse().unwrap(),
            ),
        )
        .unwrap();
    assert!(context.accounts.cancel_order(user, order.id).unwrap());
    assert_eq!(balance(&context, user, usdt()), before);
}

#[test]
fn conservation_holds_across_mixed_activity() {
    let context = bootstrap(default_config()).unwrap();
    let alice = fund(&context, "alice@x.io", usdt(), dec!(1000));
    let bob = fund(&context, "bob@x.io", alt(), dec!(50));
    fund(&context, "carol@x.io", usdt(), dec!(700));

    context
        .accounts
        .place_order(bob, limit(Side::Sell, 100, "20"))
        .unwrap();
    context
        .accounts
        .place_order(alice, limit(Side::Buy, 100, "7"))
        .unwrap();
    context
        .accounts
        .place_order(
            alice,
            OrderRequest::market("ALT/USDT".into(), Side::Buy, "2".parse().unwrap(), Some(dec!(250))),
        )
        .unwrap();

    // Withdraw part of Bob's proceeds
    let tx = context
        .wallet
        .request_withdrawal(bob, usdt(), dec!(100), "0xdest".into(), 50)
        .unwrap();
    context
        .admin
        .approve_withdrawal(tx.id, AdminId(1), None, 51)
        .unwrap();
    context
        .admin
        .approve_withdrawal(tx.id, AdminId(2), None, 52)
        .unwrap();

    // Deposits: 1000 + 700 USDT, 50 ALT. Withdrawals: 101 USDT gross.
    assert_eq!(context.ledger.total_for_asset(&usdt()), dec!(1599));
    assert_eq!(context.ledger.total_for_asset(&alt()), dec!(50));
}
