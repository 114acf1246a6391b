//! End-to-end checkout, payment and cancellation flows over the in-memory store.

use common::{MerchantId, Money, PageRequest, ProductId, UserId};
use domain::numbering;
use domain::{
    Coupon, InvoiceStatus, NewOrder, OrderPaymentStatus, OrderStatus, PaymentMethod,
    PaymentStatus, Product, StockChangeReason, TransactionKind,
};
use fulfillment::{ErrorKind, Fulfillment, FulfillmentError, OrderDetails};
use futures_util::future::join_all;
use store::{InMemoryStore, OrderFilter};

struct Harness {
    app: Fulfillment<InMemoryStore>,
    merchant: MerchantId,
}

impl Harness {
    async fn new() -> Self {
        let app = Fulfillment::new(InMemoryStore::new());
        let merchant = MerchantId::new();

        for (sku, name, price, quantity) in [
            ("SKU-001", "Widget", 100_000, 10),
            ("SKU-002", "Gadget", 25_000, 5),
        ] {
            app.upsert_product(&Product::new(sku, merchant, name, Money::new(price)))
                .await
                .unwrap();
            app.stock()
                .set_stock(&ProductId::new(sku), quantity, 2)
                .await
                .unwrap();
        }

        Self { app, merchant }
    }

    async fn fill_cart(&self, user: UserId, lines: &[(&str, u32)]) {
        for (sku, quantity) in lines {
            self.app
                .carts()
                .add_item(user, &ProductId::new(*sku), *quantity)
                .await
                .unwrap();
        }
    }

    async fn checkout(&self, user: UserId, input: NewOrder) -> Result<OrderDetails, FulfillmentError> {
        self.app
            .orders()
            .create_from_cart(user, self.merchant, input)
            .await
    }

    async fn quantity(&self, sku: &str) -> u32 {
        self.app
            .stock()
            .stock(&ProductId::new(sku))
            .await
            .unwrap()
            .unwrap()
            .quantity
    }
}

fn with_shipping(amount: i64) -> NewOrder {
    NewOrder {
        shipping_cost: Money::new(amount),
        ..Default::default()
    }
}

fn with_coupon(code: &str) -> NewOrder {
    NewOrder {
        coupon_code: Some(code.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_checkout_without_coupon() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.fill_cart(user, &[("SKU-001", 1)]).await;

    let details = h.checkout(user, with_shipping(10_000)).await.unwrap();
    let order = &details.order;

    assert_eq!(order.subtotal, Money::new(100_000));
    assert_eq!(order.tax, Money::new(10_000));
    assert_eq!(order.discount_amount, Money::zero());
    assert_eq!(order.total_price, Money::new(120_000));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, OrderPaymentStatus::Pending);
    assert!(order.coupon_code.is_none());

    assert_eq!(details.items.len(), 1);
    assert_eq!(details.items[0].total_price, Money::new(100_000));
    assert_eq!(details.history.len(), 1);
    assert_eq!(details.history[0].changed_by, Some(user));

    let invoice = details.invoice.as_ref().unwrap();
    assert_eq!(invoice.total, Money::new(120_000));
    assert_eq!(invoice.status, InvoiceStatus::Draft);

    assert_eq!(h.quantity("SKU-001").await, 9);
    let history = h.app.stock().history(&ProductId::new("SKU-001")).await.unwrap();
    let purchase = history.last().unwrap();
    assert_eq!(purchase.reason, StockChangeReason::Purchase);
    assert_eq!(purchase.order_id, Some(order.id));

    let entries = h.app.journal().for_order(order.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, TransactionKind::Order);
    assert_eq!(entries[0].amount, Money::new(120_000));

    assert!(h.app.carts().get_cart(user).await.unwrap().is_empty());
    assert_eq!(h.app.orders().get_order(order.id).await.unwrap(), details);
}

#[tokio::test]
async fn test_checkout_with_percentage_coupon() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.app
        .coupons()
        .create_coupon(Coupon::percentage("SAVE10", 10))
        .await
        .unwrap();
    h.fill_cart(user, &[("SKU-001", 1)]).await;

    let details = h.checkout(user, with_coupon("save10")).await.unwrap();
    let order = &details.order;

    assert_eq!(order.discount_amount, Money::new(10_000));
    // tax stays on the undiscounted subtotal
    assert_eq!(order.tax, Money::new(10_000));
    assert_eq!(order.total_price, Money::new(100_000));
    assert_eq!(order.coupon_code.as_deref(), Some("SAVE10"));

    let coupon = h.app.coupons().get_coupon("SAVE10").await.unwrap().unwrap();
    assert_eq!(coupon.used_count, 1);
    let usage = h.app.coupons().usage_for_order(order.id).await.unwrap().unwrap();
    assert_eq!(usage.discount_amount, Money::new(10_000));
}

#[tokio::test]
async fn test_coupon_discount_is_capped() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.app
        .coupons()
        .create_coupon(Coupon::percentage("SAVE10", 10).with_max_discount(Money::new(5_000)))
        .await
        .unwrap();
    h.fill_cart(user, &[("SKU-001", 1)]).await;

    let details = h.checkout(user, with_coupon("SAVE10")).await.unwrap();
    assert_eq!(details.order.discount_amount, Money::new(5_000));
}

#[tokio::test]
async fn test_ineligible_coupon_is_ignored() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.app
        .coupons()
        .create_coupon(Coupon::percentage("OFF", 50).deactivated())
        .await
        .unwrap();
    h.fill_cart(user, &[("SKU-001", 1)]).await;

    let details = h.checkout(user, with_coupon("OFF")).await.unwrap();

    assert_eq!(details.order.discount_amount, Money::zero());
    assert!(details.order.coupon_code.is_none());
    assert_eq!(
        h.app.coupons().get_coupon("OFF").await.unwrap().unwrap().used_count,
        0
    );
}

#[tokio::test]
async fn test_empty_cart_checkout_changes_nothing() {
    let h = Harness::new().await;
    let before = h.app.store().row_counts().await;

    let err = h.checkout(UserId::new(), NewOrder::default()).await.unwrap_err();

    assert!(matches!(err, FulfillmentError::EmptyCart));
    assert_eq!(err.kind(), ErrorKind::BusinessRule);
    assert_eq!(h.app.store().row_counts().await, before);
}

#[tokio::test]
async fn test_insufficient_stock_rolls_back_everything() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.app
        .coupons()
        .create_coupon(Coupon::percentage("SAVE10", 10))
        .await
        .unwrap();
    h.fill_cart(user, &[("SKU-001", 1), ("SKU-002", 3)]).await;
    h.app
        .stock()
        .set_stock(&ProductId::new("SKU-002"), 2, 2)
        .await
        .unwrap();
    let before = h.app.store().row_counts().await;

    let err = h.checkout(user, with_coupon("SAVE10")).await.unwrap_err();

    assert!(matches!(
        err,
        FulfillmentError::InsufficientStock { requested: 3, .. }
    ));
    assert_eq!(h.app.store().row_counts().await, before);
    assert_eq!(h.quantity("SKU-001").await, 10);
    assert_eq!(h.quantity("SKU-002").await, 2);
    assert_eq!(
        h.app.coupons().get_coupon("SAVE10").await.unwrap().unwrap().used_count,
        0
    );
    assert_eq!(h.app.carts().get_cart(user).await.unwrap().items.len(), 2);
}

#[tokio::test]
async fn test_concurrent_checkouts_never_oversell() {
    let h = Harness::new().await;
    h.app
        .stock()
        .set_stock(&ProductId::new("SKU-002"), 3, 0)
        .await
        .unwrap();

    let users: Vec<UserId> = (0..5).map(|_| UserId::new()).collect();
    for user in &users {
        h.fill_cart(*user, &[("SKU-002", 1)]).await;
    }

    let results = join_all(
        users
            .iter()
            .map(|user| h.checkout(*user, NewOrder::default())),
    )
    .await;

    let placed = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(FulfillmentError::InsufficientStock { .. })))
        .count();
    assert_eq!(placed, 3);
    assert_eq!(rejected, 2);
    assert_eq!(h.quantity("SKU-002").await, 0);
    assert_eq!(h.app.store().row_counts().await.orders, 3);
}

#[tokio::test]
async fn test_concurrent_checkouts_respect_coupon_usage_limit() {
    let h = Harness::new().await;
    h.app
        .coupons()
        .create_coupon(Coupon::percentage("SAVE10", 10).with_usage_limit(2))
        .await
        .unwrap();

    let users: Vec<UserId> = (0..8).map(|_| UserId::new()).collect();
    for user in &users {
        h.fill_cart(*user, &[("SKU-001", 1)]).await;
    }

    let results = join_all(
        users
            .iter()
            .map(|user| h.checkout(*user, with_coupon("SAVE10"))),
    )
    .await;

    let orders: Vec<&OrderDetails> = results.iter().map(|r| r.as_ref().unwrap()).collect();
    let discounted = orders
        .iter()
        .filter(|details| details.order.discount_amount.is_positive())
        .count();
    assert_eq!(orders.len(), 8);
    assert_eq!(discounted, 2);
    assert_eq!(
        h.app.coupons().get_coupon("SAVE10").await.unwrap().unwrap().used_count,
        2
    );
    for details in &orders {
        let usage = h
            .app
            .coupons()
            .usage_for_order(details.order.id)
            .await
            .unwrap();
        assert_eq!(usage.is_some(), details.order.discount_amount.is_positive());
    }
}

#[tokio::test]
async fn test_coupon_worth_nothing_records_no_use() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.app
        .upsert_product(&Product::new("SKU-005", h.merchant, "Sticker", Money::new(5)))
        .await
        .unwrap();
    h.app
        .stock()
        .set_stock(&ProductId::new("SKU-005"), 10, 0)
        .await
        .unwrap();
    h.app
        .coupons()
        .create_coupon(Coupon::percentage("SAVE10", 10))
        .await
        .unwrap();
    h.fill_cart(user, &[("SKU-005", 1)]).await;

    let details = h.checkout(user, with_coupon("SAVE10")).await.unwrap();

    assert_eq!(details.order.discount_amount, Money::zero());
    assert!(details.order.coupon_code.is_none());
    assert!(
        h.app
            .coupons()
            .usage_for_order(details.order.id)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(
        h.app.coupons().get_coupon("SAVE10").await.unwrap().unwrap().used_count,
        0
    );
}

#[tokio::test]
async fn test_checkout_takes_only_the_merchants_lines() {
    let h = Harness::new().await;
    let user = UserId::new();
    let other = MerchantId::new();
    h.app
        .upsert_product(&Product::new("SKU-900", other, "Lamp", Money::new(40_000)))
        .await
        .unwrap();
    h.app
        .stock()
        .set_stock(&ProductId::new("SKU-900"), 4, 0)
        .await
        .unwrap();
    h.fill_cart(user, &[("SKU-001", 1), ("SKU-900", 2)]).await;

    let details = h.checkout(user, NewOrder::default()).await.unwrap();

    assert_eq!(details.items.len(), 1);
    assert_eq!(details.items[0].product_id, ProductId::new("SKU-001"));
    assert_eq!(details.order.subtotal, Money::new(100_000));
    assert_eq!(h.quantity("SKU-900").await, 4);

    let cart = h.app.carts().get_cart(user).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.quantity_of(&ProductId::new("SKU-900")), 2);
    assert_eq!(cart.subtotal, Money::new(80_000));

    let err = h.checkout(user, NewOrder::default()).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::EmptyCart));

    let details = h
        .app
        .orders()
        .create_from_cart(user, other, NewOrder::default())
        .await
        .unwrap();
    assert_eq!(details.order.merchant_id, other);
    assert_eq!(details.order.subtotal, Money::new(80_000));
    assert!(h.app.carts().get_cart(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_total_out_of_range_is_invalid() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.fill_cart(user, &[("SKU-001", 1)]).await;
    let before = h.app.store().row_counts().await;

    let err = h
        .checkout(
            user,
            NewOrder {
                shipping_cost: Money::MAX,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.app.store().row_counts().await, before);
    assert_eq!(h.quantity("SKU-001").await, 10);
    assert_eq!(h.app.carts().get_cart(user).await.unwrap().items.len(), 1);
}

#[tokio::test]
async fn test_order_numbers_increase_within_a_day() {
    let h = Harness::new().await;
    let first_user = UserId::new();
    let second_user = UserId::new();
    h.fill_cart(first_user, &[("SKU-001", 1)]).await;
    h.fill_cart(second_user, &[("SKU-002", 1)]).await;

    let first = h.checkout(first_user, NewOrder::default()).await.unwrap();
    let second = h.checkout(second_user, NewOrder::default()).await.unwrap();

    let prefix = numbering::order_number_prefix(first.order.created_at.date_naive());
    let first_seq = numbering::parse_sequence(&first.order.order_number, &prefix).unwrap();
    let second_seq = numbering::parse_sequence(&second.order.order_number, &prefix).unwrap();
    assert!(second_seq > first_seq);
}

#[tokio::test]
async fn test_cancel_reverses_checkout() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.app
        .coupons()
        .create_coupon(Coupon::percentage("SAVE10", 10))
        .await
        .unwrap();
    h.fill_cart(user, &[("SKU-001", 2), ("SKU-002", 1)]).await;

    let details = h.checkout(user, with_coupon("SAVE10")).await.unwrap();
    let order_id = details.order.id;
    assert_eq!(h.quantity("SKU-001").await, 8);
    assert_eq!(h.quantity("SKU-002").await, 4);

    let order = h
        .app
        .orders()
        .cancel(order_id, "changed my mind".to_string(), Some(user))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order.cancelled_at.is_some());
    assert_eq!(order.cancellation_reason.as_deref(), Some("changed my mind"));
    assert_eq!(h.quantity("SKU-001").await, 10);
    assert_eq!(h.quantity("SKU-002").await, 5);

    let coupon = h.app.coupons().get_coupon("SAVE10").await.unwrap().unwrap();
    assert_eq!(coupon.used_count, 0);
    assert!(h.app.coupons().usage_for_order(order_id).await.unwrap().is_none());

    let details = h.app.orders().get_order(order_id).await.unwrap();
    let invoice = details.invoice.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Cancelled);
    assert!(invoice.notes.unwrap().contains("Cancelled: changed my mind"));
    let statuses: Vec<_> = details.history.iter().map(|h| h.status).collect();
    assert_eq!(statuses, vec![OrderStatus::Pending, OrderStatus::Cancelled]);

    let kinds: Vec<_> = h
        .app
        .journal()
        .for_order(order_id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.kind)
        .collect();
    assert_eq!(kinds, vec![TransactionKind::Order, TransactionKind::OrderRefund]);

    let err = h
        .app
        .orders()
        .cancel(order_id, "again".to_string(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BusinessRule);
    assert_eq!(h.quantity("SKU-001").await, 10);
}

#[tokio::test]
async fn test_full_lifecycle_and_late_cancel() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.fill_cart(user, &[("SKU-001", 1)]).await;
    let order_id = h.checkout(user, with_shipping(10_000)).await.unwrap().order.id;

    let payment = h
        .app
        .payments()
        .create_payment(order_id, PaymentMethod::BankTransfer)
        .await
        .unwrap();
    assert_eq!(payment.amount, Money::new(120_000));
    h.app
        .payments()
        .mark_as_completed(payment.id, Some("GW-1".to_string()))
        .await
        .unwrap();

    let orders = h.app.orders();
    assert_eq!(
        orders.get_order(order_id).await.unwrap().order.status,
        OrderStatus::Confirmed
    );
    orders.start_processing(order_id, None).await.unwrap();
    let shipped = orders
        .ship(order_id, Some("TRACK-1".to_string()), None)
        .await
        .unwrap();
    assert_eq!(shipped.tracking_number.as_deref(), Some("TRACK-1"));
    orders.deliver(order_id, None).await.unwrap();

    let err = orders
        .cancel(order_id, "too late".to_string(), Some(user))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BusinessRule);
    assert_eq!(h.quantity("SKU-001").await, 9);

    let completed = orders.complete(order_id, None).await.unwrap();
    assert!(completed.completed_at.is_some());

    let details = orders.get_order(order_id).await.unwrap();
    let statuses: Vec<_> = details.history.iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn test_illegal_transition_is_rejected() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.fill_cart(user, &[("SKU-001", 1)]).await;
    let order_id = h.checkout(user, NewOrder::default()).await.unwrap().order.id;

    let err = h.app.orders().ship(order_id, None, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BusinessRule);

    let details = h.app.orders().get_order(order_id).await.unwrap();
    assert_eq!(details.order.status, OrderStatus::Pending);
    assert_eq!(details.history.len(), 1);
}

#[tokio::test]
async fn test_payment_completion_confirms_and_sends_invoice() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.fill_cart(user, &[("SKU-001", 1)]).await;
    let order_id = h.checkout(user, NewOrder::default()).await.unwrap().order.id;

    let payment = h
        .app
        .payments()
        .create_payment(order_id, PaymentMethod::CreditCard)
        .await
        .unwrap();
    let err = h
        .app
        .payments()
        .create_payment(order_id, PaymentMethod::CreditCard)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::DuplicatePayment { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let completed = h
        .app
        .payments()
        .mark_as_completed(payment.id, None)
        .await
        .unwrap();
    assert_eq!(completed.status, PaymentStatus::Completed);
    assert!(completed.paid_at.is_some());

    let details = h.app.orders().get_order(order_id).await.unwrap();
    assert_eq!(details.order.status, OrderStatus::Confirmed);
    assert_eq!(details.order.payment_status, OrderPaymentStatus::Paid);
    assert_eq!(details.invoice.unwrap().status, InvoiceStatus::Sent);
    assert_eq!(details.payment.unwrap().id, payment.id);

    let entries = h.app.journal().for_user(user).await.unwrap();
    assert!(
        entries
            .iter()
            .any(|e| e.kind == TransactionKind::Deposit && e.payment_id == Some(payment.id))
    );
}

#[tokio::test]
async fn test_refund_defaults_to_full_amount() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.fill_cart(user, &[("SKU-002", 2)]).await;
    let order_id = h.checkout(user, NewOrder::default()).await.unwrap().order.id;

    let payments = h.app.payments();
    let payment = payments
        .create_payment(order_id, PaymentMethod::EWallet)
        .await
        .unwrap();
    payments.mark_as_completed(payment.id, None).await.unwrap();

    let refunded = payments
        .refund(payment.id, None, "damaged".to_string())
        .await
        .unwrap();

    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(refunded.refunded_amount, Some(payment.amount));
    let order = h.app.orders().get_order(order_id).await.unwrap().order;
    assert_eq!(order.payment_status, OrderPaymentStatus::Refunded);

    let refund = h
        .app
        .journal()
        .for_order(order_id)
        .await
        .unwrap()
        .into_iter()
        .find(|e| e.kind == TransactionKind::OrderRefund)
        .unwrap();
    assert_eq!(refund.amount, payment.amount);
    assert_eq!(refund.payment_id, Some(payment.id));
}

#[tokio::test]
async fn test_refund_above_amount_fails() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.fill_cart(user, &[("SKU-002", 1)]).await;
    let order_id = h.checkout(user, NewOrder::default()).await.unwrap().order.id;

    let payments = h.app.payments();
    let payment = payments
        .create_payment(order_id, PaymentMethod::EWallet)
        .await
        .unwrap();
    payments.mark_as_completed(payment.id, None).await.unwrap();

    let too_much = Money::new(payment.amount.amount() + 1);
    let err = payments
        .refund(payment.id, Some(too_much), "oops".to_string())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BusinessRule);
    let stored = payments.get_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Completed);
    assert!(stored.refunded_amount.is_none());
}

#[tokio::test]
async fn test_failed_payment_leaves_order_pending() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.fill_cart(user, &[("SKU-002", 1)]).await;
    let order_id = h.checkout(user, NewOrder::default()).await.unwrap().order.id;

    let payments = h.app.payments();
    let payment = payments
        .create_payment(order_id, PaymentMethod::CreditCard)
        .await
        .unwrap();
    let failed = payments
        .mark_as_failed(payment.id, "card declined".to_string())
        .await
        .unwrap();

    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
    let order = h.app.orders().get_order(order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, OrderPaymentStatus::Failed);
}

#[tokio::test]
async fn test_cancelled_order_rejects_payment() {
    let h = Harness::new().await;
    let user = UserId::new();
    h.fill_cart(user, &[("SKU-001", 1)]).await;
    let order_id = h.checkout(user, NewOrder::default()).await.unwrap().order.id;
    h.app
        .orders()
        .cancel(order_id, "no longer needed".to_string(), Some(user))
        .await
        .unwrap();

    let err = h
        .app
        .payments()
        .create_payment(order_id, PaymentMethod::BankTransfer)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::OrderCancelled { .. }));
    assert!(h.app.payments().payment_for_order(order_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_orders_and_merchant_stats() {
    let h = Harness::new().await;
    let user = UserId::new();
    let mut placed = Vec::new();
    for _ in 0..3 {
        h.fill_cart(user, &[("SKU-002", 1)]).await;
        placed.push(h.checkout(user, NewOrder::default()).await.unwrap().order);
    }
    h.app
        .orders()
        .cancel(placed[0].id, "duplicate".to_string(), Some(user))
        .await
        .unwrap();

    let page = h
        .app
        .orders()
        .list_orders(OrderFilter::User(user), PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].id, placed[2].id);

    let other = h
        .app
        .orders()
        .list_orders(OrderFilter::User(UserId::new()), PageRequest::new(1, 20))
        .await
        .unwrap();
    assert!(other.items.is_empty());

    let stats = h.app.orders().merchant_stats(h.merchant).await.unwrap();
    assert_eq!(stats.total_orders, 3);
    assert_eq!(stats.orders_by_status["pending"], 2);
    assert_eq!(stats.orders_by_status["cancelled"], 1);
    // 25_000 + 2_500 tax per live order
    assert_eq!(stats.gross_revenue, Money::new(55_000));
    assert_eq!(stats.average_order_value, Money::new(27_500));
    assert_eq!(stats.items_sold, 2);
}

#[tokio::test]
async fn test_missing_order_is_not_found() {
    let h = Harness::new().await;
    let err = h
        .app
        .orders()
        .get_order(common::OrderId::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
