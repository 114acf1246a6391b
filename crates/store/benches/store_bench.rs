use chrono::Utc;
use common::{MerchantId, Money, OrderId, PageRequest, ProductId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{NewOrder, Order, OrderItem, OrderTotals, Stock};
use store::{InMemoryStore, OrderFilter, Store, StoreTx};

fn make_order(sequence: u32, user_id: UserId, merchant_id: MerchantId) -> Order {
    let totals = OrderTotals::compute(Money::new(50_000), Money::zero(), Money::zero()).unwrap();
    Order::place(
        format!("ORD-20260101{sequence:06}"),
        user_id,
        merchant_id,
        NewOrder::default(),
        totals,
        Utc::now(),
    )
    .unwrap()
}

fn make_item(order_id: OrderId) -> OrderItem {
    OrderItem {
        id: common::EntryId::new(),
        order_id,
        product_id: ProductId::new("SKU-001"),
        product_name: "Widget".to_string(),
        quantity: 2,
        unit_price: Money::new(25_000),
        total_price: Money::new(50_000),
    }
}

fn bench_stock_deduct_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let sku = ProductId::new("SKU-001");

    rt.block_on(async {
        let mut tx = store.begin().await.unwrap();
        tx.insert_stock(&Stock::new(sku.clone(), u32::MAX, 0))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    });

    c.bench_function("store/stock_deduct_commit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut tx = store.begin().await.unwrap();
                let mut stock = tx.lock_stock(&sku).await.unwrap().unwrap();
                stock.deduct(1, Utc::now()).unwrap();
                tx.update_stock(&stock).await.unwrap();
                tx.commit().await.unwrap();
            });
        });
    });
}

fn bench_insert_order_with_items(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let user_id = UserId::new();
    let merchant_id = MerchantId::new();

    c.bench_function("store/insert_order_with_items", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStore::new();
                let order = make_order(1, user_id, merchant_id);
                let mut tx = store.begin().await.unwrap();
                tx.insert_order(&order).await.unwrap();
                tx.insert_order_items(&[make_item(order.id)]).await.unwrap();
                tx.commit().await.unwrap();
            });
        });
    });
}

fn bench_list_orders(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let user_id = UserId::new();
    let merchant_id = MerchantId::new();

    // Pre-populate with 500 orders
    rt.block_on(async {
        let mut tx = store.begin().await.unwrap();
        for sequence in 1..=500 {
            tx.insert_order(&make_order(sequence, user_id, merchant_id))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
    });

    c.bench_function("store/list_orders_page_of_20", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .list_orders(OrderFilter::User(user_id), PageRequest::new(3, 20))
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_stock_deduct_commit,
    bench_insert_order_with_items,
    bench_list_orders,
);
criterion_main!(benches);
