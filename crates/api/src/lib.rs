//! HTTP API server for the marketplace fulfillment engine.
//!
//! Exposes carts, checkout, order transitions, payments, invoices and
//! merchant statistics as JSON over axum, with structured logging (tracing)
//! and Prometheus metrics. The caller is identified by the `x-user-id`
//! header, which an upstream gateway is trusted to set.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use fulfillment::Fulfillment;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub fulfillment: Fulfillment<S>,
}

/// Wraps a store in the services and shared state.
pub fn create_state<S: Store>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState {
        fulfillment: Fulfillment::new(store),
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    use routes::{cart, catalog, invoices, merchants, orders, payments};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/cart", get(cart::get::<S>).delete(cart::clear::<S>))
        .route("/cart/items", post(cart::add_item::<S>))
        .route(
            "/cart/items/{product_id}",
            put(cart::update_item::<S>).delete(cart::remove_item::<S>),
        )
        .route("/orders", post(orders::create::<S>).get(orders::list::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/confirm", post(orders::confirm::<S>))
        .route("/orders/{id}/process", post(orders::process::<S>))
        .route("/orders/{id}/ship", post(orders::ship::<S>))
        .route("/orders/{id}/deliver", post(orders::deliver::<S>))
        .route("/orders/{id}/complete", post(orders::complete::<S>))
        .route("/orders/{id}/refund", post(orders::refund::<S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route("/orders/{id}/payment", post(payments::create::<S>))
        .route(
            "/orders/{id}/transactions",
            get(invoices::order_transactions::<S>),
        )
        .route("/payments/{id}", get(payments::get::<S>))
        .route("/payments/{id}/complete", post(payments::complete::<S>))
        .route("/payments/{id}/fail", post(payments::fail::<S>))
        .route("/payments/{id}/refund", post(payments::refund::<S>))
        .route("/invoices/{id}", get(invoices::get::<S>))
        .route("/invoices/{id}/send", post(invoices::send::<S>))
        .route("/invoices/{id}/pay", post(invoices::pay::<S>))
        .route("/invoices/{id}/overdue", post(invoices::overdue::<S>))
        .route("/invoices/{id}/cancel", post(invoices::cancel::<S>))
        .route("/transactions", get(invoices::my_transactions::<S>))
        .route("/merchants/{id}/stats", get(merchants::stats::<S>))
        .route("/products/{id}", put(catalog::upsert_product::<S>))
        .route(
            "/products/{id}/stock",
            get(catalog::get_stock::<S>).put(catalog::set_stock::<S>),
        )
        .route(
            "/products/{id}/stock/adjustments",
            post(catalog::adjust_stock::<S>),
        )
        .route(
            "/products/{id}/stock/history",
            get(catalog::stock_history::<S>),
        )
        .route("/stock/low", get(catalog::low_stock::<S>))
        .route("/coupons", post(catalog::create_coupon::<S>))
        .route("/coupons/{code}", get(catalog::get_coupon::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
