//! Restaurant ordering backend.
//!
//! A small CRUD API over SQLite: menu browsing, per-customer carts, order
//! placement, and staff administration, with three permission tiers
//! (anonymous/customer, manager, delivery crew).
//!
//! # Request flow
//!
//! Request → bearer-token resolution ([`auth::CurrentUser`], roles loaded
//! once) → handler permission check → sqlx query → JSON response. Each
//! request is handled end-to-end with no background work; concurrent
//! requests are isolated only by SQLite's transaction semantics, so
//! same-user races (double add-to-cart, double placement) are ordinary
//! lost-update races and stay that way.
//!
//! # Roles
//!
//! Roles are group memberships: `"Manager"` and `"Delivery crew"`. Reads of
//! the catalog are open to everyone; catalog writes and group management
//! are manager-only; carts and orders require authentication and are scoped
//! by role inside the handlers.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{delete, get, post, put},
    Router,
};

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod auth;
pub mod cart;
pub mod config;
pub mod database;
pub mod error;
pub mod groups;
pub mod menu;
pub mod models;
pub mod orders;
pub mod query;
pub mod state;
pub mod users;

#[cfg(test)]
mod testutil;

use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/users", post(users::register))
        .route("/users/me", get(users::me))
        .route("/token", post(users::issue_token))
        .route(
            "/categories",
            get(menu::list_categories).post(menu::create_category),
        )
        .route(
            "/menu-items",
            get(menu::list_menu_items).post(menu::create_menu_item),
        )
        .route(
            "/menu-items/{id}",
            get(menu::get_menu_item)
                .put(menu::replace_menu_item)
                .patch(menu::patch_menu_item)
                .delete(menu::delete_menu_item),
        )
        .route(
            "/groups/manager/users",
            get(groups::list_managers).post(groups::add_manager),
        )
        .route("/groups/manager/users/{id}", delete(groups::remove_manager))
        .route(
            "/groups/delivery-crew/users",
            get(groups::list_delivery_crew).post(groups::add_delivery_crew),
        )
        .route(
            "/groups/delivery-crew/users/{id}",
            delete(groups::remove_delivery_crew),
        )
        .route(
            "/cart/menu-items",
            get(cart::list_cart)
                .post(cart::add_to_cart)
                .delete(cart::clear_cart),
        )
        .route("/cart/menu-items/{id}", put(cart::update_cart_item))
        .route(
            "/orders",
            get(orders::list_orders).post(orders::place_order),
        )
        .route(
            "/orders/{id}",
            get(orders::get_order)
                .put(orders::replace_order)
                .patch(orders::patch_order)
                .delete(orders::delete_order),
        )
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");
    let app = app(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
