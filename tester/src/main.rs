//! Manual end-to-end driver against a running server.
//!
//! Start the backend with a seeded manager first:
//!
//! ```sh
//! BISTRO_ADMIN_USERNAME=admin BISTRO_ADMIN_PASSWORD=admin cargo run -p bistro
//! cargo run -p tester
//! ```

use std::env;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

const BASE: &str = "http://localhost:8000";

#[tokio::main]
async fn main() -> Result<()> {
    let client = Client::new();
    let run = std::process::id();

    let admin_user = env::var("BISTRO_ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let admin_pass = env::var("BISTRO_ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let admin = login(&client, &admin_user, &admin_pass)
        .await
        .context("Admin login failed; start the server with BISTRO_ADMIN_USERNAME/BISTRO_ADMIN_PASSWORD")?;

    let category = post(
        &client,
        "/categories",
        &admin,
        json!({"slug": format!("mains-{run}"), "title": "Mains"}),
    )
    .await?;
    println!("category: {category}");

    let item = post(
        &client,
        "/menu-items",
        &admin,
        json!({"title": "Lasagna", "price": 12.5, "category_id": category["id"]}),
    )
    .await?;
    println!("menu item: {item}");

    let crew_name = format!("crew-{run}");
    register(&client, &crew_name).await?;
    let member = post(
        &client,
        "/groups/delivery-crew/users",
        &admin,
        json!({"username": crew_name}),
    )
    .await?;
    println!("delivery crew: {member}");

    let customer_name = format!("customer-{run}");
    register(&client, &customer_name).await?;
    let customer = login(&client, &customer_name, "secret").await?;

    let row = post(
        &client,
        "/cart/menu-items",
        &customer,
        json!({"menuitem_id": item["id"], "quantity": 2}),
    )
    .await?;
    println!("cart row: {row}");

    let order = post(&client, "/orders", &customer, Value::Null).await?;
    println!("order: {order}");

    Ok(())
}

async fn register(client: &Client, username: &str) -> Result<()> {
    let response = client
        .post(format!("{BASE}/users"))
        .json(&json!({"username": username, "password": "secret"}))
        .send()
        .await?;

    if !response.status().is_success() {
        bail!("registration of {username} failed: {}", response.text().await?);
    }
    Ok(())
}

async fn login(client: &Client, username: &str, password: &str) -> Result<String> {
    let response = client
        .post(format!("{BASE}/token"))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await?;

    if !response.status().is_success() {
        bail!("login of {username} failed: {}", response.text().await?);
    }

    let body: Value = response.json().await?;
    Ok(body["token"]
        .as_str()
        .context("token missing from response")?
        .to_string())
}

async fn post(client: &Client, path: &str, token: &str, body: Value) -> Result<Value> {
    let mut request = client.post(format!("{BASE}{path}")).bearer_auth(token);
    if !body.is_null() {
        request = request.json(&body);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        bail!("POST {path} failed: {}", response.text().await?);
    }

    Ok(response.json().await?)
}
