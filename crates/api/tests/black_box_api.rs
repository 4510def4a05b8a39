use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};

use commerce_api::app::{self, AppServices};
use commerce_api::config::AppConfig;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory backend, ephemeral port.
        let (router, services) = app::build_app(&AppConfig::default()).await.expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api/v1"),
            client: reqwest::Client::new(),
            services,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client.post(self.url(path)).json(&body).send().await.unwrap()
    }

    async fn patch(&self, path: &str, body: Value) -> reqwest::Response {
        self.client.patch(self.url(path)).json(&body).send().await.unwrap()
    }

    /// Read models are fed asynchronously; poll until the resource shows up.
    async fn get_eventually(&self, path: &str) -> Value {
        self.get_until(path, |_| true).await
    }

    async fn get_until(&self, path: &str, done: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..100 {
            let res = self.get(path).await;
            if res.status() == StatusCode::OK {
                let body: Value = res.json().await.unwrap();
                if done(&body) {
                    return body;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{path} did not reach the expected state within timeout");
    }

    /// Create a single-variant product with stock and wait until both are readable.
    async fn product_with_stock(&self, price: i64, quantity: i64) -> (String, String) {
        let res = self
            .client
            .post(self.url("/products"))
            .header("X-Seller-Id", "seller-1")
            .json(&json!({
                "name": "Linen Shirt",
                "brand": "Acme",
                "description": "breathable",
                "category_id": "tops",
                "price": price,
                "stock_quantity": quantity,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        let product_id = body["id"].as_str().unwrap().to_string();
        let sku = body["stocks"][0]["sku"].as_str().unwrap().to_string();

        self.get_eventually(&format!("/products/{product_id}")).await;
        self.get_until(&format!("/stocks/sku/{sku}"), |s| s["quantity"] == json!(quantity)).await;
        (product_id, sku)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
        self.services.shutdown();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn health_is_served_outside_the_versioned_prefix() {
    let srv = TestServer::spawn().await;
    let root = srv.base_url.trim_end_matches("/api/v1");
    let res = srv.client.get(format!("{root}/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn product_commands_require_a_seller() {
    let srv = TestServer::spawn().await;
    let res = srv
        .post(
            "/products",
            json!({ "name": "x", "brand": "y", "category_id": "c", "price": 100 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_ids_are_rejected() {
    let srv = TestServer::spawn().await;
    let res = srv.get("/products/not-an-id").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test(flavor = "multi_thread")]
async fn product_lifecycle_create_variants_and_search() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .post(srv.url("/products"))
        .header("X-Seller-Id", "seller-1")
        .json(&json!({
            "name": "Running Shoe",
            "brand": "Fleet",
            "description": "light",
            "category_id": "shoes",
            "price": 50_000,
            "variants": [
                { "options": { "size": "260" }, "stock_quantity": 3 },
                { "options": { "size": "270" }, "price": 55_000 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    let product_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["stocks"].as_array().unwrap().len(), 1);

    let product = srv.get_eventually(&format!("/products/{product_id}")).await;
    assert_eq!(product["name"], "Running Shoe");
    assert_eq!(product["variants"].as_array().unwrap().len(), 2);

    let res = srv
        .client
        .patch(srv.url(&format!("/products/{product_id}/price")))
        .header("X-Seller-Id", "someone-else")
        .json(&json!({ "price": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let hits = srv
        .get_until("/search/products?keyword=running&sort_field=price&sort_order=asc", |b| {
            b["total"] == json!(1)
        })
        .await;
    assert_eq!(hits["items"][0]["name"], "Running Shoe");

    let suggestions: Value = srv.get("/search/autocomplete?prefix=run").await.json().await.unwrap();
    assert!(suggestions.as_array().unwrap().iter().any(|s| s.as_str().unwrap().to_lowercase().starts_with("run")));
}

#[tokio::test(flavor = "multi_thread")]
async fn stock_cannot_go_negative() {
    let srv = TestServer::spawn().await;
    let res = srv.post("/stocks", json!({ "sku": "SKU-1", "quantity": 5 })).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let stock_id = res.json::<Value>().await.unwrap()["id"].as_str().unwrap().to_string();

    let res = srv.patch(&format!("/stocks/{stock_id}/decrease"), json!({ "quantity": 6 })).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = srv.patch(&format!("/stocks/{stock_id}/decrease"), json!({ "quantity": 2 })).await;
    assert_eq!(res.status(), StatusCode::OK);

    let view = srv
        .get_until(&format!("/stocks/{stock_id}"), |v| v["quantity"] == json!(3))
        .await;
    assert_eq!(view["sku"], "SKU-1");

    let quantity: Value = srv.get(&format!("/stocks/{stock_id}/quantity")).await.json().await.unwrap();
    assert_eq!(quantity["quantity"], 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn cart_checkout_and_payment_take_stock() {
    let srv = TestServer::spawn().await;
    let (product_id, sku) = srv.product_with_stock(12_000, 5).await;

    let res = srv.post("/carts", json!({ "customer_id": "cust-1" })).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let cart_id = res.json::<Value>().await.unwrap()["id"].as_str().unwrap().to_string();

    let res = srv
        .post(&format!("/carts/{cart_id}/items"), json!({ "product_id": product_id, "quantity": 6 }))
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.json::<Value>().await.unwrap()["error"], "CART_006");

    let res = srv
        .post(&format!("/carts/{cart_id}/items"), json!({ "product_id": product_id, "quantity": 2 }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let cart: Value = srv.get(&format!("/carts/{cart_id}")).await.json().await.unwrap();
    assert_eq!(cart["total_quantity"], 2);
    assert_eq!(cart["total"]["amount"], 24_000);
    assert_eq!(cart["expired"], false);

    let res = srv
        .post(&format!("/carts/{cart_id}/checkout"), json!({ "customer_id": "cust-1" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let order_id = res.json::<Value>().await.unwrap()["order_id"].as_str().unwrap().to_string();

    let res = srv
        .post(&format!("/carts/{cart_id}/checkout"), json!({ "customer_id": "cust-1" }))
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let order = srv.get_eventually(&format!("/orders/{order_id}")).await;
    assert_eq!(order["status"], "PENDING");

    let res = srv
        .patch(&format!("/orders/{order_id}/confirm-payment"), json!({ "payment_id": "pay-1" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap()["status"], "PAID");

    srv.get_until(&format!("/stocks/sku/{sku}"), |s| s["quantity"] == json!(3)).await;

    let res = srv.patch(&format!("/orders/{order_id}/cancel"), json!({ "reason": "changed mind" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap()["units_restored"], 2);
    srv.get_until(&format!("/stocks/sku/{sku}"), |s| s["quantity"] == json!(5)).await;

    let orders: Value = srv
        .get_until("/orders/customer/cust-1", |o| o[0]["status"] == json!("CANCELED"))
        .await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_payment_gives_the_cart_back() {
    let srv = TestServer::spawn().await;
    let (product_id, _) = srv.product_with_stock(1_000, 10).await;

    let cart_id = srv.post("/carts", json!({ "customer_id": "cust-2" })).await.json::<Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    srv.post(&format!("/carts/{cart_id}/items"), json!({ "product_id": product_id, "quantity": 1 }))
        .await;
    let order_id = srv
        .post(&format!("/carts/{cart_id}/checkout"), json!({ "customer_id": "cust-2" }))
        .await
        .json::<Value>()
        .await
        .unwrap()["order_id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = srv
        .patch(&format!("/orders/{order_id}/fail-payment"), json!({ "reason": "card declined" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let cart: Value = srv.get(&format!("/carts/{cart_id}")).await.json().await.unwrap();
    assert_eq!(cart["converted"], false);
    assert_eq!(cart["item_count"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn reviews_are_listed_per_variant_and_only_the_author_deletes() {
    let srv = TestServer::spawn().await;
    let (product_id, sku) = srv.product_with_stock(9_900, 1).await;

    let res = srv
        .client
        .post(srv.url("/reviews"))
        .header("X-User-Id", "user-1")
        .json(&json!({
            "product_id": product_id,
            "sku": sku,
            "title": "Great",
            "content": "fits well",
            "rating": 5,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let review_id = res.json::<Value>().await.unwrap()["id"].as_str().unwrap().to_string();

    let listing = srv
        .get_until(&format!("/reviews/{product_id}/{sku}?page=1&size=10"), |b| b["review_count"] == json!(1))
        .await;
    assert_eq!(listing["reviews"]["items"][0]["title"], "Great");

    let res = srv
        .client
        .delete(srv.url(&format!("/reviews/{review_id}")))
        .header("X-User-Id", "user-2")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .delete(srv.url(&format!("/reviews/{review_id}")))
        .header("X-User-Id", "user-1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    srv.get_until(&format!("/reviews/{product_id}/{sku}"), |b| b["review_count"] == json!(0)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn admin_can_page_through_a_stream() {
    let srv = TestServer::spawn().await;
    let stock_id = srv.post("/stocks", json!({ "sku": "SKU-A", "quantity": 1 })).await.json::<Value>().await.unwrap()
        ["id"]
        .as_str()
        .unwrap()
        .to_string();
    for _ in 0..3 {
        srv.patch(&format!("/stocks/{stock_id}/increase"), json!({ "quantity": 1 })).await;
    }

    let page: Value = srv
        .get(&format!("/admin/events/{stock_id}?limit=2&offset=0"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 4);
    assert_eq!(page["events"].as_array().unwrap().len(), 2);
    assert_eq!(page["has_more"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_products_are_no_longer_served() {
    let srv = TestServer::spawn().await;
    let (product_id, sku) = srv.product_with_stock(5_000, 2).await;

    for step in ["inactivate", ""] {
        let request = if step.is_empty() {
            srv.client.delete(srv.url(&format!("/products/{product_id}")))
        } else {
            srv.client.patch(srv.url(&format!("/products/{product_id}/{step}")))
        };
        let res = request.header("X-Seller-Id", "seller-1").send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "step {step:?}");
    }

    let mut status = StatusCode::OK;
    for _ in 0..100 {
        status = srv.get(&format!("/products/{product_id}")).await.status();
        if status == StatusCode::NOT_FOUND {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(srv.get(&format!("/products/variants/{sku}")).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn negative_initial_stock_is_rejected() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .post(srv.url("/products"))
        .header("X-Seller-Id", "seller-1")
        .json(&json!({
            "name": "Wool Scarf",
            "brand": "Acme",
            "category_id": "accessories",
            "price": 3_000,
            "stock_quantity": -5,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await.unwrap()["error"], "validation_error");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(srv.services.catalog().list().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn a_sku_is_registered_only_once() {
    let srv = TestServer::spawn().await;
    let res = srv.post("/stocks", json!({ "sku": "SKU-DUP", "quantity": 5 })).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let first = res.json::<Value>().await.unwrap()["id"].as_str().unwrap().to_string();

    let res = srv.post("/stocks", json!({ "sku": "SKU-DUP", "quantity": 9 })).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let view = srv.get_until("/stocks/sku/SKU-DUP", |v| v["quantity"] == json!(5)).await;
    assert_eq!(view["stock_id"], json!(first));
}

#[tokio::test(flavor = "multi_thread")]
async fn merging_moves_items_and_deletes_the_source() {
    let srv = TestServer::spawn().await;
    let (product_id, _) = srv.product_with_stock(2_000, 10).await;

    let mut carts = Vec::new();
    for customer in ["guest-1", "cust-3"] {
        let res = srv.post("/carts", json!({ "customer_id": customer })).await;
        carts.push(res.json::<Value>().await.unwrap()["id"].as_str().unwrap().to_string());
    }
    let (source, target) = (&carts[0], &carts[1]);
    let res = srv
        .post(&format!("/carts/{source}/items"), json!({ "product_id": product_id, "quantity": 2 }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv.post(&format!("/carts/{target}/merge"), json!({ "source_cart_id": source })).await;
    assert_eq!(res.status(), StatusCode::OK);

    let cart: Value = srv.get(&format!("/carts/{target}")).await.json().await.unwrap();
    assert_eq!(cart["total_quantity"], 2);
    assert_eq!(srv.get(&format!("/carts/{source}")).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn completed_orders_can_be_refunded() {
    let srv = TestServer::spawn().await;
    let (product_id, _) = srv.product_with_stock(7_000, 3).await;

    let cart_id = srv.post("/carts", json!({ "customer_id": "cust-4" })).await.json::<Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    srv.post(&format!("/carts/{cart_id}/items"), json!({ "product_id": product_id, "quantity": 1 }))
        .await;
    let order_id = srv
        .post(&format!("/carts/{cart_id}/checkout"), json!({ "customer_id": "cust-4" }))
        .await
        .json::<Value>()
        .await
        .unwrap()["order_id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = srv
        .patch(&format!("/orders/{order_id}/confirm-payment"), json!({ "payment_id": "pay-4" }))
        .await;
    assert_eq!(res.json::<Value>().await.unwrap()["status"], "PAID");

    let res = srv.patch(&format!("/orders/{order_id}/request-refund"), json!({ "reason": "too small" })).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    for (step, body) in [
        ("confirm-purchase", json!({})),
        ("request-refund", json!({ "reason": "too small" })),
        ("refund", json!({})),
    ] {
        let res = srv.patch(&format!("/orders/{order_id}/{step}"), body).await;
        assert_eq!(res.status(), StatusCode::OK, "step {step}");
    }

    srv.get_until(&format!("/orders/{order_id}"), |o| o["status"] == json!("REFUNDED")).await;
}
