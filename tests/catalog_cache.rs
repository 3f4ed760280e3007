//! End-to-end behaviour of the response cache through a [`Router`]:
//! cached reads, write-then-read consistency, and the admin endpoints.

use std::sync::{Arc, Mutex};

use marquee::cache::{CACHE_HEADER, Cache, CacheConfig};
use marquee::context::Context;
use marquee::{Method, Request, Response, Router, StatusCode};
use serde_json::{Value, json};

type Titles = Arc<Mutex<Vec<String>>>;

fn config() -> CacheConfig {
    CacheConfig {
        admin_secret: Some("admin123".into()),
        ..CacheConfig::default()
    }
}

fn catalog(cache: &Cache, titles: Titles) -> Router {
    let mut router = Router::new();

    let t = titles.clone();
    router.get_with("/movies", [cache.layer(Some(120))], move |_ctx: Context| {
        let titles = t.clone();
        async move { Response::json(StatusCode::Ok, &*titles.lock().unwrap()) }
    });

    let t = titles.clone();
    router.get_with("/movies/:movieId", [cache.layer(Some(300))], move |ctx: Context| {
        let titles = t.clone();
        async move {
            let idx: usize = ctx.params().get("movieId").unwrap().parse().unwrap();
            match titles.lock().unwrap().get(idx) {
                Some(title) => Response::json(StatusCode::Ok, &json!({ "title": title })),
                None => Response::new(StatusCode::NotFound),
            }
        }
    });

    let t = titles.clone();
    router.post_with(
        "/movies/create",
        [cache.invalidate_on_write(["/movies"])],
        move |ctx: Context| {
            let titles = t.clone();
            async move {
                let body: Value = match ctx.json() {
                    Ok(body) => body,
                    Err(_) => return Response::new(StatusCode::BadRequest),
                };
                titles.lock().unwrap().push(body["title"].as_str().unwrap_or("").to_string());
                Response::new(StatusCode::Created)
            }
        },
    );

    let t = titles;
    router.put_with(
        "/movies/:movieId/edit",
        [cache.invalidate_on_write(["/movies", "/movies/:movieId"])],
        move |ctx: Context| {
            let titles = t.clone();
            async move {
                let idx: usize = ctx.params().get("movieId").unwrap().parse().unwrap();
                let body: Value = ctx.json().unwrap();
                match titles.lock().unwrap().get_mut(idx) {
                    Some(title) => {
                        *title = body["title"].as_str().unwrap_or("").to_string();
                        Response::new(StatusCode::Ok)
                    }
                    None => Response::new(StatusCode::NotFound),
                }
            }
        },
    );

    cache.admin().register(&mut router);
    router
}

fn seeded() -> Titles {
    Arc::new(Mutex::new(vec!["Alien".into(), "Heat".into()]))
}

async fn get(router: &Router, url: &str) -> Response {
    router.route(Request::new(Method::Get, url)).await
}

async fn send(router: &Router, method: Method, url: &str, body: Value) -> Response {
    let request = Request::new(method, url)
        .with_header("Content-Type", "application/json")
        .with_body(body.to_string());
    router.route(request).await
}

fn x_cache(res: &Response) -> &str {
    res.headers().get(CACHE_HEADER).unwrap_or("")
}

fn body(res: &Response) -> Value {
    serde_json::from_slice(res.content()).unwrap()
}

#[tokio::test]
async fn repeated_read_is_served_from_cache() {
    let cache = Cache::start(config()).unwrap();
    let router = catalog(&cache, seeded());

    let first = get(&router, "/movies").await;
    let second = get(&router, "/movies").await;

    assert_eq!(x_cache(&first), "MISS");
    assert_eq!(x_cache(&second), "HIT");
    assert_eq!(first.content(), second.content());
    assert_eq!(second.headers().get("Content-Type"), Some("application/json"));

    cache.shutdown().await;
}

#[tokio::test]
async fn create_is_visible_on_next_read() {
    let cache = Cache::start(config()).unwrap();
    let router = catalog(&cache, seeded());

    get(&router, "/movies").await;
    assert_eq!(x_cache(&get(&router, "/movies").await), "HIT");

    let created = send(&router, Method::Post, "/movies/create", json!({ "title": "Ran" })).await;
    assert_eq!(created.status(), StatusCode::Created);

    let after = get(&router, "/movies").await;
    assert_eq!(x_cache(&after), "MISS");
    assert_eq!(body(&after), json!(["Alien", "Heat", "Ran"]));

    cache.shutdown().await;
}

#[tokio::test]
async fn edit_invalidates_list_and_item() {
    let cache = Cache::start(config()).unwrap();
    let router = catalog(&cache, seeded());

    get(&router, "/movies").await;
    get(&router, "/movies/1").await;
    get(&router, "/movies/0").await;
    assert_eq!(cache.store().len(), 3);

    let edited = send(&router, Method::Put, "/movies/1/edit", json!({ "title": "Heat (1995)" })).await;
    assert_eq!(edited.status(), StatusCode::Ok);

    // "/movies" is a substring of every key, so the whole family goes.
    assert!(cache.store().is_empty());

    let item = get(&router, "/movies/1").await;
    assert_eq!(x_cache(&item), "MISS");
    assert_eq!(body(&item), json!({ "title": "Heat (1995)" }));

    cache.shutdown().await;
}

#[tokio::test]
async fn failed_write_keeps_cache() {
    let cache = Cache::start(config()).unwrap();
    let router = catalog(&cache, seeded());

    get(&router, "/movies").await;
    let res = send(&router, Method::Put, "/movies/9/edit", json!({ "title": "Nope" })).await;
    assert_eq!(res.status(), StatusCode::NotFound);

    assert_eq!(x_cache(&get(&router, "/movies").await), "HIT");
    cache.shutdown().await;
}

#[tokio::test]
async fn not_found_is_never_cached() {
    let cache = Cache::start(config()).unwrap();
    let router = catalog(&cache, seeded());

    let first = get(&router, "/movies/7").await;
    let second = get(&router, "/movies/7").await;

    assert_eq!(first.status(), StatusCode::NotFound);
    assert_eq!(x_cache(&second), "MISS");
    assert!(cache.store().is_empty());

    cache.shutdown().await;
}

#[tokio::test]
async fn query_strings_are_part_of_the_key() {
    let cache = Cache::start(config()).unwrap();
    let router = catalog(&cache, seeded());

    get(&router, "/movies?page=1").await;
    let other = get(&router, "/movies?page=2").await;
    assert_eq!(x_cache(&other), "MISS");
    assert_eq!(cache.store().len(), 2);

    cache.shutdown().await;
}

#[tokio::test]
async fn admin_reports_and_clears() {
    let cache = Cache::start(config()).unwrap();
    let router = catalog(&cache, seeded());

    get(&router, "/movies").await;
    get(&router, "/movies").await;

    let forbidden = get(&router, "/cache-stats").await;
    assert_eq!(forbidden.status(), StatusCode::Forbidden);

    let stats = body(&get(&router, "/cache-stats?secret=admin123").await);
    assert_eq!(stats["keys"], json!(["/movies"]));
    assert_eq!(stats["stats"]["hits"], 1);
    assert_eq!(stats["items"]["/movies"]["value"], r#"["Alien","Heat"]"#);

    let cleared = send(
        &router,
        Method::Post,
        "/clear-cache?secret=admin123",
        json!({ "pattern": "/movies" }),
    )
    .await;
    assert_eq!(body(&cleared)["removed"], 1);
    assert_eq!(x_cache(&get(&router, "/movies").await), "MISS");

    cache.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_the_sweep() {
    let cache = Cache::start(config()).unwrap();
    assert!(cache.is_sweeping());

    cache.shutdown().await;
    assert!(!cache.is_sweeping());
    cache.shutdown().await;
}
