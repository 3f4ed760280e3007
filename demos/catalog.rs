//! In-memory movie catalog wired through the response cache.
//!
//! ```text
//! MARQUEE_CACHE_ADMIN_SECRET=admin123 RUST_LOG=marquee=debug cargo run --example catalog
//!
//! curl -i localhost:8080/movies                      # X-Cache: MISS
//! curl -i localhost:8080/movies                      # X-Cache: HIT
//! curl -X POST localhost:8080/movies/create -d '{"title":"Heat","categoryId":1}'
//! curl -i localhost:8080/movies                      # MISS again, includes Heat
//! curl 'localhost:8080/cache-stats?secret=admin123'
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use marquee::cache::{Cache, CacheConfig};
use marquee::context::Context;
use marquee::middleware::{LoggerMiddleware, from_middleware};
use marquee::{Response, Router, Server, StatusCode};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize)]
struct Movie {
    id: u64,
    title: String,
    category_id: u64,
}

#[derive(Debug, Clone, Serialize)]
struct Category {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovieInput {
    title: String,
    category_id: u64,
}

#[derive(Debug, Deserialize)]
struct CategoryInput {
    name: String,
}

#[derive(Default)]
struct Catalog {
    movies: Vec<Movie>,
    categories: Vec<Category>,
    next_id: u64,
}

type Db = Arc<Mutex<Catalog>>;

fn lock(db: &Db) -> std::sync::MutexGuard<'_, Catalog> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

fn seed() -> Db {
    let mut catalog = Catalog::default();
    for name in ["Drama", "Comedy", "Sci-Fi"] {
        catalog.next_id += 1;
        catalog.categories.push(Category {
            id: catalog.next_id,
            name: name.into(),
        });
    }
    for (title, category_id) in [("Alien", 3), ("Amélie", 2), ("Heat", 1)] {
        catalog.next_id += 1;
        catalog.movies.push(Movie {
            id: catalog.next_id,
            title: title.into(),
            category_id,
        });
    }
    Arc::new(Mutex::new(catalog))
}

fn id_param(ctx: &Context, name: &str) -> Option<u64> {
    ctx.params().get(name)?.parse().ok()
}

fn not_found(what: &str) -> Response {
    Response::json(
        StatusCode::NotFound,
        &serde_json::json!({ "error": format!("{what} not found") }),
    )
}

fn bad_request(e: serde_json::Error) -> Response {
    Response::json(
        StatusCode::BadRequest,
        &serde_json::json!({ "error": e.to_string() }),
    )
}

fn routes(cache: &Cache, db: Db) -> Router {
    let mut router = Router::new();
    router.layer(from_middleware(Arc::new(LoggerMiddleware)));

    let d = db.clone();
    router.get_with("/movies", [cache.layer(Some(120))], move |_ctx: Context| {
        let db = d.clone();
        async move { Response::json(StatusCode::Ok, &lock(&db).movies) }
    });

    let d = db.clone();
    router.get_with(
        "/movies/category/:categoryId",
        [cache.layer(Some(120))],
        move |ctx: Context| {
            let db = d.clone();
            async move {
                let Some(category_id) = id_param(&ctx, "categoryId") else {
                    return not_found("category");
                };
                let movies: Vec<Movie> = lock(&db)
                    .movies
                    .iter()
                    .filter(|m| m.category_id == category_id)
                    .cloned()
                    .collect();
                Response::json(StatusCode::Ok, &movies)
            }
        },
    );

    let d = db.clone();
    router.get_with("/movies/:movieId", [cache.layer(Some(300))], move |ctx: Context| {
        let db = d.clone();
        async move {
            let id = id_param(&ctx, "movieId");
            match lock(&db).movies.iter().find(|m| Some(m.id) == id) {
                Some(movie) => Response::json(StatusCode::Ok, movie),
                None => not_found("movie"),
            }
        }
    });

    let d = db.clone();
    router.post_with(
        "/movies/create",
        [cache.invalidate_on_write(["/movies"])],
        move |ctx: Context| {
            let db = d.clone();
            async move {
                let input: MovieInput = match ctx.json() {
                    Ok(input) => input,
                    Err(e) => return bad_request(e),
                };
                let mut catalog = lock(&db);
                catalog.next_id += 1;
                let movie = Movie {
                    id: catalog.next_id,
                    title: input.title,
                    category_id: input.category_id,
                };
                catalog.movies.push(movie.clone());
                Response::json(StatusCode::Created, &movie)
            }
        },
    );

    let d = db.clone();
    router.put_with(
        "/movies/:movieId/edit",
        [cache.invalidate_on_write(["/movies", "/movies/:movieId"])],
        move |ctx: Context| {
            let db = d.clone();
            async move {
                let input: MovieInput = match ctx.json() {
                    Ok(input) => input,
                    Err(e) => return bad_request(e),
                };
                let id = id_param(&ctx, "movieId");
                let mut catalog = lock(&db);
                match catalog.movies.iter_mut().find(|m| Some(m.id) == id) {
                    Some(movie) => {
                        movie.title = input.title;
                        movie.category_id = input.category_id;
                        Response::json(StatusCode::Ok, movie)
                    }
                    None => not_found("movie"),
                }
            }
        },
    );

    let d = db.clone();
    router.delete_with(
        "/movies/delete/:movieId",
        [cache.invalidate_on_write(["/movies", "/movies/:movieId"])],
        move |ctx: Context| {
            let db = d.clone();
            async move {
                let id = id_param(&ctx, "movieId");
                let mut catalog = lock(&db);
                let before = catalog.movies.len();
                catalog.movies.retain(|m| Some(m.id) != id);
                if catalog.movies.len() == before {
                    not_found("movie")
                } else {
                    Response::new(StatusCode::NoContent)
                }
            }
        },
    );

    let d = db.clone();
    router.get_with("/categories", [cache.layer(Some(300))], move |_ctx: Context| {
        let db = d.clone();
        async move { Response::json(StatusCode::Ok, &lock(&db).categories) }
    });

    let d = db.clone();
    router.post_with(
        "/categories/create",
        [cache.invalidate_on_write(["/categories"])],
        move |ctx: Context| {
            let db = d.clone();
            async move {
                let input: CategoryInput = match ctx.json() {
                    Ok(input) => input,
                    Err(e) => return bad_request(e),
                };
                let mut catalog = lock(&db);
                catalog.next_id += 1;
                let category = Category {
                    id: catalog.next_id,
                    name: input.name,
                };
                catalog.categories.push(category.clone());
                Response::json(StatusCode::Created, &category)
            }
        },
    );

    router.get("/server-info", |_ctx: Context| async {
        Response::json(
            StatusCode::Ok,
            &serde_json::json!({ "server": "marquee", "version": env!("CARGO_PKG_VERSION") }),
        )
    });

    cache.admin().register(&mut router);
    router
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marquee=info")),
        )
        .init();

    let cache = Cache::start(CacheConfig::from_env()?)?;
    let router = routes(&cache, seed());

    let server = Server::bind("127.0.0.1:8080").await?;
    server
        .serve(router, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    cache.shutdown().await;
    Ok(())
}
