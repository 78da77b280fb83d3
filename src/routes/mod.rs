use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod health;
pub mod todos;

pub use health::health;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let todo_router = Router::new()
        .route("/", get(todos::routes::list).post(todos::routes::create))
        .route(
            "/{id}",
            get(todos::routes::get)
                .put(todos::routes::update)
                .delete(todos::routes::delete),
        );

    Router::new().nest(
        "/api/v1",
        Router::new()
            .route("/health", get(health))
            .nest("/todos", todo_router),
    )
}

/// The full service: routes, state and the HTTP layers.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
