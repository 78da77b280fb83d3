use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::Span;

use super::dto::{CreateTodo, ListParams, UpdateTodo, CREATE_FIELDS, UPDATE_FIELDS};
use super::queries;
use crate::error::AppError;
use crate::state::AppState;

/// List todos, optionally narrowed by `completed` and `window`
#[tracing::instrument(skip_all)]
pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(params) = params?;
    let filter = params.into_filter(Utc::now())?;
    tracing::debug!(?filter, "listing todos");

    let todos = queries::list_todos(&state.db, &filter).await?;

    Ok(Json(todos))
}

/// Get a single todo by id
#[tracing::instrument(skip_all, fields(id = tracing::field::Empty))]
pub async fn get(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = id?;
    Span::current().record("id", id);

    match queries::get_todo(&state.db, id).await? {
        Some(todo) => Ok(Json(todo)),
        None => Err(AppError::NotFound),
    }
}

/// Create a todo from a JSON object
#[tracing::instrument(skip_all, fields(id = tracing::field::Empty))]
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = payload?;
    let new: CreateTodo = CREATE_FIELDS.parse(body)?;
    new.validate()?;

    let todo = queries::create_todo(&state.db, new).await?;
    Span::current().record("id", todo.id);
    tracing::info!("todo created");

    Ok((StatusCode::CREATED, Json(todo)))
}

/// Overwrite the fields present in the body; the rest are kept
#[tracing::instrument(skip_all, fields(id = tracing::field::Empty))]
pub async fn update(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = id?;
    Span::current().record("id", id);
    let Json(body) = payload?;

    // an unknown id wins over a bad body
    if queries::get_todo(&state.db, id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let patch: UpdateTodo = UPDATE_FIELDS.parse(body)?;
    patch.validate()?;

    match queries::update_todo(&state.db, id, patch).await? {
        Some(todo) => {
            tracing::info!("todo updated");
            Ok(Json(todo))
        }
        None => Err(AppError::NotFound),
    }
}

/// Delete a todo. Unknown ids succeed with `{}`.
#[tracing::instrument(skip_all, fields(id = tracing::field::Empty))]
pub async fn delete(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    Span::current().record("id", id);

    match queries::delete_todo(&state.db, id).await? {
        Some(todo) => {
            tracing::info!("todo deleted");
            Ok((StatusCode::OK, Json(todo)).into_response())
        }
        None => Ok((StatusCode::OK, Json(json!({}))).into_response()),
    }
}
