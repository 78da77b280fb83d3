use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Result, Sqlite, SqlitePool};

use super::dto::{CreateTodo, UpdateTodo};
use super::model::Todo;

/// Conditions for `list_todos`; every `Some` narrows the result.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TodoFilter {
    pub completed: Option<bool>,
    pub due_before: Option<DateTime<Utc>>,
}

pub async fn create_todo(pool: &SqlitePool, new: CreateTodo) -> Result<Todo> {
    let now = Utc::now();

    let rec = sqlx::query_as::<_, Todo>(
        r#"
        INSERT INTO todos (title, description, completed, deadline_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id, title, description, completed, deadline_at, created_at, updated_at
        "#,
    )
    .bind(new.title)
    .bind(new.description)
    .bind(new.completed)
    .bind(new.deadline_at)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(rec)
}

pub async fn list_todos(pool: &SqlitePool, filter: &TodoFilter) -> Result<Vec<Todo>> {
    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT id, title, description, completed, deadline_at, created_at, updated_at FROM todos WHERE 1 = 1",
    );

    if let Some(completed) = filter.completed {
        query.push(" AND completed = ").push_bind(completed);
    }

    // julianday() normalises offsets and fractional seconds before comparing
    if let Some(bound) = filter.due_before {
        query
            .push(" AND deadline_at IS NOT NULL AND julianday(deadline_at) <= julianday(")
            .push_bind(bound)
            .push(")");
    }

    query.push(" ORDER BY id");

    let rec = query.build_query_as::<Todo>().fetch_all(pool).await?;

    Ok(rec)
}

pub async fn get_todo(pool: &SqlitePool, id: i64) -> Result<Option<Todo>> {
    let rec = sqlx::query_as::<_, Todo>(
        r#"
        SELECT id, title, description, completed, deadline_at, created_at, updated_at
        FROM todos
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(rec)
}

/// Reads, merges and writes back inside one transaction. `None` when the id
/// does not exist; the transaction is rolled back on drop.
pub async fn update_todo(pool: &SqlitePool, id: i64, patch: UpdateTodo) -> Result<Option<Todo>> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, Todo>(
        r#"
        SELECT id, title, description, completed, deadline_at, created_at, updated_at
        FROM todos
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(mut todo) = current else {
        return Ok(None);
    };

    patch.apply(&mut todo);
    todo.updated_at = Utc::now();

    let rec = sqlx::query_as::<_, Todo>(
        r#"
        UPDATE todos
        SET
            title = ?,
            description = ?,
            completed = ?,
            deadline_at = ?,
            updated_at = ?
        WHERE id = ?
        RETURNING id, title, description, completed, deadline_at, created_at, updated_at
        "#,
    )
    .bind(&todo.title)
    .bind(&todo.description)
    .bind(todo.completed)
    .bind(todo.deadline_at)
    .bind(todo.updated_at)
    .bind(todo.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Some(rec))
}

/// Removes the row and hands back its last state, or `None` if it was never there.
pub async fn delete_todo(pool: &SqlitePool, id: i64) -> Result<Option<Todo>> {
    let rec = sqlx::query_as::<_, Todo>(
        r#"
        DELETE FROM todos
        WHERE id = ?
        RETURNING id, title, description, completed, deadline_at, created_at, updated_at
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(rec)
}
