//! JSON API Example
//!
//! A small REST API over a [`MemoryStore`], answering with envelopes.
//!
//! Run with:
//! ```bash
//! cargo run --example json_api
//! ```
//!
//! Then test:
//! ```bash
//! # Create a user
//! curl -X POST http://localhost:3000/users \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Alice", "email": "alice@example.com"}'
//!
//! # Get, rename and delete it
//! curl http://localhost:3000/users/<id>
//! curl -X PATCH http://localhost:3000/users/<id> \
//!   -H "Content-Type: application/json" -d '{"name": "Alicia"}'
//! curl -X DELETE http://localhost:3000/users/<id>
//!
//! # Validation failure (422 envelope)
//! curl -X POST http://localhost:3000/users -d 'not json'
//! ```

use axum::extract::{Path, State};
use axum_envelope::{
    Config, Envelope, ErrorRecord, FluentRouter, MemoryStore, ParsedBody, Result,
    RouteDescriptor, Store, build_error, build_success,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct User {
    name: String,
    email: String,
}

#[derive(Deserialize)]
struct UserPatch {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Clone, Default)]
struct AppState {
    users: MemoryStore<User>,
}

type Reply = std::result::Result<Envelope, ErrorRecord>;

fn json_body<T>(body: &ParsedBody) -> std::result::Result<T, ErrorRecord>
where
    T: serde::de::DeserializeOwned,
{
    let value = body.as_json().cloned().ok_or_else(|| {
        build_error(json!({ "statusCode": 422, "message": "Expected a JSON body" }))
    })?;
    serde_json::from_value(value).map_err(|err| {
        build_error(json!({ "statusCode": 422, "message": err.to_string() }))
    })
}

fn no_such_user(id: &str) -> ErrorRecord {
    build_error(json!({ "statusCode": 404, "message": format!("No user with id {id}") }))
}

async fn create_user(State(state): State<AppState>, body: ParsedBody) -> Reply {
    let user: User = json_body(&body)?;
    let id = state.users.create(user.clone()).await.map_err(build_error)?;

    Ok(build_success(json!({
        "statusCode": 201,
        "message": "User created",
        "data": { "id": id, "user": user },
    })))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    match state.users.read(&id).await.map_err(build_error)? {
        Some(user) => Ok(build_success(json!({ "data": user }))),
        None => Err(no_such_user(&id)),
    }
}

async fn patch_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: ParsedBody,
) -> Reply {
    let patch: UserPatch = json_body(&body)?;
    let Some(mut user) = state.users.read(&id).await.map_err(build_error)? else {
        return Err(no_such_user(&id));
    };

    if let Some(name) = patch.name {
        user.name = name;
    }
    if let Some(email) = patch.email {
        user.email = email;
    }
    state
        .users
        .update(&id, user.clone())
        .await
        .map_err(build_error)?;

    Ok(build_success(json!({ "message": "User updated", "data": user })))
}

async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    match state.users.delete(&id).await.map_err(build_error)? {
        Some(_) => Ok(build_success("User deleted")),
        None => Err(no_such_user(&id)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config: Config = r#"
[http]
bind_addr = "127.0.0.1"
bind_port = 3000
max_payload_size_bytes = "16KiB"

[logging]
format = "json"
"#
    .parse()?;

    config.setup_tracing();

    FluentRouter::<AppState>::with_state(config, AppState::default())?
        .register(RouteDescriptor::post("create_user", "/users").handler(create_user))?
        .register(RouteDescriptor::get("get_user", "/users/:id").handler(get_user))?
        .register(RouteDescriptor::patch("patch_user", "/users/:id").handler(patch_user))?
        .register(RouteDescriptor::delete("delete_user", "/users/:id").handler(delete_user))?
        .setup_middleware()
        .await?
        .start()
        .await
}
