use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::{JsonOrDefault, WindowQuery},
    models::{
        AuthResponse, CreateItemRequest, ItemEnvelope, ItemList, ItemView, LoginRequest,
        NewUser, OkResponse, OperationalTimeReport, PublicUser, RegisterRequest,
    },
    state::AppState,
    store::StoreError,
};

pub async fn healthcheck() -> Json<OkResponse> {
    Json(OkResponse::ok())
}

pub async fn register(
    State(state): State<AppState>,
    JsonOrDefault(payload): JsonOrDefault<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let (Some(name), Some(username), Some(password)) = (
        non_blank(payload.name.as_deref()),
        non_blank(payload.username.as_deref()),
        payload.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::validation("Name, username and password required"));
    };

    if state.users.find_user_by_username(username).await?.is_some() {
        return Err(AppError::conflict("Username already exists"));
    }

    let password_hash = state.hasher.hash(password).await?;
    let user = state
        .users
        .insert_user(NewUser {
            username: username.to_string(),
            password_hash,
            name: name.to_string(),
        })
        .await
        .map_err(|err| match err {
            StoreError::Duplicate(_) => AppError::conflict("Username already exists"),
            other => other.into(),
        })?;

    let token = state.sessions.issue(user.id).await;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: PublicUser::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    JsonOrDefault(payload): JsonOrDefault<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (Some(username), Some(password)) =
        (payload.username.as_deref(), payload.password.as_deref())
    else {
        return Err(AppError::InvalidCredentials);
    };

    let user = state
        .users
        .find_user_by_username(username.trim())
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !state.hasher.verify(password, &user.password_hash).await? {
        return Err(AppError::InvalidCredentials);
    }

    let token = state.sessions.issue(user.id).await;
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> Json<OkResponse> {
    state.sessions.revoke(&auth.token).await;
    Json(OkResponse::ok())
}

pub async fn list_items(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<ItemList>> {
    let items = state.items.list_items(auth.user_id).await?;
    Ok(Json(ItemList {
        items: items.into_iter().map(ItemView::from).collect(),
    }))
}

pub async fn create_item(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonOrDefault(payload): JsonOrDefault<CreateItemRequest>,
) -> AppResult<(StatusCode, Json<ItemEnvelope>)> {
    let text = non_blank(payload.text.as_deref())
        .ok_or_else(|| AppError::validation("Text required"))?;

    let item = state.items.insert_item(auth.user_id, text.to_string()).await?;
    Ok((
        StatusCode::CREATED,
        Json(ItemEnvelope { item: item.into() }),
    ))
}

/// Always answers `ok`; ids that are unknown, foreign or malformed are left alone.
pub async fn delete_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    if let Ok(item_id) = Uuid::parse_str(&id) {
        state.items.delete_item(auth.user_id, item_id).await?;
    }
    Ok(Json(OkResponse::ok()))
}

pub async fn operational_time(
    State(state): State<AppState>,
    WindowQuery(query): WindowQuery,
) -> AppResult<Json<OperationalTimeReport>> {
    let report = state.ledger.operational_time(&query).await?;
    Ok(Json(report))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
