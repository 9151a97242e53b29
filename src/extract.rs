use std::convert::Infallible;

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request, rejection::QueryRejection},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{error::AppError, ledger::LedgerError, models::OperationalTimeQuery};

/// JSON body that falls back to `T::default()` when the body is missing,
/// malformed or of the wrong shape.
///
/// Handlers then report the missing fields with their own message instead of
/// the extractor's plain-text rejection.
#[derive(Debug, Clone, Default)]
pub struct JsonOrDefault<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrDefault<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                debug!(
                    status = %rejection.status(),
                    reason = %rejection.body_text(),
                    "request body ignored"
                );
                Ok(Self(T::default()))
            }
        }
    }
}

/// `from`/`to` query for the operational-time report; any query string that
/// does not deserialize is an invalid window.
#[derive(Debug, Clone, Default)]
pub struct WindowQuery(pub OperationalTimeQuery);

impl<S> FromRequestParts<S> for WindowQuery
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<OperationalTimeQuery>::from_request_parts(parts, state).await?;
        Ok(Self(query))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        debug!(reason = %rejection.body_text(), "query string rejected");
        LedgerError::InvalidWindow.into()
    }
}
