use crate::state::AppState;
use axum::Router;

pub(crate) mod dto;
pub mod handlers;
pub(crate) mod repo;
mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::create_routes())
        .merge(handlers::account_routes())
}
