use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod service;

pub use service::ContactService;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::contact_routes())
        .merge(handlers::admin_routes())
}
