pub mod dto;
pub mod handlers;
pub mod repo;
mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use repo_types::{StatusCounts, Toy};

pub fn router(max_image_bytes: usize) -> Router<AppState> {
    handlers::toy_routes(max_image_bytes)
}
