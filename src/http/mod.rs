//! HTTP surface: service routes under `/app`, SQL routes under `/api`

pub mod api;
pub mod error;
pub mod middleware;
pub mod routes;

pub use error::AppError;
pub use routes::build_router;
