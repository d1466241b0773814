//! HTTP surface: router, health endpoint and the match upgrade route

pub mod routes;

pub use routes::build_router;
