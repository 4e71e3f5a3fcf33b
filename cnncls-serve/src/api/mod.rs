//! HTTP API handlers for cnncls-serve

pub mod health;
pub mod predict;
pub mod train;

pub use health::health_routes;
pub use predict::predict_routes;
pub use train::train_routes;
