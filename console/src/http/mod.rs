pub mod api;
pub mod applications;
pub mod client;
pub mod deployments;
pub mod schema;
