pub mod deployment;
pub mod schema;
