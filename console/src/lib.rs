//! Stevedore Console Library
//!
//! Core modules for the stevedore deployment console: the schema-driven
//! configuration form, the deployment session lifecycle, and the clients
//! for the records and deploy services.

pub mod app;
pub mod authn;
pub mod errors;
pub mod filesys;
pub mod form;
pub mod http;
pub mod logs;
pub mod models;
pub mod session;
pub mod storage;
pub mod utils;
pub mod workers;
