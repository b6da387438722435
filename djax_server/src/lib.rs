#![forbid(unsafe_code)]

pub mod auth;
pub mod backends;
pub mod cli;
pub mod error;
pub mod models;
pub mod routes;
pub mod server;
