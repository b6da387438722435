//! Djax integrations: remote clients implementing the `djax_core::remote` traits.

pub mod axilent;

pub use axilent::AxilentClient;
