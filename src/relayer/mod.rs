//! Transaction relayer: signed HTTP access to approve, buy and sell

pub mod auth;
mod client;

pub use client::RelayerClient;
