//! Coordinated multi-wallet swap campaigns on Solana.
//!
//! The crate is the headless core of a swap-campaign tool: venue adapters
//! behind one [`dex::DexAdapter`] trait, a pre-signing safety validator,
//! batch swap execution, fund distribution between a custody wallet and
//! workers, and the Bundle / Volume / CopyTrade orchestrator. Embedders
//! supply an RPC connection plus storage and secret-encryption primitives
//! and drive everything through [`app::App`].

pub mod app;
pub mod bot;
pub mod config;
pub mod dex;
pub mod engine;
pub mod error;
pub mod funding;
pub mod monitor;
pub mod rpc;
pub mod types;
pub mod validator;
pub mod wallet;
