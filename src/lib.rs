//! Carousel - Account-Pool Trade Automation Engine
//!
//! Automates repeated buy/sell activity across a fixed pool of funded
//! accounts against a liquidity venue, with trade taxation, balance
//! equalization, multi-phase value extraction and a conditional
//! auto-extraction monitor.
//!
//! # Modules
//!
//! - `domain`: Core state and vocabulary (AccountPool, TaxEngine, trades, errors)
//! - `ports`: Trait abstractions (LedgerClient, PriceFeed) and the in-memory sim
//! - `engine`: Application layer (schedulers, equalizer, extraction, monitor)
//! - `config`: Configuration loading and validation
//! - `cli`: Command definitions and handlers

pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod ports;
