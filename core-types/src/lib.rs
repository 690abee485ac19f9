// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared address types, numeric bridging, retry policy and configuration for the vault services.

pub mod address;
pub mod config;
pub mod numeric;
pub mod retry;

pub use address::{Address, AddressError, ContentAddress};
pub use config::{AppConfig, BalanceRefresh};
pub use numeric::{to_bounded, MAX_SAFE_INTEGER, MIN_SAFE_INTEGER};
pub use retry::RetryPolicy;
pub use primitive_types::U256;
