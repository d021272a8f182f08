// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Load generator for StableNet EVM chains.
//!
//! The engine derives a fan-out of sub-accounts from a master key, funds
//! them, builds signed transaction sets (including the StableNet
//! fee-delegation type `0x16`), dispatches them through batched or
//! rate-limited JSON-RPC, and correlates receipts and block observations
//! into a throughput/latency report.

#![allow(clippy::too_many_arguments)]

pub mod analyzer;
pub mod batcher;
pub mod builder;
pub mod cli;
pub mod client;
pub mod collector;
pub mod config;
pub mod distributor;
pub mod error;
pub mod gas;
pub mod longsender;
pub mod metrics;
pub mod nonce;
pub mod pipeline;
pub mod prelude;
pub mod report;
pub mod streamer;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testutil;
