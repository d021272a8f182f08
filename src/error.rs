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

use thiserror::Error;

/// Error kinds callers must be able to distinguish programmatically.
///
/// Most failure paths carry an `eyre` report; the variants here are the
/// ones with dedicated handling (stage aborts, distinct exit behavior) and
/// can be recovered from a report via `downcast_ref`.
#[derive(Debug, Error)]
pub enum TxGenError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("rpc transport failure: {0}")]
    Transport(String),

    #[error("node rejected transaction: {0}")]
    Rejected(String),

    /// The master account cannot cover even the cheapest unfunded
    /// sub-account. Fatal to the Distribute stage.
    #[error("master account cannot fund any sub-accounts")]
    InsufficientMasterFunds,

    #[error("timed out waiting for funding confirmations")]
    FundingTimeout,

    /// Signing failures indicate a configuration error, not a transient
    /// condition; they abort the whole build.
    #[error("signing failed for transaction {index}: {reason}")]
    Signing { index: usize, reason: String },
}
