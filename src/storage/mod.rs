//! Ledger storage for stepledger.
//!
//! The traits define the abstract interface; `memory` and `persistent`
//! provide the backends.

pub mod memory;
#[cfg(feature = "persistent")]
pub mod persistent;
mod traits;

pub use traits::{
    AppliedVersion, LedgerProvider, LedgerScope, StorageError, StrategyLedger, VersionLedger,
};
