//! World-state management for the fare-transfer contract.
//!
//! The crate is split into small pieces that the host chaincode shim wires
//! together:
//!
//! * [`codec`] — canonical record encoding so every endorsing peer writes the
//!   same bytes (and therefore the same hash) for the same logical record.
//! * [`records`] — the closed set of record variants and their schema checks.
//! * [`ledger`] — the world-state handle the host supplies per transaction,
//!   an in-memory implementation, and the state root.
//! * [`catalog`] — the read-only transit catalog used for enrollment checks.
//! * [`contracts`] — the contract operations themselves.
//!
//! Consensus, endorsement, identity and deployment stay with the host
//! platform.

pub mod catalog;
pub mod codec;
pub mod config;
pub mod contracts;
pub mod ledger;
pub mod records;

mod error;

pub use catalog::TransitCatalog;
pub use contracts::{FareTransfer, ListedEntry, Listing};
pub use error::{ContractError, Result};
pub use ledger::{LedgerStub, MemoryLedger, StateIterator};
pub use records::{Asset, Customer, Record};
