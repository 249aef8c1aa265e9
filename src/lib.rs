//! HomeLedger - a tamper-evident audit ledger for home-automation agents
//!
//! Every automated action (alarm triggers, music commands, data fetches,
//! routine completions and failures) is sealed into an append-only chain of
//! SHA-256 linked, proof-of-work mined blocks.
//!
//! # Architecture
//!
//! ## Core Ledger
//! - [`ledger`] - Blocks, sealing/mining, chain management and integrity rules
//! - [`persistence`] - JSON file, SQLite and in-memory storage backends
//!
//! ## Collaborator Surface
//! - [`audit`] - `record_action` / `is_intact` / `flush` facade and the
//!   `audited` action wrapper
//! - [`routine`] - Integrity-gated sequences of audited steps
//! - [`scheduler`] - Daily routine scheduler driven by an explicit `tick`
//!
//! ## Configuration & Utilities
//! - [`cli`] - Helpers shared by the binaries
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod ledger;
pub mod persistence;

// ============================================================================
// Collaborator Surface
// ============================================================================
pub mod audit;
pub mod routine;
pub mod scheduler;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod cli;
pub mod config;
pub mod error;

pub use audit::{audited, AuditLog, Audited, BlockRef};
pub use error::{LedgerError, Result};
pub use ledger::{Block, Ledger, Payload};
