//! chaincore - fork-aware block ingestion for a round-based blockchain node
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Blockchain
//! - [`blockchain`] - Block and header types, structural validation
//! - [`transaction`] - Transaction types and staging status
//! - [`ledger`] - Applying and reverting transaction effects
//!
//! ## Consensus
//! - [`consensus`] - The consensus manager: ingestion, approval, rollback
//! - [`bifurcation`] - Competing branch tracking near the tip
//! - [`block_store`] - Confirmed and pending block stores
//!
//! ## Cryptography
//! - [`crypto`] - Signatures and verification (secp256k1)
//!
//! ## State Management
//! - [`persistence`] - Stored height watermark (SQLite)
//! - [`cache`] - Transaction staging caches
//!
//! ## Networking & Integration
//! - [`sync`] - Missing parent requests
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod ledger;
pub mod transaction;

// ============================================================================
// Consensus
// ============================================================================
pub mod bifurcation;
pub mod block_store;
pub mod consensus;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod cache;
pub mod persistence;

// ============================================================================
// Networking
// ============================================================================
pub mod sync;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
