// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite state store for the Outdial call engine.
//!
//! One single-writer connection (tokio-rusqlite) holds the job records
//! and the three queue indices. Every mutating operation is a single
//! transaction, which gives `pop_ready`, `promote_due`, and `update` their
//! atomicity guarantees; WAL plus `synchronous=FULL` gives durability.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStore;
pub use database::Database;
