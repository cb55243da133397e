//! poolroute is a load-balancing reverse proxy.
//!
//! Each request is dispatched by host to a pool router. A router builds
//! its pool lazily: the first request reads the pool's targets and
//! load-balancing algorithm from a hierarchical config store, and every
//! request is then forwarded to one target chosen by the pool's host
//! selector. Failures become well-formed `500` / `502` responses.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, inspect, health).
//! - [`config`] -- The [`ConfigStore`](config::ConfigStore) trait, its
//!   file, memory and Redis implementations, and pool reads.
//! - [`balance`] -- Host selection strategies and the per-pool registry.
//! - [`pool`] -- Targets, backend sets, and the lazy pool router.
//! - [`proxy`] -- Host dispatch, upstream forwarding, header handling, and
//!   protocol upgrades.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler with per-pool status.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML store file support _(enabled by default)_ |
//! | `json` | JSON store file support |
//! | `toml` | TOML store file support |
//! | `redis` | Redis config store |
//! | `file-backends` | All file format stores |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod balance;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod pool;
pub mod proxy;
pub mod server;
