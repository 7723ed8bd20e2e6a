//! Exxacta Pipeline API Library
//!
//! Core functionality for the Exxacta lead pipeline backend: the canonical
//! status vocabulary and normalizer, the interaction log, the status
//! transition engine, the kanban view model, the realtime synchronization
//! bridge, and the n8n automation webhook handlers.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models.
//! - `notify`: Outbound n8n notifications.
//! - `pipeline`: Kanban view model (normalize, search, filter, group).
//! - `realtime`: Change-feed synchronization bridge.
//! - `status`: Status vocabulary and normalizer.
//! - `store`: Persistence layer.
//! - `transitions`: Status transition engine.
//! - `webhook_handler`: n8n automation webhook handlers.
//! - `webhook_models`: Automation webhook payload models.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod realtime;
pub mod status;
pub mod store;
pub mod transitions;
pub mod webhook_handler;
pub mod webhook_models;
