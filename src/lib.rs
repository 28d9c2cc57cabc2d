//! Parley is a full-screen terminal chat client for remote model-serving
//! endpoints.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation log, the streaming reduction pipeline
//!   that folds partial-message fragments into complete messages, and the
//!   persistence and telemetry collaborators invoked after each exchange.
//! - [`api`] defines the wire payloads for the three serving protocols and
//!   the HTTP client that issues streaming and non-streaming queries.
//! - [`ui`] renders the terminal interface and runs the interactive event
//!   loop that drives user input and display updates.
//!
//! The binary entrypoint (`src/main.rs`) parses the command line, resolves
//! configuration, and hands control to [`ui::chat_loop`].

pub mod api;
pub mod core;
pub mod ui;
