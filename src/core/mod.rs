pub mod config;
pub mod conversation;
pub mod history;
pub mod message;
pub mod reduce;
pub mod telemetry;
pub mod turn;
