pub mod clock;
pub mod collaborator;
pub mod command;
pub mod config;
pub mod diff;
pub mod error;
pub mod event;
pub mod fact;
pub mod lifecycle;
pub mod lint;
pub mod proposal;
pub mod repository;
pub mod risk_engine;
pub mod rule_text;
pub mod store;
pub mod suggestion;
pub mod types;
