//! Core domain types and logic.

pub mod audit;
pub mod bar;
pub mod config;
pub mod config_validation;
pub mod control_plane;
pub mod error;
pub mod execution;
pub mod indicator;
pub mod ledger;
pub mod metrics;
pub mod rbac;
pub mod registry;
pub mod risk;
pub mod rule;
pub mod rule_eval;
pub mod rule_parser;
pub mod simulation;
pub mod strategy;
