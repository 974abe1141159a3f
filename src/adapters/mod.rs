//! Concrete adapter implementations for ports.

pub mod file_text_adapter;
pub mod jsonl_report_adapter;
