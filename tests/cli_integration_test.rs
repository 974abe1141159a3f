//! CLI integration tests.
//!
//! Tests cover:
//! - Argument parsing for each subcommand
//! - Backtest orchestration with real files on disk (CSV and JSON data)
//! - Module files layered over the config
//! - Report export and RBAC gating
//! - Plugin description and config loading errors

mod common;

use clap::Parser;
use common::*;
use serde_json::json;
use simtrader::cli::{self, Cli, Command, ModulePaths};
use simtrader::domain::config::SimConfig;
use simtrader::domain::error::SimError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn workspace() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let bars = make_bars(&[100.0, 101.0, 102.0, 99.0, 103.0], MINUTE);
    let data = write(dir.path(), "bars.csv", &bars_csv(&bars));
    (dir, data)
}

mod parsing {
    use super::*;

    #[test]
    fn backtest_defaults() {
        let cli = Cli::try_parse_from(["simtrader", "backtest", "--data", "bars.csv"]).unwrap();
        match cli.command {
            Command::Backtest {
                config, role, actor, ..
            } => {
                assert!(config.is_none());
                assert_eq!(role, "admin");
                assert_eq!(actor, "cli");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn backtest_requires_data() {
        assert!(Cli::try_parse_from(["simtrader", "backtest"]).is_err());
    }

    #[test]
    fn import_with_kind() {
        let cli =
            Cli::try_parse_from(["simtrader", "import", "-p", "x.json", "--kind", "risk"]).unwrap();
        assert!(matches!(cli.command, Command::Import { kind: Some(k), .. } if k == "risk"));
    }
}

mod backtest {
    use super::*;

    #[test]
    fn paper_profile_over_csv() {
        let (_dir, data) = workspace();
        let outcome =
            cli::run_backtest(None, &data, &ModulePaths::default(), None, "cli", "admin").unwrap();
        assert_eq!(outcome.summary.bars, 5);
        assert_eq!(
            outcome.summary.config_hash,
            SimConfig::paper().content_hash().unwrap()
        );
    }

    #[test]
    fn modules_and_export() {
        let (dir, data) = workspace();
        let strategy = write(
            dir.path(),
            "strategy.json",
            &json!({"type": "rule_chain", "rules": [{"if": "position == 0", "do": "BUY", "qty": 10}]})
                .to_string(),
        );
        let exec = write(
            dir.path(),
            "exec.json",
            &json!({"fee_bps": 0.0, "slip_bps": 0.0}).to_string(),
        );
        let out = dir.path().join("report");

        let modules = ModulePaths {
            strategy: Some(strategy),
            exec: Some(exec),
            risk: None,
        };
        let outcome =
            cli::run_backtest(None, &data, &modules, Some(&out), "cli", "admin").unwrap();
        assert_eq!(outcome.summary.fills, 1);
        assert_eq!(outcome.trace[0].position, 10.0);

        for file in ["audit.jsonl", "trace.jsonl", "summary.json"] {
            assert!(out.join(file).exists(), "missing {file}");
        }
        let trace = fs::read_to_string(out.join("trace.jsonl")).unwrap();
        assert_eq!(trace.lines().count(), 5);
    }

    #[test]
    fn risk_module_engages_kill_switch() {
        let (dir, data) = workspace();
        let strategy = write(
            dir.path(),
            "strategy.json",
            &json!({"type": "rule_chain", "rules": [{"if": "position == 0", "do": "BUY", "qty": 10}]})
                .to_string(),
        );
        let risk = write(dir.path(), "risk.json", &json!({"kill_switch": true}).to_string());

        let modules = ModulePaths {
            strategy: Some(strategy),
            exec: None,
            risk: Some(risk),
        };
        let outcome = cli::run_backtest(None, &data, &modules, None, "cli", "admin").unwrap();
        assert_eq!(outcome.summary.fills, 0);
        assert_eq!(outcome.audit.count("reject"), 5);
    }

    #[test]
    fn json_data_module() {
        let dir = tempfile::tempdir().unwrap();
        let data = write(
            dir.path(),
            "bars.json",
            &json!({
                "type": "json_schema",
                "data": [
                    {"ts": "2024-01-02", "open": 1, "high": 1, "low": 1, "close": 1},
                    {"ts": "2024-01-01", "open": 1, "high": 1, "low": 1, "close": 1}
                ]
            })
            .to_string(),
        );
        let outcome =
            cli::run_backtest(None, &data, &ModulePaths::default(), None, "cli", "ops").unwrap();
        assert_eq!(outcome.trace[0].ts, DAY0);
        assert_eq!(outcome.summary.bars, 2);
    }

    #[test]
    fn http_text_module_reads_relative_file() {
        let (dir, _) = workspace();
        let data = write(
            dir.path(),
            "remote.json",
            &json!({"type": "http_text", "url": "bars.csv"}).to_string(),
        );
        let outcome =
            cli::run_backtest(None, &data, &ModulePaths::default(), None, "cli", "admin").unwrap();
        assert_eq!(outcome.summary.bars, 5);
    }

    #[test]
    fn huge_window_parameter_never_trades() {
        let (dir, data) = workspace();
        let strategy = write(
            dir.path(),
            "strategy.json",
            &json!({
                "type": "rule_chain",
                "params": {"w": 1e30},
                "rules": [{"if": "rsi(close,w) > 50", "do": "BUY", "qty": 10}]
            })
            .to_string(),
        );
        let modules = ModulePaths {
            strategy: Some(strategy),
            exec: None,
            risk: None,
        };
        let outcome = cli::run_backtest(None, &data, &modules, None, "cli", "admin").unwrap();
        assert_eq!(outcome.summary.fills, 0);
        assert_eq!(outcome.summary.bars, 5);
    }

    #[test]
    fn viewer_cannot_run() {
        let (_dir, data) = workspace();
        let err = cli::run_backtest(None, &data, &ModulePaths::default(), None, "cli", "viewer")
            .unwrap_err();
        assert!(matches!(err, SimError::RbacDenied { .. }));
    }

    #[test]
    fn config_file_is_used() {
        let (dir, data) = workspace();
        let mut config = SimConfig::paper();
        config.initial_cash = 5_000.0;
        let path = write(dir.path(), "config.json", &config.to_json_pretty().unwrap());

        let outcome =
            cli::run_backtest(Some(&path), &data, &ModulePaths::default(), None, "cli", "admin")
                .unwrap();
        assert_eq!(outcome.summary.initial_cash, 5_000.0);
    }
}

mod config_files {
    use super::*;

    #[test]
    fn load_config_reports_path_on_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "broken.json", "{\"seed\": ");
        match cli::load_config(&path) {
            Err(SimError::ConfigParse { reason }) => assert!(reason.contains("broken.json")),
            other => panic!("expected ConfigParse, got {other:?}"),
        }
    }

    #[test]
    fn load_config_accepts_partial_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "partial.json", r#"{"initial_cash": 250.0}"#);
        let config = cli::load_config(&path).unwrap();
        assert_eq!(config.initial_cash, 250.0);
        assert_eq!(config.execution.slip_bps, 0.8);
    }
}

mod plugins {
    use super::*;

    #[test]
    fn describe_detects_kind_and_name() {
        let payload = json!({"name": "tight", "limits": {"max_position": 5.0}});
        let description = cli::describe_plugin(&payload, None).unwrap();
        assert_eq!(description, json!({"kind": "risk", "name": "tight"}));
    }

    #[test]
    fn describe_with_declared_kind_validates_payload() {
        let payload = json!({"twap": {"enabled": true}});
        assert!(cli::describe_plugin(&payload, Some("exec")).is_ok());
        assert!(cli::describe_plugin(&payload, Some("data")).is_err());
        assert!(cli::describe_plugin(&payload, Some("widget")).is_err());
    }

    #[test]
    fn describe_rejects_unknown_shape() {
        let err = cli::describe_plugin(&json!({"hello": 1}), None).unwrap_err();
        assert_eq!(err.reason_code(), "unknown_plugin_type");
    }
}
