//! Configuration validation.
//!
//! Validates all config fields before a commit or run. The first problem
//! found is returned.

use crate::domain::config::SimConfig;
use crate::domain::error::SimError;
use crate::domain::execution::ExecutionPolicy;
use crate::domain::risk::RiskLimits;

pub fn validate_config(config: &SimConfig) -> Result<(), SimError> {
    validate_initial_cash(config)?;
    validate_risk(&config.risk)?;
    validate_execution(&config.execution)?;
    config.strategy.compile()?;
    Ok(())
}

fn validate_initial_cash(config: &SimConfig) -> Result<(), SimError> {
    if !(config.initial_cash.is_finite() && config.initial_cash > 0.0) {
        return Err(SimError::invalid(
            "initial_cash",
            "initial_cash must be positive",
        ));
    }
    Ok(())
}

pub fn validate_risk(risk: &RiskLimits) -> Result<(), SimError> {
    let limits = [
        ("risk.max_position", risk.max_position),
        ("risk.max_notional", risk.max_notional),
        ("risk.daily_loss_limit", risk.daily_loss_limit),
        ("risk.per_trade_loss_limit", risk.per_trade_loss_limit),
    ];
    for (key, value) in limits {
        if value.is_nan() || value < 0.0 {
            return Err(SimError::invalid(key, format!("{} must be non-negative", key)));
        }
    }
    if !(0.0..=1.0).contains(&risk.max_drawdown) {
        return Err(SimError::invalid(
            "risk.max_drawdown",
            "max_drawdown must be between 0 and 1",
        ));
    }
    Ok(())
}

pub fn validate_execution(execution: &ExecutionPolicy) -> Result<(), SimError> {
    for (key, value) in [
        ("execution.fee_bps", execution.fee_bps),
        ("execution.slip_bps", execution.slip_bps),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(SimError::invalid(key, format!("{} must be non-negative", key)));
        }
    }
    if execution.twap.slices < 1 {
        return Err(SimError::invalid(
            "execution.twap.slices",
            "slices must be at least 1",
        ));
    }
    if execution.twap.duration_ms < 0 {
        return Err(SimError::invalid(
            "execution.twap.duration_ms",
            "duration_ms must be non-negative",
        ));
    }
    if execution.vwap.window < 1 {
        return Err(SimError::invalid(
            "execution.vwap.window",
            "window must be at least 1",
        ));
    }
    if !(0.0..=1.0).contains(&execution.pov.participation) {
        return Err(SimError::invalid(
            "execution.pov.participation",
            "participation must be between 0 and 1",
        ));
    }
    if execution.iceberg.child_size.is_nan() || execution.iceberg.child_size < 1.0 {
        return Err(SimError::invalid(
            "execution.iceberg.child_size",
            "child_size must be at least 1",
        ));
    }
    if execution.enabled_modes() > 1 {
        return Err(SimError::invalid(
            "execution",
            "at most one slicing mode may be enabled",
        ));
    }
    Ok(())
}
