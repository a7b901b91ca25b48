//! 配置校验模块
//!
//! 校验规则：
//! - endpoint (若存在) 的 scheme 为 http/https/ws/wss
//! - publish_destination / topic_override 非空
//! - 0 < max_path <= MAX_PATH_LIMIT, stale_after_ms > 0
//! - vehicle id 非空且唯一
//! - reconnect: multiplier >= 1, initial_delay_ms <= max_delay_ms, max_attempts > 0
//!
//! 缺少 endpoint 只产生警告，不视为错误。

use std::collections::HashSet;

use contracts::{ContractError, TrackingBlueprint, MAX_PATH_LIMIT};

const ENDPOINT_SCHEMES: [&str; 4] = ["http://", "https://", "ws://", "wss://"];

/// 校验 TrackingBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &TrackingBlueprint) -> Result<(), ContractError> {
    validate_broker(blueprint)?;
    validate_stream(blueprint)?;
    validate_vehicle_ids(blueprint)?;
    Ok(())
}

/// 收集非致命问题
pub fn collect_warnings(blueprint: &TrackingBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    if blueprint.broker.endpoint().is_none() {
        warnings.push("broker.endpoint is not set; the connector will stay disabled".to_string());
    }
    if blueprint.stream.topic_override.is_some() && blueprint.vehicles.len() > 1 {
        warnings.push(
            "stream.topic_override is ignored when tracking several vehicles".to_string(),
        );
    }
    if blueprint.stream.request_on_connect && blueprint.vehicles.is_empty() {
        warnings.push("stream.request_on_connect has no effect without vehicles".to_string());
    }
    warnings
}

fn validate_broker(blueprint: &TrackingBlueprint) -> Result<(), ContractError> {
    let broker = &blueprint.broker;

    if let Some(endpoint) = broker.endpoint() {
        let lower = endpoint.to_ascii_lowercase();
        if !ENDPOINT_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            return Err(ContractError::config_validation(
                "broker.endpoint",
                format!("unsupported scheme in '{endpoint}', expected http(s):// or ws(s)://"),
            ));
        }
    }

    if broker.publish_destination.trim().is_empty() {
        return Err(ContractError::config_validation(
            "broker.publish_destination",
            "publish_destination cannot be empty",
        ));
    }

    if let Some(policy) = &broker.reconnect {
        if policy.multiplier.is_nan() || policy.multiplier < 1.0 {
            return Err(ContractError::config_validation(
                "broker.reconnect.multiplier",
                format!("multiplier must be >= 1, got {}", policy.multiplier),
            ));
        }
        if policy.initial_delay_ms > policy.max_delay_ms {
            return Err(ContractError::config_validation(
                "broker.reconnect.initial_delay_ms / broker.reconnect.max_delay_ms",
                format!(
                    "initial_delay_ms ({}) must be <= max_delay_ms ({})",
                    policy.initial_delay_ms, policy.max_delay_ms
                ),
            ));
        }
        if policy.max_attempts == 0 {
            return Err(ContractError::config_validation(
                "broker.reconnect.max_attempts",
                "max_attempts must be > 0",
            ));
        }
    }
    Ok(())
}

fn validate_stream(blueprint: &TrackingBlueprint) -> Result<(), ContractError> {
    let stream = &blueprint.stream;

    if stream.max_path == 0 {
        return Err(ContractError::config_validation(
            "stream.max_path",
            "max_path must be > 0",
        ));
    }
    if stream.max_path > MAX_PATH_LIMIT {
        return Err(ContractError::config_validation(
            "stream.max_path",
            format!(
                "max_path ({}) must be <= {}",
                stream.max_path, MAX_PATH_LIMIT
            ),
        ));
    }
    if stream.stale_after_ms == 0 {
        return Err(ContractError::config_validation(
            "stream.stale_after_ms",
            "stale_after_ms must be > 0",
        ));
    }
    if stream
        .topic_override
        .as_deref()
        .is_some_and(|topic| topic.trim().is_empty())
    {
        return Err(ContractError::config_validation(
            "stream.topic_override",
            "topic_override cannot be empty",
        ));
    }
    Ok(())
}

/// 校验 vehicle id 非空且唯一
fn validate_vehicle_ids(blueprint: &TrackingBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, id) in blueprint.vehicles.iter().enumerate() {
        if id.as_str().trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("vehicles[{idx}]"),
                "vehicle id cannot be empty",
            ));
        }
        if !seen.insert(id) {
            return Err(ContractError::config_validation(
                format!("vehicles[id={id}]"),
                "duplicate vehicle id",
            ));
        }
    }
    Ok(())
}
