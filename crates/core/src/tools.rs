//! Tool-call surface.
//!
//! Requests are `{"tool": name, "arguments": {...}}`; every response is a JSON
//! value, and every failure is a structured `{"error": {code, message}}` rather
//! than a process error.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::aggregator::SourceOutcome;
use crate::error::ServiceError;
use crate::service::SolShield;

/// Names of every tool, in listing order.
pub const TOOL_NAMES: [&str; 6] = [
    "check_health_factor",
    "get_position_risk",
    "list_positions",
    "simulate_rebalance",
    "execute_rebalance",
    "set_alert_threshold",
];

/// A raw tool request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// A parsed tool invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    CheckHealthFactor {
        wallet: String,
        #[serde(default)]
        protocol: Option<String>,
    },
    GetPositionRisk {
        wallet: String,
        protocol: String,
    },
    ListPositions {
        wallet: String,
    },
    SimulateRebalance {
        wallet: String,
        protocol: String,
        action: String,
        amount_usd: f64,
    },
    ExecuteRebalance {
        wallet: String,
        protocol: String,
        action: String,
        amount_usd: f64,
        #[serde(default)]
        confirm: bool,
    },
    SetAlertThreshold {
        wallet: String,
        #[serde(default)]
        warning_threshold: Option<f64>,
        #[serde(default)]
        critical_threshold: Option<f64>,
    },
}

impl ToolCall {
    /// Parse a request, distinguishing unknown tools from bad arguments.
    pub fn parse(request: ToolRequest) -> Result<Self, Value> {
        if !TOOL_NAMES.contains(&request.tool.as_str()) {
            return Err(error_response(
                "unknown_tool",
                &format!("unknown tool: {}", request.tool),
            ));
        }
        let arguments = match request.arguments {
            Value::Null => json!({}),
            other => other,
        };
        serde_json::from_value(json!({"tool": request.tool, "arguments": arguments}))
            .map_err(|e| error_response("invalid_arguments", &e.to_string()))
    }
}

/// Structured error payload.
pub fn error_response(code: &str, message: &str) -> Value {
    json!({"error": {"code": code, "message": message}})
}

fn service_error(err: ServiceError) -> Value {
    warn!(code = err.code(), error = %err, "Tool call failed");
    error_response(err.code(), &err.to_string())
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value)
        .unwrap_or_else(|e| error_response("serialization_failed", &e.to_string()))
}

/// Empty result for a wallet holding nothing on a protocol.
fn no_position(wallet: &str, protocol: &str) -> Value {
    json!({
        "wallet": wallet,
        "protocol": protocol,
        "position": null,
        "status": "no_position_found",
        "message": format!("No positions found for {wallet} on {protocol}"),
    })
}

/// Serialize outcomes, attaching the wallet's alert level to each position.
fn health_report(service: &SolShield, outcomes: &[SourceOutcome]) -> Value {
    Value::Array(
        outcomes
            .iter()
            .map(|outcome| {
                let mut value = to_value(outcome);
                if let (Some(position), Value::Object(map)) = (outcome.position(), &mut value) {
                    map.insert("alert".to_string(), to_value(&service.alert_for(position)));
                }
                value
            })
            .collect(),
    )
}

/// Run a parsed tool call.
pub async fn dispatch(service: &SolShield, call: ToolCall) -> Value {
    debug!(?call, "Dispatching tool call");
    match call {
        ToolCall::CheckHealthFactor { wallet, protocol } => {
            let outcomes = service.fetch_all(&wallet, protocol.as_deref()).await;
            health_report(service, &outcomes)
        }
        ToolCall::ListPositions { wallet } => to_value(&service.fetch_all(&wallet, None).await),
        ToolCall::GetPositionRisk { wallet, protocol } => {
            match service.analyze(&wallet, &protocol).await {
                Ok(Some(analysis)) => to_value(&analysis),
                Ok(None) => no_position(&wallet, &protocol),
                Err(err) => service_error(err),
            }
        }
        ToolCall::SimulateRebalance {
            wallet,
            protocol,
            action,
            amount_usd,
        } => match service.simulate(&wallet, &protocol, &action, amount_usd).await {
            Ok(simulation) => json!({ "simulation": simulation }),
            Err(err) => service_error(err),
        },
        ToolCall::ExecuteRebalance {
            wallet,
            protocol,
            action,
            amount_usd,
            confirm,
        } => match service
            .execute(&wallet, &protocol, &action, amount_usd, confirm)
            .await
        {
            Ok(outcome) => to_value(&outcome),
            Err(err) => service_error(err),
        },
        ToolCall::SetAlertThreshold {
            wallet,
            warning_threshold,
            critical_threshold,
        } => match service.set_alert_threshold(&wallet, warning_threshold, critical_threshold) {
            Ok(thresholds) => json!({
                "wallet": wallet,
                "warning_threshold": thresholds.warning_threshold,
                "critical_threshold": thresholds.critical_threshold,
                "status": "configured",
            }),
            Err(err) => service_error(err),
        },
    }
}

/// Parse and run a raw request.
pub async fn handle(service: &SolShield, request: ToolRequest) -> Value {
    match ToolCall::parse(request) {
        Ok(call) => dispatch(service, call).await,
        Err(response) => response,
    }
}

/// Tool definitions with their input schemas.
pub fn definitions() -> Value {
    let protocol = json!({"type": "string", "enum": ["kamino", "marginfi", "solend"]});
    let wallet = json!({"type": "string", "description": "Solana wallet address"});
    json!([
        {
            "name": "check_health_factor",
            "description": "Health factor and risk level of every lending position held by a wallet, with alert levels.",
            "input_schema": {
                "type": "object",
                "properties": {"wallet": wallet, "protocol": protocol},
                "required": ["wallet"],
            },
        },
        {
            "name": "get_position_risk",
            "description": "Narrated risk assessment of the wallet's position on one protocol.",
            "input_schema": {
                "type": "object",
                "properties": {"wallet": wallet, "protocol": protocol},
                "required": ["wallet", "protocol"],
            },
        },
        {
            "name": "list_positions",
            "description": "Every lending position held by a wallet across all protocols.",
            "input_schema": {
                "type": "object",
                "properties": {"wallet": wallet},
                "required": ["wallet"],
            },
        },
        {
            "name": "simulate_rebalance",
            "description": "Projected health factor after adding collateral, repaying debt or unwinding.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "wallet": wallet,
                    "protocol": protocol,
                    "action": {"type": "string", "enum": ["add_collateral", "repay_debt", "full_unwind"]},
                    "amount_usd": {"type": "number", "exclusiveMinimum": 0},
                },
                "required": ["wallet", "protocol", "action", "amount_usd"],
            },
        },
        {
            "name": "execute_rebalance",
            "description": "Quote the funding swap for a rebalance. Requires confirm=true; runs as a dry run.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "wallet": wallet,
                    "protocol": protocol,
                    "action": {"type": "string", "enum": ["add_collateral", "repay_debt"]},
                    "amount_usd": {"type": "number", "exclusiveMinimum": 0},
                    "confirm": {"type": "boolean", "description": "Must be true to execute"},
                },
                "required": ["wallet", "protocol", "action", "amount_usd", "confirm"],
            },
        },
        {
            "name": "set_alert_threshold",
            "description": "Configure health factor alert thresholds for a wallet.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "wallet": wallet,
                    "warning_threshold": {"type": "number", "default": 1.5},
                    "critical_threshold": {"type": "number", "default": 1.2},
                },
                "required": ["wallet"],
            },
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(value: Value) -> ToolRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_known_tool() {
        let call = ToolCall::parse(request(json!({
            "tool": "simulate_rebalance",
            "arguments": {
                "wallet": "w",
                "protocol": "kamino",
                "action": "repay_debt",
                "amount_usd": 1000
            }
        })))
        .unwrap();

        assert_eq!(
            call,
            ToolCall::SimulateRebalance {
                wallet: "w".into(),
                protocol: "kamino".into(),
                action: "repay_debt".into(),
                amount_usd: 1000.0,
            }
        );
    }

    #[test]
    fn test_optional_arguments_default() {
        let call = ToolCall::parse(request(json!({
            "tool": "execute_rebalance",
            "arguments": {"wallet": "w", "protocol": "solend", "action": "repay_debt", "amount_usd": 5}
        })))
        .unwrap();
        assert!(matches!(call, ToolCall::ExecuteRebalance { confirm: false, .. }));

        let call = ToolCall::parse(request(json!({
            "tool": "check_health_factor",
            "arguments": {"wallet": "w"}
        })))
        .unwrap();
        assert!(matches!(
            call,
            ToolCall::CheckHealthFactor { protocol: None, .. }
        ));
    }

    #[test]
    fn test_unknown_tool() {
        let err = ToolCall::parse(request(json!({"tool": "drain_wallet"}))).unwrap_err();
        assert_eq!(err["error"]["code"], "unknown_tool");
    }

    #[test]
    fn test_missing_arguments() {
        let err = ToolCall::parse(request(json!({"tool": "list_positions"}))).unwrap_err();
        assert_eq!(err["error"]["code"], "invalid_arguments");
    }

    #[test]
    fn test_definitions_cover_every_tool() {
        let definitions = definitions();
        let names: Vec<&str> = definitions
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, TOOL_NAMES);
    }
}
