//! TCP port connectivity check.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpStream;

use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};
use crate::net::host_of;

#[derive(Deserialize)]
#[serde(default)]
struct PortCheckConfig {
    ports: Vec<u16>,
    timeout_seconds: u64,
}

impl Default for PortCheckConfig {
    fn default() -> Self {
        Self {
            ports: vec![80, 443],
            timeout_seconds: 5,
        }
    }
}

pub struct PortCheck;

#[async_trait]
impl Check for PortCheck {
    fn check_type(&self) -> &'static str {
        "port"
    }

    fn display_name(&self) -> &'static str {
        "TCP Port Check"
    }

    fn description(&self) -> &'static str {
        "Verifies that specific TCP ports are open and accepting connections"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ports": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 1, "maximum": 65535 },
                    "default": [80, 443],
                    "description": "List of TCP ports to check"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "default": 5,
                    "minimum": 1,
                    "maximum": 30,
                    "description": "Connection timeout per port in seconds"
                }
            }
        })
    }

    async fn execute(&self, target: &str, config: &Value) -> CheckOutcome {
        let cfg: PortCheckConfig = match parse_config(config) {
            Ok(cfg) => cfg,
            Err(e) => return invalid_config(e),
        };

        let hostname = host_of(target);
        let timeout = Duration::from_secs(cfg.timeout_seconds.max(1));
        let start = Instant::now();

        let mut port_details = Map::new();
        let mut open_ports: Vec<u16> = Vec::new();
        let mut closed_ports: Vec<u16> = Vec::new();

        for port in &cfg.ports {
            let port = *port;
            let port_start = Instant::now();
            let connected = matches!(
                tokio::time::timeout(timeout, TcpStream::connect((hostname.as_str(), port))).await,
                Ok(Ok(_))
            );
            let port_time = elapsed_ms(port_start);

            let status = if connected { "open" } else { "closed" };
            port_details.insert(
                port.to_string(),
                json!({ "status": status, "response_time_ms": port_time }),
            );
            if connected {
                open_ports.push(port);
            } else {
                closed_ports.push(port);
            }
        }

        let response_time_ms = elapsed_ms(start);
        let result_data = json!({
            "hostname": hostname,
            "open_ports": open_ports,
            "closed_ports": closed_ports,
            "port_details": port_details,
        });

        if !closed_ports.is_empty() {
            let listing = closed_ports
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return CheckOutcome::failure(
                Some(response_time_ms),
                format!("Closed ports: {listing}"),
                result_data,
            );
        }

        CheckOutcome::success(Some(response_time_ms), result_data)
    }
}
