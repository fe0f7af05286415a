//! ICMP echo check.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::random;
use serde::Deserialize;
use serde_json::{json, Value};
use surge_ping::{PingIdentifier, PingSequence};

use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};
use crate::net::host_of;

#[derive(Deserialize)]
#[serde(default)]
struct PingCheckConfig {
    count: u16,
    timeout_seconds: u64,
    max_latency_ms: f64,
}

impl Default for PingCheckConfig {
    fn default() -> Self {
        Self {
            count: 3,
            timeout_seconds: 10,
            max_latency_ms: 1000.0,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct PingCheck;

#[async_trait]
impl Check for PingCheck {
    fn check_type(&self) -> &'static str {
        "ping"
    }

    fn display_name(&self) -> &'static str {
        "Ping (ICMP) Check"
    }

    fn description(&self) -> &'static str {
        "Verifies host reachability and measures round-trip time using ICMP ping"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "count": {
                    "type": "integer",
                    "default": 3,
                    "minimum": 1,
                    "maximum": 10,
                    "description": "Number of echo requests to send"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 30,
                    "description": "Timeout per echo request"
                },
                "max_latency_ms": {
                    "type": "integer",
                    "default": 1000,
                    "minimum": 1,
                    "description": "Maximum acceptable average latency in milliseconds (triggers warning if exceeded)"
                }
            }
        })
    }

    async fn execute(&self, target: &str, config: &Value) -> CheckOutcome {
        let cfg: PingCheckConfig = match parse_config(config) {
            Ok(cfg) => cfg,
            Err(e) => return invalid_config(e),
        };
        let count = cfg.count.clamp(1, 10);

        let hostname = host_of(target);
        let start = Instant::now();

        let addr: IpAddr = match tokio::net::lookup_host((hostname.as_str(), 0)).await {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => addr.ip(),
                None => {
                    return CheckOutcome::failure(
                        Some(elapsed_ms(start)),
                        format!("DNS resolution returned no addresses for {hostname}"),
                        json!({ "hostname": hostname, "error_type": "resolution" }),
                    )
                }
            },
            Err(e) => {
                return CheckOutcome::failure(
                    Some(elapsed_ms(start)),
                    format!("DNS resolution failed: {e}"),
                    json!({ "hostname": hostname, "error_type": "resolution" }),
                )
            }
        };

        let client = match surge_ping::Client::new(&surge_ping::Config::default()) {
            Ok(client) => client,
            Err(e) => {
                return CheckOutcome::failure(
                    Some(elapsed_ms(start)),
                    format!("Failed to open ICMP socket: {e}"),
                    json!({ "hostname": hostname, "error_type": "icmp_socket" }),
                )
            }
        };

        let mut pinger = client.pinger(addr, PingIdentifier(random())).await;
        pinger.timeout(Duration::from_secs(cfg.timeout_seconds.max(1)));

        let mut rtts: Vec<f64> = Vec::with_capacity(count as usize);
        for seq in 0..count {
            if let Ok((_packet, duration)) = pinger.ping(PingSequence(seq), &[]).await {
                rtts.push(duration.as_secs_f64() * 1000.0);
            }
        }

        let response_time_ms = elapsed_ms(start);
        let packets_sent = count as usize;
        let packets_received = rtts.len();
        let packet_loss =
            round2((1.0 - packets_received as f64 / packets_sent as f64) * 100.0);

        if packets_received == 0 {
            return CheckOutcome::failure(
                Some(response_time_ms),
                format!("Host {hostname} is unreachable"),
                json!({
                    "hostname": hostname,
                    "ip": addr.to_string(),
                    "packets_sent": packets_sent,
                    "packets_received": 0,
                    "packet_loss": packet_loss,
                }),
            );
        }

        let min = rtts.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = rtts.iter().cloned().fold(0.0_f64, f64::max);
        let avg = rtts.iter().sum::<f64>() / packets_received as f64;

        let result_data = json!({
            "hostname": hostname,
            "ip": addr.to_string(),
            "packets_sent": packets_sent,
            "packets_received": packets_received,
            "packet_loss": packet_loss,
            "min_latency": round2(min),
            "avg_latency": round2(avg),
            "max_latency": round2(max),
        });

        if avg > cfg.max_latency_ms {
            return CheckOutcome::warning(
                Some(response_time_ms),
                format!(
                    "High latency: {}ms (threshold: {}ms)",
                    round2(avg),
                    cfg.max_latency_ms
                ),
                result_data,
            );
        }

        CheckOutcome::success(Some(response_time_ms), result_data)
    }
}
