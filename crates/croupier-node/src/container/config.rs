//! # Node Configuration
//!
//! Command-line flags, each with a `CROUPIER_*` environment fallback. The
//! per-component config structs are derived from these values.
//!
//! ## Service lists
//!
//! - `--service echo` / `--service echo:echo-2` hosts an in-process service
//!   of the given type, optionally under an explicit id
//! - `--external "dealer=/usr/bin/dealer --fast"` launches an external
//!   service through the process supervisor

use std::time::Duration;

use clap::Parser;
use croupier_bus::{AckPolicy, Backoff, BrokerConfig};
use croupier_lifecycle::ShutdownConfig;
use croupier_registry::{RegistryConfig, REGISTRY_ID};
use croupier_supervisor::{ProcessSpec, SupervisorConfig};
use croupier_telemetry::TelemetryConfig;

/// Complete node configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "croupier-node", version, about = "Croupier messaging and service node")]
pub struct NodeConfig {
    /// Node name, used as the service name in logs.
    #[arg(long, env = "CROUPIER_NODE_NAME", default_value = "croupier-node")]
    pub node_name: String,

    /// Log filter directive.
    #[arg(long, env = "CROUPIER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON log lines.
    #[arg(long, env = "CROUPIER_JSON_LOGS")]
    pub json_logs: bool,

    /// Time to wait for an acknowledgment before redelivering.
    #[arg(long, env = "CROUPIER_ACK_TIMEOUT_MS", default_value_t = 5_000)]
    pub ack_timeout_ms: u64,

    /// Redeliveries before an unacknowledged message is given up.
    #[arg(long, env = "CROUPIER_ACK_MAX_RETRIES", default_value_t = 3)]
    pub ack_max_retries: u32,

    /// Multiply the ack timeout by this factor on every retry (1 = fixed).
    #[arg(long, env = "CROUPIER_ACK_BACKOFF_FACTOR", default_value_t = 1.0)]
    pub ack_backoff_factor: f64,

    /// How long published message ids are remembered.
    #[arg(long, env = "CROUPIER_ID_RETENTION_SECS", default_value_t = 600)]
    pub id_retention_secs: u64,

    /// Subscriber id of this node's registry.
    #[arg(long, env = "CROUPIER_REGISTRY_ID", default_value = REGISTRY_ID)]
    pub registry_id: String,

    /// Interval between service heartbeats.
    #[arg(long, env = "CROUPIER_HEARTBEAT_INTERVAL_MS", default_value_t = 5_000)]
    pub heartbeat_interval_ms: u64,

    /// Heartbeats a service may miss before it is swept.
    #[arg(long, env = "CROUPIER_MISSED_HEARTBEATS", default_value_t = 3)]
    pub missed_heartbeats: u32,

    /// Budget for each shutdown participant.
    #[arg(long, env = "CROUPIER_PARTICIPANT_TIMEOUT_MS", default_value_t = 5_000)]
    pub participant_timeout_ms: u64,

    /// Budget for the whole shutdown sequence.
    #[arg(long, env = "CROUPIER_SHUTDOWN_TIMEOUT_MS", default_value_t = 30_000)]
    pub shutdown_timeout_ms: u64,

    /// SIGTERM to SIGKILL delay for external services.
    #[arg(long, env = "CROUPIER_GRACE_PERIOD_MS", default_value_t = 3_000)]
    pub grace_period_ms: u64,

    /// Interval between exit checks of external services.
    #[arg(long, env = "CROUPIER_MONITOR_INTERVAL_MS", default_value_t = 500)]
    pub monitor_interval_ms: u64,

    /// In-process services to host, as `type` or `type:id`.
    #[arg(
        long = "service",
        env = "CROUPIER_SERVICES",
        value_delimiter = ',',
        default_value = "echo",
        value_parser = HostedServiceSpec::parse
    )]
    pub services: Vec<HostedServiceSpec>,

    /// External services to launch, as `name=command args...`.
    #[arg(
        long = "external",
        env = "CROUPIER_EXTERNAL_SERVICES",
        value_delimiter = ';',
        value_parser = ExternalServiceSpec::parse
    )]
    pub external: Vec<ExternalServiceSpec>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: "croupier-node".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            ack_timeout_ms: 5_000,
            ack_max_retries: 3,
            ack_backoff_factor: 1.0,
            id_retention_secs: 600,
            registry_id: REGISTRY_ID.to_string(),
            heartbeat_interval_ms: 5_000,
            missed_heartbeats: 3,
            participant_timeout_ms: 5_000,
            shutdown_timeout_ms: 30_000,
            grace_period_ms: 3_000,
            monitor_interval_ms: 500,
            services: vec![HostedServiceSpec::new("echo", "echo")],
            external: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Broker settings.
    #[must_use]
    pub fn broker_config(&self) -> BrokerConfig {
        let timeout = Duration::from_millis(self.ack_timeout_ms);
        let backoff = if self.ack_backoff_factor > 1.0 {
            Backoff::Exponential {
                factor: self.ack_backoff_factor,
                max: timeout.saturating_mul(8),
            }
        } else {
            Backoff::Fixed
        };
        BrokerConfig {
            ack: AckPolicy {
                timeout,
                max_retries: self.ack_max_retries,
                backoff,
            },
            id_retention: Duration::from_secs(self.id_retention_secs),
            ..BrokerConfig::default()
        }
    }

    /// Registry settings.
    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        let heartbeat_interval = Duration::from_millis(self.heartbeat_interval_ms);
        RegistryConfig {
            registry_id: self.registry_id.clone(),
            heartbeat_interval,
            missed_heartbeats: self.missed_heartbeats,
            sweep_interval: heartbeat_interval,
        }
    }

    /// Shutdown coordinator settings.
    #[must_use]
    pub fn shutdown_config(&self) -> ShutdownConfig {
        ShutdownConfig {
            participant_timeout: Duration::from_millis(self.participant_timeout_ms),
            overall_timeout: Some(self.shutdown_timeout()),
        }
    }

    /// Overall shutdown budget.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Process supervisor settings.
    #[must_use]
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            monitor_interval: Duration::from_millis(self.monitor_interval_ms.max(1)),
            grace_period: Duration::from_millis(self.grace_period_ms),
            ..SupervisorConfig::default()
        }
    }

    /// Logging settings.
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.node_name.clone(),
            log_level: self.log_level.clone(),
            json_logs: self.json_logs,
            ..TelemetryConfig::default()
        }
    }
}

/// An in-process service to host: factory type plus service id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedServiceSpec {
    pub service_type: String,
    pub service_id: String,
}

impl HostedServiceSpec {
    /// Explicit type and id.
    pub fn new(service_type: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            service_id: service_id.into(),
        }
    }

    /// Parse `type` or `type:id`. A bare type uses the type as id.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let (service_type, service_id) = match raw.split_once(':') {
            Some((t, id)) => (t.trim(), id.trim()),
            None => (raw, raw),
        };
        if service_type.is_empty() || service_id.is_empty() {
            return Err(format!("invalid service '{raw}', expected type or type:id"));
        }
        Ok(Self::new(service_type, service_id))
    }
}

/// An external service: name plus the command line that runs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalServiceSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
}

impl ExternalServiceSpec {
    /// Parse `name=command arg1 arg2`. Arguments are split on whitespace.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (name, command_line) = raw
            .split_once('=')
            .ok_or_else(|| format!("invalid external service '{raw}', expected name=command"))?;
        let name = name.trim();
        let mut parts = command_line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        if name.is_empty() || command.is_empty() {
            return Err(format!(
                "invalid external service '{raw}', expected name=command"
            ));
        }
        Ok(Self {
            name: name.to_string(),
            command: command.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }

    /// The supervisor launch spec.
    #[must_use]
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec::new(&self.name, &self.command)
            .args(self.args.iter().cloned())
            .env("CROUPIER_SERVICE_NAME", &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let config = NodeConfig::parse_from([
            "croupier-node",
            "--ack-timeout-ms",
            "100",
            "--ack-max-retries",
            "2",
            "--service",
            "echo:echo-1,echo:echo-2",
            "--external",
            "dealer=/bin/sleep 30;shuffler=/bin/true",
        ]);

        assert_eq!(config.broker_config().ack.timeout, Duration::from_millis(100));
        assert_eq!(config.broker_config().ack.max_retries, 2);
        assert_eq!(
            config.services,
            vec![
                HostedServiceSpec::new("echo", "echo-1"),
                HostedServiceSpec::new("echo", "echo-2"),
            ]
        );
        assert_eq!(config.external.len(), 2);
        assert_eq!(config.external[0].name, "dealer");
        assert_eq!(config.external[0].args, vec!["30".to_string()]);
        assert_eq!(config.external[1].command, "/bin/true");
    }

    #[test]
    fn test_default_matches_component_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.broker_config().ack, AckPolicy::default());
        assert_eq!(config.registry_config().registry_id, REGISTRY_ID);
        assert_eq!(config.registry_config().max_age(), Duration::from_secs(15));
        assert_eq!(config.services, vec![HostedServiceSpec::new("echo", "echo")]);
    }

    #[test]
    fn test_exponential_backoff_selected() {
        let config = NodeConfig {
            ack_backoff_factor: 2.0,
            ..NodeConfig::default()
        };
        assert!(matches!(
            config.broker_config().ack.backoff,
            Backoff::Exponential { .. }
        ));
    }

    #[test]
    fn test_hosted_service_parse() {
        assert_eq!(
            HostedServiceSpec::parse("echo").unwrap(),
            HostedServiceSpec::new("echo", "echo")
        );
        assert_eq!(
            HostedServiceSpec::parse(" echo : table-1 ").unwrap(),
            HostedServiceSpec::new("echo", "table-1")
        );
        assert!(HostedServiceSpec::parse("echo:").is_err());
    }

    #[test]
    fn test_external_service_parse() {
        let spec = ExternalServiceSpec::parse("dealer=/usr/bin/dealer --fast -v").unwrap();
        assert_eq!(spec.name, "dealer");
        assert_eq!(spec.command, "/usr/bin/dealer");
        assert_eq!(spec.args, vec!["--fast", "-v"]);

        assert!(ExternalServiceSpec::parse("dealer").is_err());
        assert!(ExternalServiceSpec::parse("=cmd").is_err());
        assert!(ExternalServiceSpec::parse("dealer=   ").is_err());
    }
}
