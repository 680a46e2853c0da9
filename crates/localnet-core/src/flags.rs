//! Command-line flags for the supervised node binary.
//!
//! `NodeFlags::default()` mirrors the defaults a local test network wants.
//! The orchestrator only touches ports, directories, staking files,
//! bootstrap peers, the chain config dir, the domain allow-list and the log
//! level; everything else stays at the value documented here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::topology::NodeSlot;

/// Full flag set understood by the node runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFlags {
    // Assertions / version
    /// `--assertions-enabled`
    pub assertions_enabled: bool,
    /// `--version`
    pub version: bool,

    // Fees and addressing
    /// `--tx-fee`
    pub tx_fee: u64,
    /// `--public-ip`
    pub public_ip: String,
    /// `--dynamic-update-duration`
    pub dynamic_update_duration: String,
    /// `--dynamic-public-ip`
    pub dynamic_public_ip: String,
    /// `--network-id`
    pub network_id: String,
    /// `--signature-verification-enabled`
    pub signature_verification_enabled: bool,

    // APIs
    /// `--api-admin-enabled`
    pub api_admin_enabled: bool,
    /// `--api-ipcs-enabled`
    pub api_ipcs_enabled: bool,
    /// `--api-keystore-enabled`
    pub api_keystore_enabled: bool,
    /// `--api-metrics-enabled`
    pub api_metrics_enabled: bool,
    /// `--api-health-enabled`
    pub api_health_enabled: bool,
    /// `--api-info-enabled`
    pub api_info_enabled: bool,

    // HTTP
    /// `--http-host`
    pub http_host: String,
    /// `--http-port`
    pub http_port: u16,
    /// `--http-tls-enabled`
    pub http_tls_enabled: bool,
    /// `--http-tls-cert-file`
    pub http_tls_cert_file: String,
    /// `--http-tls-key-file`
    pub http_tls_key_file: String,

    // Bootstrapping
    /// `--bootstrap-ips`
    pub bootstrap_ips: String,
    /// `--bootstrap-ids`
    pub bootstrap_ids: String,
    /// `--bootstrap-beacon-connection-timeout`
    pub bootstrap_beacon_connection_timeout: String,
    /// `--bootstrap-retry-enabled`
    pub retry_bootstrap: bool,

    // Build, storage, logging
    /// `--build-dir`
    pub build_dir: String,
    /// `--db-dir`
    pub db_dir: String,
    /// `--log-level`
    pub log_level: String,
    /// `--log-dir`
    pub log_dir: String,
    /// `--log-display-level`; empty falls back to `--log-level`
    pub log_display_level: String,
    /// `--log-display-highlight`
    pub log_display_highlight: String,

    // Consensus
    /// `--snow-avalanche-batch-size`
    pub snow_avalanche_batch_size: u32,
    /// `--snow-avalanche-num-parents`
    pub snow_avalanche_num_parents: u32,
    /// `--snow-sample-size`
    pub snow_sample_size: u32,
    /// `--snow-quorum-size`
    pub snow_quorum_size: u32,
    /// `--snow-virtuous-commit-threshold`
    pub snow_virtuous_commit_threshold: u32,
    /// `--snow-rogue-commit-threshold`
    pub snow_rogue_commit_threshold: u32,
    /// `--snow-concurrent-repolls`
    pub snow_concurrent_repolls: u32,
    /// `--consensus-shutdown-timeout`
    pub consensus_shutdown_timeout: String,
    /// `--consensus-gossip-frequency`
    pub consensus_gossip_frequency: String,

    // Staking economics
    /// `--min-delegator-stake`
    pub min_delegator_stake: u64,
    /// `--min-delegation-fee`
    pub min_delegation_fee: u64,
    /// `--min-validator-stake`
    pub min_validator_stake: u64,
    /// `--max-validator-stake`
    pub max_validator_stake: u64,
    /// `--min-stake-duration`
    pub min_stake_duration: String,
    /// `--max-stake-duration`
    pub max_stake_duration: String,
    /// `--stake-minting-period`
    pub stake_minting_period: String,

    // Staking identity
    /// `--staking-enabled`
    pub staking_enabled: bool,
    /// `--staking-port`
    pub staking_port: u16,
    /// `--staking-disabled-weight`
    pub staking_disabled_weight: u32,
    /// `--staking-tls-key-file`
    pub staking_tls_key_file: String,
    /// `--staking-tls-cert-file`
    pub staking_tls_cert_file: String,

    // Auth
    /// `--api-auth-required`
    pub api_auth_required: bool,
    /// `--api-auth-password-file`
    pub api_auth_password_file: String,

    /// `--whitelisted-subnets`, comma separated
    pub whitelisted_subnets: String,

    // Config files
    /// `--config-file`
    pub config_file: String,
    /// `--chain-config-dir`
    pub chain_config_dir: String,
    /// `--plugin-dir`
    pub plugin_dir: String,

    // IPC
    /// `--ipcs-chain-ids`
    pub ipcs_chain_ids: String,
    /// `--ipcs-path`
    pub ipcs_path: String,

    /// `--fd-limit`
    pub fd_limit: u32,

    // Benchlist
    /// `--benchlist-fail-threshold`
    pub benchlist_fail_threshold: u32,
    /// `--benchlist-min-failing-duration`
    pub benchlist_min_failing_duration: String,
    /// `--benchlist-peer-summary-enabled`
    pub benchlist_peer_summary_enabled: bool,
    /// `--benchlist-duration`
    pub benchlist_duration: String,

    // Network timeouts and health
    /// `--network-initial-timeout`
    pub network_initial_timeout: String,
    /// `--network-minimum-timeout`
    pub network_minimum_timeout: String,
    /// `--network-maximum-timeout`
    pub network_maximum_timeout: String,
    /// `--network-health-max-send-fail-rate`
    pub network_health_max_send_fail_rate: f64,
    /// `--network-health-max-portion-send-queue-full`
    pub network_health_max_portion_send_queue_full: f64,
    /// `--network-health-max-time-since-msg-sent`
    pub network_health_max_time_since_msg_sent: String,
    /// `--network-health-max-time-since-msg-received`
    pub network_health_max_time_since_msg_received: String,
    /// `--network-health-min-conn-peers`
    pub network_health_min_conn_peers: u32,
    /// `--network-timeout-coefficient`
    pub network_timeout_coefficient: u32,
    /// `--network-timeout-halflife`
    pub network_timeout_halflife: String,

    // Peer list gossip
    /// `--network-peer-list-gossip-frequency`
    pub network_peer_list_gossip_frequency: String,
    /// `--network-peer-list-gossip-size`
    pub network_peer_list_gossip_size: u32,
    /// `--network-peer-list-size`
    pub network_peer_list_size: u32,

    /// `--uptime-requirement`
    pub uptime_requirement: f64,

    // Health checks
    /// `--health-check-averager-halflife`
    pub health_check_averager_halflife: String,
    /// `--health-check-frequency`
    pub health_check_frequency: String,

    // Router
    /// `--router-health-max-outstanding-requests`
    pub router_health_max_outstanding_requests: u32,
    /// `--router-health-max-drop-rate`
    pub router_health_max_drop_rate: f64,

    /// `--index-enabled`
    pub index_enabled: bool,
    /// `--plugin-mode-enabled`
    pub plugin_mode_enabled: bool,

    /// Raw `--name=value` overrides applied after the typed fields
    pub extra: BTreeMap<String, String>,
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self {
            assertions_enabled: true,
            version: false,
            tx_fee: 1_000_000,
            public_ip: "127.0.0.1".to_string(),
            dynamic_update_duration: "5m".to_string(),
            dynamic_public_ip: String::new(),
            network_id: "local".to_string(),
            signature_verification_enabled: true,
            api_admin_enabled: true,
            api_ipcs_enabled: true,
            api_keystore_enabled: true,
            api_metrics_enabled: true,
            api_health_enabled: true,
            api_info_enabled: true,
            http_host: "127.0.0.1".to_string(),
            http_port: 9650,
            http_tls_enabled: false,
            http_tls_cert_file: String::new(),
            http_tls_key_file: String::new(),
            bootstrap_ips: String::new(),
            bootstrap_ids: String::new(),
            bootstrap_beacon_connection_timeout: "60s".to_string(),
            retry_bootstrap: true,
            build_dir: String::new(),
            db_dir: String::new(),
            log_level: "info".to_string(),
            log_dir: String::new(),
            log_display_level: String::new(),
            log_display_highlight: "colors".to_string(),
            snow_avalanche_batch_size: 30,
            snow_avalanche_num_parents: 5,
            snow_sample_size: 2,
            snow_quorum_size: 2,
            snow_virtuous_commit_threshold: 5,
            snow_rogue_commit_threshold: 10,
            snow_concurrent_repolls: 4,
            consensus_shutdown_timeout: "5s".to_string(),
            consensus_gossip_frequency: "10s".to_string(),
            min_delegator_stake: 5_000_000,
            min_delegation_fee: 20_000,
            min_validator_stake: 5_000_000,
            max_validator_stake: 3_000_000_000_000_000,
            min_stake_duration: "336h".to_string(),
            max_stake_duration: "8760h".to_string(),
            stake_minting_period: "8760h".to_string(),
            staking_enabled: false,
            staking_port: 9651,
            staking_disabled_weight: 1,
            staking_tls_key_file: String::new(),
            staking_tls_cert_file: String::new(),
            api_auth_required: false,
            api_auth_password_file: String::new(),
            whitelisted_subnets: String::new(),
            config_file: String::new(),
            chain_config_dir: String::new(),
            plugin_dir: String::new(),
            ipcs_chain_ids: String::new(),
            ipcs_path: "/tmp".to_string(),
            fd_limit: 32_768,
            benchlist_fail_threshold: 10,
            benchlist_min_failing_duration: "5m".to_string(),
            benchlist_peer_summary_enabled: false,
            benchlist_duration: "1h".to_string(),
            network_initial_timeout: "5s".to_string(),
            network_minimum_timeout: "5s".to_string(),
            network_maximum_timeout: "10s".to_string(),
            network_health_max_send_fail_rate: 0.9,
            network_health_max_portion_send_queue_full: 0.9,
            network_health_max_time_since_msg_sent: "1m".to_string(),
            network_health_max_time_since_msg_received: "1m".to_string(),
            network_health_min_conn_peers: 1,
            network_timeout_coefficient: 2,
            network_timeout_halflife: "5m".to_string(),
            network_peer_list_gossip_frequency: "1s".to_string(),
            network_peer_list_gossip_size: 50,
            network_peer_list_size: 20,
            uptime_requirement: 0.6,
            health_check_averager_halflife: "10s".to_string(),
            health_check_frequency: "30s".to_string(),
            router_health_max_outstanding_requests: 1024,
            router_health_max_drop_rate: 1.0,
            index_enabled: false,
            plugin_mode_enabled: false,
            extra: BTreeMap::new(),
        }
    }
}

/// Run-wide inputs that every slot's flags share.
#[derive(Debug, Clone, Default)]
pub struct SharedNodeSettings {
    /// Directory holding workload plugin binaries
    pub plugin_dir: PathBuf,
    /// Optional per-chain config directory
    pub chain_config_dir: Option<PathBuf>,
    /// Domain ids the nodes should track
    pub whitelisted_subnets: Vec<String>,
    /// Node log level
    pub log_level: String,
    /// Raw flag overrides
    pub extra: BTreeMap<String, String>,
}

impl NodeFlags {
    /// Start from defaults and apply the per-slot overrides.
    pub fn for_slot(slot: &NodeSlot, shared: &SharedNodeSettings) -> Self {
        let mut flags = Self {
            log_level: shared.log_level.clone(),
            log_dir: path_string(&slot.paths.log_dir),
            db_dir: path_string(&slot.paths.db_dir),
            staking_enabled: true,
            http_host: slot.host.clone(),
            public_ip: slot.host.clone(),
            http_port: slot.http_port,
            staking_port: slot.staking_port,
            staking_tls_cert_file: path_string(&slot.paths.cert_file),
            staking_tls_key_file: path_string(&slot.paths.key_file),
            plugin_dir: path_string(&shared.plugin_dir),
            whitelisted_subnets: shared.whitelisted_subnets.join(","),
            extra: shared.extra.clone(),
            ..Self::default()
        };

        if let Some(peer) = &slot.bootstrap {
            flags.bootstrap_ips = peer.address.clone();
            flags.bootstrap_ids = peer.node_id.to_string();
        }
        if let Some(dir) = &shared.chain_config_dir {
            flags.chain_config_dir = path_string(dir);
        }
        flags
    }

    /// Render as `--name=value` arguments, skipping empty values.
    ///
    /// Relative TLS and staking file paths are resolved against `cwd`.
    pub fn to_args(&self, cwd: &Path) -> Vec<String> {
        let mut pairs: Vec<(&str, String)> = vec![
            ("assertions-enabled", self.assertions_enabled.to_string()),
            ("version", self.version.to_string()),
            ("tx-fee", self.tx_fee.to_string()),
            ("public-ip", self.public_ip.clone()),
            ("dynamic-update-duration", self.dynamic_update_duration.clone()),
            ("dynamic-public-ip", self.dynamic_public_ip.clone()),
            ("network-id", self.network_id.clone()),
            (
                "signature-verification-enabled",
                self.signature_verification_enabled.to_string(),
            ),
            ("api-admin-enabled", self.api_admin_enabled.to_string()),
            ("api-ipcs-enabled", self.api_ipcs_enabled.to_string()),
            ("api-keystore-enabled", self.api_keystore_enabled.to_string()),
            ("api-metrics-enabled", self.api_metrics_enabled.to_string()),
            ("http-host", self.http_host.clone()),
            ("http-port", self.http_port.to_string()),
            ("http-tls-enabled", self.http_tls_enabled.to_string()),
            ("http-tls-cert-file", absolutize(&self.http_tls_cert_file, cwd)),
            ("http-tls-key-file", absolutize(&self.http_tls_key_file, cwd)),
            ("bootstrap-ips", self.bootstrap_ips.clone()),
            ("bootstrap-ids", self.bootstrap_ids.clone()),
            (
                "bootstrap-beacon-connection-timeout",
                self.bootstrap_beacon_connection_timeout.clone(),
            ),
            ("db-dir", self.db_dir.clone()),
            ("build-dir", self.build_dir.clone()),
            ("log-level", self.log_level.clone()),
            ("log-dir", self.log_dir.clone()),
            ("log-display-level", self.log_display_level.clone()),
            ("log-display-highlight", self.log_display_highlight.clone()),
            (
                "snow-avalanche-batch-size",
                self.snow_avalanche_batch_size.to_string(),
            ),
            (
                "snow-avalanche-num-parents",
                self.snow_avalanche_num_parents.to_string(),
            ),
            ("snow-sample-size", self.snow_sample_size.to_string()),
            ("snow-quorum-size", self.snow_quorum_size.to_string()),
            (
                "snow-virtuous-commit-threshold",
                self.snow_virtuous_commit_threshold.to_string(),
            ),
            (
                "snow-rogue-commit-threshold",
                self.snow_rogue_commit_threshold.to_string(),
            ),
            ("min-delegator-stake", self.min_delegator_stake.to_string()),
            ("consensus-shutdown-timeout", self.consensus_shutdown_timeout.clone()),
            ("consensus-gossip-frequency", self.consensus_gossip_frequency.clone()),
            ("min-delegation-fee", self.min_delegation_fee.to_string()),
            ("min-validator-stake", self.min_validator_stake.to_string()),
            ("max-stake-duration", self.max_stake_duration.clone()),
            ("max-validator-stake", self.max_validator_stake.to_string()),
            ("snow-concurrent-repolls", self.snow_concurrent_repolls.to_string()),
            ("stake-minting-period", self.stake_minting_period.clone()),
            ("network-initial-timeout", self.network_initial_timeout.clone()),
            ("network-minimum-timeout", self.network_minimum_timeout.clone()),
            ("network-maximum-timeout", self.network_maximum_timeout.clone()),
            (
                "network-health-max-send-fail-rate",
                format!("{:.6}", self.network_health_max_send_fail_rate),
            ),
            (
                "network-health-max-portion-send-queue-full",
                format!("{:.6}", self.network_health_max_portion_send_queue_full),
            ),
            (
                "network-health-max-time-since-msg-sent",
                self.network_health_max_time_since_msg_sent.clone(),
            ),
            (
                "network-health-max-time-since-msg-received",
                self.network_health_max_time_since_msg_received.clone(),
            ),
            (
                "network-health-min-conn-peers",
                self.network_health_min_conn_peers.to_string(),
            ),
            (
                "network-timeout-coefficient",
                self.network_timeout_coefficient.to_string(),
            ),
            ("network-timeout-halflife", self.network_timeout_halflife.clone()),
            (
                "network-peer-list-gossip-frequency",
                self.network_peer_list_gossip_frequency.clone(),
            ),
            (
                "network-peer-list-gossip-size",
                self.network_peer_list_gossip_size.to_string(),
            ),
            ("network-peer-list-size", self.network_peer_list_size.to_string()),
            ("staking-enabled", self.staking_enabled.to_string()),
            ("staking-port", self.staking_port.to_string()),
            ("staking-disabled-weight", self.staking_disabled_weight.to_string()),
            ("staking-tls-key-file", absolutize(&self.staking_tls_key_file, cwd)),
            ("staking-tls-cert-file", absolutize(&self.staking_tls_cert_file, cwd)),
            ("api-auth-required", self.api_auth_required.to_string()),
            ("api-auth-password-file", self.api_auth_password_file.clone()),
            ("min-stake-duration", self.min_stake_duration.clone()),
            ("whitelisted-subnets", self.whitelisted_subnets.clone()),
            ("api-health-enabled", self.api_health_enabled.to_string()),
            ("config-file", self.config_file.clone()),
            ("chain-config-dir", self.chain_config_dir.clone()),
            ("plugin-dir", self.plugin_dir.clone()),
            ("api-info-enabled", self.api_info_enabled.to_string()),
            ("ipcs-chain-ids", self.ipcs_chain_ids.clone()),
            ("ipcs-path", self.ipcs_path.clone()),
            ("fd-limit", self.fd_limit.to_string()),
            ("benchlist-duration", self.benchlist_duration.clone()),
            (
                "benchlist-fail-threshold",
                self.benchlist_fail_threshold.to_string(),
            ),
            (
                "benchlist-min-failing-duration",
                self.benchlist_min_failing_duration.clone(),
            ),
            (
                "benchlist-peer-summary-enabled",
                self.benchlist_peer_summary_enabled.to_string(),
            ),
            ("uptime-requirement", format!("{:.6}", self.uptime_requirement)),
            ("bootstrap-retry-enabled", self.retry_bootstrap.to_string()),
            (
                "health-check-averager-halflife",
                self.health_check_averager_halflife.clone(),
            ),
            ("health-check-frequency", self.health_check_frequency.clone()),
            (
                "router-health-max-outstanding-requests",
                self.router_health_max_outstanding_requests.to_string(),
            ),
            (
                "router-health-max-drop-rate",
                format!("{:.6}", self.router_health_max_drop_rate),
            ),
            ("index-enabled", self.index_enabled.to_string()),
            ("plugin-mode-enabled", self.plugin_mode_enabled.to_string()),
        ];

        for (name, value) in &self.extra {
            match pairs.iter_mut().find(|(known, _)| *known == name.as_str()) {
                Some((_, slot)) => slot.clone_from(value),
                None => pairs.push((name.as_str(), value.clone())),
            }
        }

        pairs
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(name, value)| format!("--{name}={}", value.trim()))
            .collect()
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn absolutize(path: &str, cwd: &Path) -> String {
    if path.is_empty() || Path::new(path).is_absolute() {
        path.to_string()
    } else {
        path_string(&cwd.join(path))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn arg<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
        let prefix = format!("--{name}=");
        args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
    }

    #[test]
    fn empty_values_are_dropped() {
        let args = NodeFlags::default().to_args(Path::new("/work"));
        assert!(arg(&args, "bootstrap-ips").is_none());
        assert!(arg(&args, "dynamic-public-ip").is_none());
        assert_eq!(arg(&args, "network-id"), Some("local"));
        assert!(args.iter().all(|a| !a.ends_with('=')));
    }

    #[test]
    fn floats_render_with_six_decimals() {
        let args = NodeFlags::default().to_args(Path::new("/work"));
        assert_eq!(arg(&args, "uptime-requirement"), Some("0.600000"));
        assert_eq!(arg(&args, "router-health-max-drop-rate"), Some("1.000000"));
    }

    #[test]
    fn relative_staking_files_resolve_against_cwd() {
        let flags = NodeFlags {
            staking_tls_cert_file: "certs/staker.crt".into(),
            staking_tls_key_file: "/abs/staker.key".into(),
            ..NodeFlags::default()
        };
        let args = flags.to_args(Path::new("/work"));
        assert_eq!(
            arg(&args, "staking-tls-cert-file"),
            Some("/work/certs/staker.crt")
        );
        assert_eq!(arg(&args, "staking-tls-key-file"), Some("/abs/staker.key"));
    }

    #[test]
    fn extra_overrides_known_and_appends_unknown() {
        let mut flags = NodeFlags::default();
        flags.extra.insert("snow-sample-size".into(), "5".into());
        flags.extra.insert("http-allowed-hosts".into(), "*".into());
        let args = flags.to_args(Path::new("/"));
        assert_eq!(arg(&args, "snow-sample-size"), Some("5"));
        assert_eq!(arg(&args, "http-allowed-hosts"), Some("*"));
        assert_eq!(
            args.iter().filter(|a| a.starts_with("--snow-sample-size=")).count(),
            1
        );
    }
}
