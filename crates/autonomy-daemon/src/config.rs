//! Typed configuration loading (§6, §9 "string-keyed maps" redesign flag).
//!
//! Reads the host config store's `autonomy` package once at startup into
//! the frozen [`DaemonConfig`]; the core never touches the store directly.
//! `reload()` re-validates into a new snapshot and only swaps it in on
//! success — a bad edit leaves the previous configuration in force (§7).

use std::collections::HashMap;

use autonomy_core::config::{
    FailoverThresholds, IntelligenceThresholds, MainConfig, MemberPolicy, RestoreThresholds,
    SamplerBounds, StarlinkApiConfig, Thresholds, WeightPolicy,
};
use autonomy_core::error::ConfigError;
use autonomy_core::host::ConfigStore;
use autonomy_core::model::Class;

/// Host config package name the daemon reads its own settings from.
/// Operator weights live in `MWAN_PACKAGE`, a different package, per §6:
/// "Weights are read from the multi-WAN policy package, not from the
/// daemon's package".
pub const DAEMON_PACKAGE: &str = "autonomy";

/// The multi-WAN policy package the Hybrid Weight Manager reads
/// `<member>.weight` from. Configurable in case a given host names its
/// mwan3-equivalent package something else.
pub const DEFAULT_MWAN_PACKAGE: &str = "mwan3";

fn get(store: &dyn ConfigStore, section: &str, key: &str) -> Result<Option<String>, ConfigError> {
    store.get(section, key).map_err(|e| {
        ConfigError::Malformed(format!("reading {section}.{key} from config store: {e}"))
    })
}

fn required(store: &dyn ConfigStore, section: &str, key: &str) -> Result<String, ConfigError> {
    get(store, section, key)?.ok_or_else(|| ConfigError::MissingKey {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn parse<T: std::str::FromStr>(section: &str, key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        reason: format!("cannot parse `{raw}`"),
    })
}

fn opt_or<T: std::str::FromStr>(
    store: &dyn ConfigStore,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match get(store, section, key)? {
        Some(raw) => parse(section, key, &raw),
        None => Ok(default),
    }
}

fn req_parse<T: std::str::FromStr>(
    store: &dyn ConfigStore,
    section: &str,
    key: &str,
) -> Result<T, ConfigError> {
    let raw = required(store, section, key)?;
    parse(section, key, &raw)
}

fn parse_bool_flag(
    store: &dyn ConfigStore,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match get(store, section, key)? {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("`{other}` is not a recognized boolean"),
            }),
        },
    }
}

fn load_main(store: &dyn ConfigStore) -> Result<MainConfig, ConfigError> {
    let defaults = MainConfig::default();
    let cfg = MainConfig {
        enable: parse_bool_flag(store, "main", "enable", defaults.enable)?,
        poll_interval_ms: opt_or(store, "main", "poll_interval_ms", defaults.poll_interval_ms)?,
        history_window_s: opt_or(store, "main", "history_window_s", defaults.history_window_s)?,
        retention_hours: opt_or(store, "main", "retention_hours", defaults.retention_hours)?,
        max_ram_mb: opt_or(store, "main", "max_ram_mb", defaults.max_ram_mb)?,
        switch_margin: opt_or(store, "main", "switch_margin", defaults.switch_margin)?,
        min_uptime_s: opt_or(store, "main", "min_uptime_s", defaults.min_uptime_s)?,
        cooldown_s: opt_or(store, "main", "cooldown_s", defaults.cooldown_s)?,
        predictive: parse_bool_flag(store, "main", "predictive", defaults.predictive)?,
    };
    if cfg.switch_margin < 0 {
        return Err(ConfigError::InvalidThreshold {
            name: "main.switch_margin".to_string(),
            reason: "must be non-negative".to_string(),
        });
    }
    Ok(cfg)
}

fn load_failover(store: &dyn ConfigStore) -> Result<FailoverThresholds, ConfigError> {
    let d = FailoverThresholds::default();
    Ok(FailoverThresholds {
        loss_pct: opt_or(store, "thresholds.failover", "loss", d.loss_pct)?,
        latency_ms: opt_or(store, "thresholds.failover", "latency", d.latency_ms)?,
        min_duration_s: opt_or(store, "thresholds.failover", "min_duration_s", d.min_duration_s)?,
    })
}

fn load_restore(store: &dyn ConfigStore) -> Result<RestoreThresholds, ConfigError> {
    let d = RestoreThresholds::default();
    Ok(RestoreThresholds {
        loss_pct: opt_or(store, "thresholds.restore", "loss", d.loss_pct)?,
        latency_ms: opt_or(store, "thresholds.restore", "latency", d.latency_ms)?,
        min_duration_s: opt_or(store, "thresholds.restore", "min_duration_s", d.min_duration_s)?,
    })
}

fn load_weight_policy(store: &dyn ConfigStore) -> Result<WeightPolicy, ConfigError> {
    let d = WeightPolicy::default();
    let section = "thresholds.weights";
    Ok(WeightPolicy {
        respect_user_weights: parse_bool_flag(
            store,
            section,
            "respect_user_weights",
            d.respect_user_weights,
        )?,
        dynamic_adjustment: parse_bool_flag(
            store,
            section,
            "dynamic_adjustment",
            d.dynamic_adjustment,
        )?,
        emergency_override: parse_bool_flag(
            store,
            section,
            "emergency_override",
            d.emergency_override,
        )?,
        only_emergency_override: parse_bool_flag(
            store,
            section,
            "only_emergency_override",
            d.only_emergency_override,
        )?,
        restore_timeout_s: opt_or(store, section, "restore_timeout_s", d.restore_timeout_s)?,
        minimal_adjustment_points: opt_or(
            store,
            section,
            "minimal_adjustment_points",
            d.minimal_adjustment_points,
        )?,
        temporary_boost_points: opt_or(
            store,
            section,
            "temporary_boost_points",
            d.temporary_boost_points,
        )?,
        temporary_adjustment_duration_s: opt_or(
            store,
            section,
            "temporary_adjustment_duration_s",
            d.temporary_adjustment_duration_s,
        )?,
        emergency_adjustment_duration_s: opt_or(
            store,
            section,
            "emergency_adjustment_duration_s",
            d.emergency_adjustment_duration_s,
        )?,
        allow_class_fallback: parse_bool_flag(
            store,
            section,
            "allow_class_fallback",
            d.allow_class_fallback,
        )?,
    })
}

fn load_intelligence(store: &dyn ConfigStore) -> Result<IntelligenceThresholds, ConfigError> {
    let d = IntelligenceThresholds::default();
    let section = "thresholds.intelligence";
    Ok(IntelligenceThresholds {
        starlink_obstruction_threshold: opt_or(
            store,
            section,
            "starlink_obstruction_threshold",
            d.starlink_obstruction_threshold,
        )?,
        cellular_signal_threshold: opt_or(
            store,
            section,
            "cellular_signal_threshold",
            d.cellular_signal_threshold,
        )?,
        latency_degradation_threshold: opt_or(
            store,
            section,
            "latency_degradation_threshold",
            d.latency_degradation_threshold,
        )?,
        loss_threshold: opt_or(store, section, "loss_threshold", d.loss_threshold)?,
    })
}

fn load_starlink_api(store: &dyn ConfigStore) -> Result<StarlinkApiConfig, ConfigError> {
    let d = StarlinkApiConfig::default();
    Ok(StarlinkApiConfig {
        host: get(store, "starlink.api", "host")?.unwrap_or(d.host),
        port: opt_or(store, "starlink.api", "port", d.port)?,
        timeout_s: opt_or(store, "starlink.api", "timeout_s", d.timeout_s)?,
    })
}

fn load_sampler_bounds(store: &dyn ConfigStore) -> Result<SamplerBounds, ConfigError> {
    let d = SamplerBounds::default();
    Ok(SamplerBounds {
        min_interval_s: opt_or(store, "sampler", "min_interval_s", d.min_interval_s)?,
        max_interval_s: opt_or(store, "sampler", "max_interval_s", d.max_interval_s)?,
    })
}

/// Read every `member.<name>` section into a validated [`MemberPolicy`].
pub fn load_member_policies(store: &dyn ConfigStore) -> Result<Vec<MemberPolicy>, ConfigError> {
    let all = store
        .show("member")
        .map_err(|e| ConfigError::Malformed(format!("reading member sections: {e}")))?;

    let mut by_name: HashMap<String, HashMap<String, String>> = HashMap::new();
    for (key, value) in all {
        let Some((name, field)) = key.split_once('.') else {
            continue;
        };
        by_name
            .entry(name.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    let mut names: Vec<&String> = by_name.keys().collect();
    names.sort();

    let mut policies = Vec::with_capacity(by_name.len());
    for name in names {
        let fields = &by_name[name];
        let section = format!("member.{name}");

        let class_raw = fields.get("class").ok_or_else(|| ConfigError::MissingKey {
            section: section.clone(),
            key: "class".to_string(),
        })?;
        let class: Class = class_raw
            .parse()
            .map_err(|_| ConfigError::UnknownClass(class_raw.clone()))?;

        let weight: i32 = fields
            .get("weight")
            .map(|v| parse(&section, "weight", v))
            .transpose()?
            .unwrap_or(class.fallback_weight());
        if !(0..=100).contains(&weight) {
            return Err(ConfigError::InvalidThreshold {
                name: format!("{section}.weight"),
                reason: format!("{weight} out of range 0-100"),
            });
        }

        let metric: i32 = fields
            .get("metric")
            .map(|v| parse(&section, "metric", v))
            .transpose()?
            .unwrap_or(1);

        let probes = fields
            .get("probes")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        policies.push(MemberPolicy {
            name: name.clone(),
            class,
            weight,
            metric,
            prefer_roaming: fields
                .get("prefer_roaming")
                .map(|v| v == "1" || v == "true")
                .unwrap_or(false),
            metered: fields
                .get("metered")
                .map(|v| v == "1" || v == "true")
                .unwrap_or(false),
            probes,
            up_threshold: fields.get("up_threshold").map(|v| parse(&section, "up_threshold", v)).transpose()?,
            down_threshold: fields.get("down_threshold").map(|v| parse(&section, "down_threshold", v)).transpose()?,
            min_rsrp_dbm: fields.get("min_rsrp_dbm").map(|v| parse(&section, "min_rsrp_dbm", v)).transpose()?,
            min_sinr_db: fields.get("min_sinr_db").map(|v| parse(&section, "min_sinr_db", v)).transpose()?,
        });
    }

    Ok(policies)
}

/// Every tunable surfaced through the host config schema, bundled with
/// per-member policy and the mwan-package name weights are sourced from.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub thresholds: Thresholds,
    pub starlink_api: StarlinkApiConfig,
    pub members: Vec<MemberPolicy>,
    pub mwan_package: String,
}

impl DaemonConfig {
    /// Parses and validates the full schema once. Any problem is a
    /// `ConfigError`; the daemon refuses to start (exit code 1, §6) or,
    /// on `reload`, keeps the previous snapshot in force (§7).
    pub fn load(store: &dyn ConfigStore) -> Result<Self, ConfigError> {
        let thresholds = Thresholds {
            main: load_main(store)?,
            failover: load_failover(store)?,
            restore: load_restore(store)?,
            weights: load_weight_policy(store)?,
            intelligence: load_intelligence(store)?,
            sampler: load_sampler_bounds(store)?,
        };
        let starlink_api = load_starlink_api(store)?;
        let members = load_member_policies(store)?;
        let mwan_package = get(store, "main", "mwan_package")?
            .unwrap_or_else(|| DEFAULT_MWAN_PACKAGE.to_string());

        if thresholds.restore.min_duration_s == 0 {
            return Err(ConfigError::InvalidThreshold {
                name: "thresholds.restore.min_duration_s".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(DaemonConfig {
            thresholds,
            starlink_api,
            members,
            mwan_package,
        })
    }
}
