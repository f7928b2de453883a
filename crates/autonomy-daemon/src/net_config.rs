//! Reads the two host config packages Discovery (§4.D) needs beyond the
//! daemon's own `autonomy` package: the network stack's logical interface
//! definitions (package `network`) and the multi-WAN policy's member
//! list (package `mwan3`-equivalent, named by [`DaemonConfig::mwan_package`]).
//!
//! Kept separate from [`crate::config`] because these two packages are
//! owned by other OpenWrt subsystems, not by this daemon — it only reads
//! them, the same "never written by the core" boundary `autonomy_core::host`
//! draws for the config store in general.

use std::collections::HashMap;

use autonomy_core::discovery::{LogicalInterface, PolicyMember};
use autonomy_core::error::HostAdapterError;
use autonomy_core::host::ConfigStore;
use autonomy_core::model::DataLimit;

fn group_by_name(flat: HashMap<String, String>) -> HashMap<String, HashMap<String, String>> {
    let mut by_name: HashMap<String, HashMap<String, String>> = HashMap::new();
    for (key, value) in flat {
        let Some((name, field)) = key.split_once('.') else {
            continue;
        };
        by_name
            .entry(name.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }
    by_name
}

/// Reads every `network.<name>` section into a [`LogicalInterface`].
/// Sections with no `proto` are skipped — nothing Discovery needs a
/// logical interface for would be missing it.
pub fn load_logical_interfaces(
    store: &dyn ConfigStore,
    package: &str,
) -> Result<Vec<LogicalInterface>, HostAdapterError> {
    let flat = store.show(package)?;
    let by_name = group_by_name(flat);

    let mut names: Vec<&String> = by_name.keys().collect();
    names.sort();

    let mut out = Vec::with_capacity(by_name.len());
    for name in names {
        let fields = &by_name[name];
        let Some(protocol) = fields.get("proto") else {
            continue;
        };
        out.push(LogicalInterface {
            name: name.clone(),
            protocol: protocol.clone(),
            device: fields.get("device").cloned().unwrap_or_default(),
            area_type: fields
                .get("area_type")
                .cloned()
                .unwrap_or_else(|| "wan".to_string()),
            auto_connect: fields
                .get("auto")
                .map(|v| v == "1" || v == "true")
                .unwrap_or(true),
        });
    }
    Ok(out)
}

/// Reads every `<package>.<name>` section of the multi-WAN policy
/// package into a [`PolicyMember`]. `weight` and `metric` default to the
/// values mwan3 itself defaults to when an operator omits them.
pub fn load_policy_members(
    store: &dyn ConfigStore,
    package: &str,
) -> Result<Vec<PolicyMember>, HostAdapterError> {
    let flat = store.show(package)?;
    let by_name = group_by_name(flat);

    let mut names: Vec<&String> = by_name.keys().collect();
    names.sort();

    let mut out = Vec::with_capacity(by_name.len());
    for name in names {
        let fields = &by_name[name];
        let Some(logical_interface) = fields.get("interface") else {
            continue;
        };
        out.push(PolicyMember {
            name: name.clone(),
            logical_interface: logical_interface.clone(),
            weight: fields
                .get("weight")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            metric: fields
                .get("metric")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
        });
    }
    Ok(out)
}

/// Merges per-member data-limit config (§3 `DataLimit`) read out of the
/// daemon's own `member.<name>` sections.
pub fn load_data_limits(
    store: &dyn ConfigStore,
) -> Result<HashMap<String, DataLimit>, HostAdapterError> {
    let flat = store.show("member")?;
    let by_name = group_by_name(flat);

    let mut out = HashMap::new();
    for (name, fields) in by_name {
        let enabled = fields
            .get("data_limit_enabled")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);
        if !enabled {
            continue;
        }
        let limit_mb = fields
            .get("data_limit_mb")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let current_usage_mb = fields
            .get("data_limit_usage_mb")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let reset_hour = fields
            .get("data_limit_reset_hour")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let days_until_reset = fields
            .get("data_limit_days_until_reset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        out.insert(
            name,
            DataLimit {
                enabled,
                limit_mb,
                current_usage_mb,
                reset_hour,
                days_until_reset,
            },
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FakeStore(StdMutex<HashMap<(String, String), String>>);

    impl FakeStore {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            let mut map = HashMap::new();
            for (section, key, value) in entries {
                map.insert((section.to_string(), key.to_string()), value.to_string());
            }
            FakeStore(StdMutex::new(map))
        }
    }

    impl ConfigStore for FakeStore {
        fn get(&self, section: &str, key: &str) -> Result<Option<String>, HostAdapterError> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .get(&(section.to_string(), key.to_string()))
                .cloned())
        }
        fn set(&self, _section: &str, _key: &str, _value: &str) -> Result<(), HostAdapterError> {
            Ok(())
        }
        fn commit(&self, _package: &str) -> Result<(), HostAdapterError> {
            Ok(())
        }
        fn show(&self, package: &str) -> Result<HashMap<String, String>, HostAdapterError> {
            let prefix = format!("{package}.");
            Ok(self
                .0
                .lock()
                .unwrap()
                .iter()
                .filter_map(|((section, key), value)| {
                    section
                        .strip_prefix(&prefix)
                        .map(|name| (format!("{name}.{key}"), value.clone()))
                })
                .collect())
        }
    }

    #[test]
    fn loads_logical_interfaces_skipping_sections_without_a_protocol() {
        let store = FakeStore::new(&[
            ("network.wan1", "proto", "dhcp"),
            ("network.wan1", "device", "eth1"),
            ("network.wan1", "area_type", "wan"),
            ("network.lo", "device", "lo"),
        ]);
        let ifaces = load_logical_interfaces(&store, "network").unwrap();
        assert_eq!(ifaces.len(), 1);
        assert_eq!(ifaces[0].name, "wan1");
        assert_eq!(ifaces[0].protocol, "dhcp");
    }

    #[test]
    fn loads_policy_members_with_defaults() {
        let store = FakeStore::new(&[
            ("mwan3.cell1", "interface", "wan2"),
            ("mwan3.cell1", "weight", "85"),
        ]);
        let members = load_policy_members(&store, "mwan3").unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].weight, 85);
        assert_eq!(members[0].metric, 1);
    }

    #[test]
    fn data_limits_skip_disabled_members() {
        let store = FakeStore::new(&[
            ("member.cell1", "data_limit_enabled", "1"),
            ("member.cell1", "data_limit_mb", "5000"),
            ("member.cell2", "data_limit_enabled", "0"),
        ]);
        let limits = load_data_limits(&store).unwrap();
        assert_eq!(limits.len(), 1);
        assert!(limits.contains_key("cell1"));
    }
}
