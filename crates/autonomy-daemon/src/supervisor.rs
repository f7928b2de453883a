//! Supervisor (§4.I): owns every shared component and the task tree that
//! drives them. Constructed once in `main`, then run to completion.
//!
//! Per §9's "dependency injection over package-level state" redesign
//! flag, nothing here is a `static`/`lazy_static` singleton — every
//! component is built in [`Supervisor::new`] and handed to the tasks
//! that need it as an `Arc`, the same shape the teacher's `AgentState`
//! takes in `strata-agent`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use autonomy_core::collectors::cellular::CellularCollector;
use autonomy_core::collectors::generic::GenericCollector;
use autonomy_core::collectors::starlink::StarlinkCollector;
use autonomy_core::collectors::wifi::WifiCollector;
use autonomy_core::collectors::Collector;
use autonomy_core::controller::Controller;
use autonomy_core::decision::{DecisionEngine, Urgency};
use autonomy_core::discovery::{Discovery, DataLimitConfigs, SkipReason};
use autonomy_core::host::{ConfigStore, IpcBus, RoutingMember};
use autonomy_core::model::{Class, Member};
use autonomy_core::sampler::{AdaptiveSampler, CollectionResult};
use autonomy_core::store::TelemetryStore;
use autonomy_core::weights::HybridWeightManager;
use chrono::Utc;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use crate::adapters::routing::MwanRoutingControl;
use crate::config::DaemonConfig;
use crate::ipc_server::{err, ok, IpcCall, IpcRequest};
use crate::net_config;
use crate::stats::{Counters, SystemStats};

/// How often Discovery re-derives the working member set from scratch.
/// Deliberately much slower than the per-member collection cadence —
/// topology rarely changes, and each pass does blocking host I/O.
const DISCOVERY_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline given to every collector round. Generous relative to the
/// fastest base interval (`Class::Starlink` polls every 5s) so a single
/// slow probe degrades a sample's quality rather than starving the
/// member of telemetry entirely.
const COLLECTOR_DEADLINE: Duration = Duration::from_secs(3);

pub struct Supervisor {
    config_store: Arc<dyn ConfigStore>,
    bus: Arc<dyn IpcBus>,
    routing: Arc<MwanRoutingControl>,
    store: Arc<TelemetryStore>,
    weights: Arc<HybridWeightManager>,
    sampler: Arc<AdaptiveSampler>,
    decision: Arc<DecisionEngine>,
    controller: Arc<Controller>,
    counters: Arc<Counters>,
    system_stats: Arc<SystemStats>,
    members: std::sync::Mutex<Vec<Member>>,
    config: std::sync::Mutex<DaemonConfig>,
    recheck: Notify,
    poll_interval: Duration,
}

fn build_collectors(config: &DaemonConfig, bus: Arc<dyn IpcBus>) -> HashMap<Class, Arc<dyn Collector>> {
    let mut map: HashMap<Class, Arc<dyn Collector>> = HashMap::new();
    map.insert(
        Class::Starlink,
        Arc::new(StarlinkCollector::new(config.starlink_api.clone())),
    );
    map.insert(Class::Cellular, Arc::new(CellularCollector::new(bus.clone())));
    map.insert(Class::Wifi, Arc::new(WifiCollector::new(bus)));
    map.insert(Class::Lan, Arc::new(GenericCollector::new()));
    map.insert(Class::Other, Arc::new(GenericCollector::new()));
    map
}

/// `100.64.0.0/10`, the CGNAT range Starlink's consumer routers hand out
/// to the WAN side of a dish-fed uplink.
fn is_cgnat_ipv4(ip: &str) -> bool {
    let Ok(addr) = ip.parse::<std::net::Ipv4Addr>() else {
        return false;
    };
    let [a, b, ..] = addr.octets();
    a == 100 && (64..=127).contains(&b)
}

fn reaches_starlink_api(host: &str, port: u16) -> bool {
    let Ok(addr) = format!("{host}:{port}").parse::<SocketAddr>() else {
        return false;
    };
    std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(300)).is_ok()
}

/// Overlay the daemon's own `member.<name>` operator policy (class,
/// roaming/metered flags, active probe targets) onto the topology-driven
/// member Discovery built. Weight and metric stay sourced from the
/// multi-WAN policy package — §6: "weights are read from the multi-WAN
/// policy package, not the daemon's package".
fn apply_member_policies(members: &mut [Member], policies: &[autonomy_core::config::MemberPolicy]) {
    let by_name: HashMap<&str, &autonomy_core::config::MemberPolicy> =
        policies.iter().map(|p| (p.name.as_str(), p)).collect();
    for member in members.iter_mut() {
        if let Some(policy) = by_name.get(member.name.as_str()) {
            member.class = policy.class;
            member.prefer_roaming = policy.prefer_roaming;
            member.metered = policy.metered;
            if !policy.probes.is_empty() {
                member.probes = policy.probes.clone();
            }
        }
    }
}

impl Supervisor {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        bus: Arc<dyn IpcBus>,
        routing: Arc<MwanRoutingControl>,
        config: DaemonConfig,
    ) -> Arc<Self> {
        let thresholds = config.thresholds;
        let store = Arc::new(TelemetryStore::new(
            thresholds.main.retention_hours,
            thresholds.main.max_ram_mb,
        ));
        let weights = Arc::new(HybridWeightManager::new(thresholds.weights));
        let sampler = Arc::new(AdaptiveSampler::new(thresholds.sampler));
        let decision = Arc::new(DecisionEngine::new(thresholds));
        let controller = Arc::new(Controller::new(
            thresholds.main.cooldown_s,
            thresholds.main.min_uptime_s,
            routing.current_member().ok().flatten(),
        ));
        let poll_interval = Duration::from_millis(thresholds.main.poll_interval_ms);

        Arc::new(Supervisor {
            config_store,
            bus,
            routing,
            store,
            weights,
            sampler,
            decision,
            controller,
            counters: Arc::new(Counters::default()),
            system_stats: Arc::new(SystemStats::new()),
            members: std::sync::Mutex::new(Vec::new()),
            config: std::sync::Mutex::new(config),
            recheck: Notify::new(),
            poll_interval,
        })
    }

    fn mwan_package(&self) -> String {
        self.config.lock().unwrap().mwan_package.clone()
    }

    /// Runs the topology-first discovery algorithm plus the CGNAT/dish
    /// reachability probes it needs. All host I/O here is synchronous;
    /// callers run this inside `spawn_blocking`.
    fn discovery_pass(&self) -> (Vec<Member>, Vec<(String, SkipReason)>) {
        let config = self.config.lock().unwrap().clone();
        let logicals = net_config::load_logical_interfaces(&*self.config_store, "network")
            .unwrap_or_default();
        let policy_members =
            net_config::load_policy_members(&*self.config_store, &config.mwan_package)
                .unwrap_or_default();
        let data_limits = DataLimitConfigs(
            net_config::load_data_limits(&*self.config_store).unwrap_or_default(),
        );

        let host = config.starlink_api.host.clone();
        let port = config.starlink_api.port;

        let (mut members, skipped) = Discovery::discover(
            &logicals,
            |name| self.bus.interface_state(name).unwrap_or_default(),
            |li| {
                let state = self.bus.interface_state(&li.name).unwrap_or_default();
                state.ipv4_addresses.iter().any(|ip| is_cgnat_ipv4(ip))
            },
            |_li| reaches_starlink_api(&host, port),
            |li| self.bus.modem_status(&li.device).is_ok(),
            &policy_members,
            &data_limits,
        );

        apply_member_policies(&mut members, &config.members);

        if let Ok(w) = autonomy_core::discovery::read_policy_weights(
            &*self.config_store,
            &config.mwan_package,
        ) {
            self.weights.load_originals(w);
        }
        for member in members.iter_mut() {
            member.effective_weight = self.weights.effective_weight(&member.name, member.class);
        }

        (members, skipped)
    }

    async fn run_discovery_loop(self: Arc<Self>) {
        let mut collector_tasks: HashMap<String, JoinHandle<()>> = HashMap::new();
        let mut ticker = tokio::time::interval(DISCOVERY_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.recheck.notified() => {}
            }

            let this = self.clone();
            let (members, skipped) = match tokio::task::spawn_blocking(move || this.discovery_pass()).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(error = %e, "discovery pass panicked");
                    continue;
                }
            };

            for (name, reason) in &skipped {
                tracing::debug!(member = %name, reason = %reason, "member skipped by discovery");
            }
            tracing::info!(members = members.len(), skipped = skipped.len(), "discovery pass complete");

            self.routing.set_known_members(
                members
                    .iter()
                    .map(|m| RoutingMember {
                        name: m.name.clone(),
                        logical_interface: m.iface.clone(),
                    })
                    .collect(),
            );

            let collectors = build_collectors(&self.config.lock().unwrap().clone(), self.bus.clone());
            let current_names: std::collections::HashSet<String> =
                members.iter().map(|m| m.name.clone()).collect();

            collector_tasks.retain(|name, handle| {
                if current_names.contains(name) {
                    true
                } else {
                    handle.abort();
                    false
                }
            });

            for member in &members {
                if collector_tasks.contains_key(&member.name) {
                    continue;
                }
                let Some(collector) = collectors.get(&member.class).cloned() else {
                    continue;
                };
                let supervisor = self.clone();
                let member = member.clone();
                let name = member.name.clone();
                let handle = tokio::spawn(async move {
                    supervisor.run_collector(collector, member).await;
                });
                collector_tasks.insert(name, handle);
            }

            *self.members.lock().unwrap() = members;
        }
    }

    async fn run_collector(&self, collector: Arc<dyn Collector>, member: Member) {
        loop {
            let started = std::time::Instant::now();
            let sample = collector.collect(&member, COLLECTOR_DEADLINE).await;
            let processing_time = started.elapsed();

            if sample.quality == 0.0 {
                self.counters.collector_failure(member.class);
                tracing::debug!(member = %member.name, "collector returned an unreachable sample");
            }
            self.store.add_sample(sample);
            self.sampler.record_result(
                &member.name,
                CollectionResult {
                    processing_time,
                    queue_depth: 0,
                    data_usage_mbph: 0.0,
                },
            );

            let interval = self.sampler.next_interval(&member, Utc::now());
            tokio::time::sleep(interval).await;
        }
    }

    /// Feeds whole-host CPU and battery state into the Adaptive Sampler.
    /// Runs on its own slow clock — these are host-wide, not per-member,
    /// signals, so there is no benefit to sampling them on every collector
    /// round.
    async fn run_system_stats_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            let cpu_pct = self.system_stats.cpu_pct();
            let battery_low = self.system_stats.battery_low();
            self.sampler.record_system_stats(cpu_pct, battery_low);
        }
    }

    async fn run_decision_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.recheck.notified() => {}
            }
            self.decide_and_apply();
        }
    }

    fn decide_and_apply(&self) {
        let members = self.members.lock().unwrap().clone();
        if members.is_empty() {
            return;
        }
        let now = Utc::now();
        let current = self.controller.current();

        let mut decision = self.decision.decide(
            now,
            &members,
            current.as_deref(),
            &self.store,
            &self.weights,
            Urgency::Normal,
        );
        if decision.is_none() {
            decision = self.decision.decide(
                now,
                &members,
                current.as_deref(),
                &self.store,
                &self.weights,
                Urgency::Emergency,
            );
        }
        let Some(decision) = decision else {
            return;
        };

        let Some(candidate) = members.iter().find(|m| m.name == decision.chosen_member) else {
            return;
        };

        let was_current = self.controller.current();
        match self.controller.apply(&decision, candidate, &*self.routing, now) {
            Ok(()) => {
                if was_current.as_deref() != Some(decision.chosen_member.as_str()) {
                    self.counters.switches_total.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    if decision.predictive {
                        self.counters
                            .predictive_triggers_total
                            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                    self.controller.record_switch_event(&self.store, &decision);
                    tracing::info!(
                        to = %decision.chosen_member,
                        reason = %decision.reason,
                        predictive = decision.predictive,
                        "switched active member"
                    );
                }
            }
            Err(autonomy_core::error::ControllerError::HostRejected { source, .. }) => {
                tracing::warn!(member = %decision.chosen_member, error = %source, "host rejected switch");
                self.controller.penalize_failed_switch(
                    candidate,
                    &self.weights,
                    self.config.lock().unwrap().thresholds.weights.emergency_adjustment_duration_s,
                );
            }
            Err(e) => {
                tracing::debug!(member = %decision.chosen_member, error = %e, "switch deferred");
            }
        }
    }

    async fn run_ipc_loop(self: Arc<Self>, mut ipc_rx: mpsc::Receiver<IpcCall>) {
        while let Some(call) = ipc_rx.recv().await {
            let response = self.handle_ipc(call.request);
            let _ = call.reply.send(response);
        }
    }

    /// Observability-only seconds-to-failure estimate for `name`, if it
    /// is currently known and the decision engine has a trend for it.
    fn ttf_estimate_for(&self, name: &str) -> Option<f64> {
        let members = self.members.lock().unwrap();
        let member = members.iter().find(|m| m.name == name)?;
        let intel = self.config.lock().unwrap().thresholds.intelligence;
        self.decision.ttf_estimate_s(member, &intel)
    }

    fn handle_ipc(&self, request: IpcRequest) -> serde_json::Value {
        match request {
            IpcRequest::Status => {
                let members = self.members.lock().unwrap();
                ok(serde_json::json!({
                    "current_member": self.controller.current(),
                    "member_count": members.len(),
                    "counters": self.counters.snapshot(),
                }))
            }
            IpcRequest::Members => {
                let members = self.members.lock().unwrap();
                let payload: Vec<_> = members
                    .iter()
                    .map(|m| {
                        serde_json::json!({
                            "name": m.name,
                            "class": m.class.to_string(),
                            "effective_weight": m.effective_weight,
                            "eligible": m.eligible,
                            "is_current": self.controller.current().as_deref() == Some(m.name.as_str()),
                        })
                    })
                    .collect();
                ok(serde_json::json!(payload))
            }
            IpcRequest::Metrics { member } => match member {
                Some(name) => match self.store.latest_sample(&name) {
                    Some(sample) => ok(serde_json::json!({
                        "sample": sample,
                        "ttf_estimate_s": self.ttf_estimate_for(&name),
                    })),
                    None => err(format!("no telemetry recorded for `{name}`")),
                },
                None => {
                    let names = self.store.members();
                    let payload: HashMap<_, _> = names
                        .into_iter()
                        .filter_map(|n| {
                            self.store.latest_sample(&n).map(|sample| {
                                (
                                    n.clone(),
                                    serde_json::json!({
                                        "sample": sample,
                                        "ttf_estimate_s": self.ttf_estimate_for(&n),
                                    }),
                                )
                            })
                        })
                        .collect();
                    ok(serde_json::to_value(payload).unwrap_or_default())
                }
            },
            IpcRequest::Events { since, limit } => {
                let since = since.unwrap_or_else(|| Utc::now() - chrono::Duration::hours(24));
                let events = self.store.get_events(since, limit);
                ok(serde_json::to_value(events).unwrap_or_default())
            }
            IpcRequest::Failover { member, reason } => {
                let members = self.members.lock().unwrap().clone();
                let Some(candidate) = members.iter().find(|m| m.name == member) else {
                    return err(format!("unknown member `{member}`"));
                };
                let decision = autonomy_core::model::Decision {
                    chosen_member: member.clone(),
                    reason: format!("operator_requested: {reason}"),
                    taken_at: Utc::now(),
                    predecessor: self.controller.current(),
                    predictive: true,
                    ttf_estimate_s: None,
                };
                match self.controller.apply(&decision, candidate, &*self.routing, Utc::now()) {
                    Ok(()) => {
                        self.controller.record_switch_event(&self.store, &decision);
                        ok(serde_json::json!({ "switched_to": member }))
                    }
                    Err(e) => err(e.to_string()),
                }
            }
            IpcRequest::Restore => {
                self.weights.restore_all();
                ok(serde_json::json!({ "restored": true }))
            }
            IpcRequest::Recheck => {
                self.recheck.notify_waiters();
                ok(serde_json::json!({ "rechecked": true }))
            }
            IpcRequest::Reload => match DaemonConfig::load(&*self.config_store) {
                Ok(new_config) => {
                    *self.config.lock().unwrap() = new_config;
                    self.recheck.notify_waiters();
                    ok(serde_json::json!({ "reloaded": true }))
                }
                Err(e) => err(format!("keeping previous configuration: {e}")),
            },
        }
    }

    /// Runs every task to completion; returns once `shutdown` fires.
    pub async fn run(self: Arc<Self>, ipc_rx: mpsc::Receiver<IpcCall>, mut shutdown: watch::Receiver<bool>) {
        let discovery = tokio::spawn(self.clone().run_discovery_loop());
        let decision = tokio::spawn(self.clone().run_decision_loop());
        let ipc = tokio::spawn(self.clone().run_ipc_loop(ipc_rx));
        let stats = tokio::spawn(self.clone().run_system_stats_loop());

        let _ = shutdown.changed().await;
        tracing::info!("supervisor shutting down");
        discovery.abort();
        decision.abort();
        ipc.abort();
        stats.abort();
    }

    pub fn mwan_package_name(&self) -> String {
        self.mwan_package()
    }
}

