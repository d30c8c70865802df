use analysis_hub::config::HubConfig;
use analysis_hub::errors::{hub_error::HubError, service_error::ServiceError};
use analysis_hub::hub::SseManager;
use analysis_hub::hub::health::HealthPatch;
use analysis_hub::models::identity::{Identity, Role};
use analysis_hub::models::metrics::{AggregateMetrics, AnalysisMetrics};
use analysis_hub::models::permission::Permission;
use analysis_hub::models::snapshot::{ResourceRecord, SnapshotData};
use analysis_hub::services::{AccessControl, IdentityStore, MetricsSource, SnapshotSource};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Default)]
struct FakeDirectory {
    roles: Mutex<HashMap<String, Role>>,
    accessible_analyses: Mutex<HashMap<String, HashSet<String>>>,
    accessible_teams: Mutex<HashMap<String, HashSet<String>>>,
    authorized: Mutex<HashMap<String, HashSet<String>>>,
    denied_topics: Mutex<HashSet<String>>,
    snapshot: Mutex<SnapshotData>,
    metrics: Mutex<AggregateMetrics>,
}

impl FakeDirectory {
    fn set_role(&self, user_id: &str, role: Role) {
        self.roles
            .lock()
            .unwrap()
            .insert(user_id.to_string(), role);
    }

    fn set_accessible_analyses(&self, user_id: &str, ids: &[&str]) {
        self.accessible_analyses.lock().unwrap().insert(
            user_id.to_string(),
            ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    fn set_authorized(&self, resource_id: &str, users: &[&str]) {
        self.authorized.lock().unwrap().insert(
            resource_id.to_string(),
            users.iter().map(|user| user.to_string()).collect(),
        );
    }

    fn deny_topic(&self, topic: &str) {
        self.denied_topics.lock().unwrap().insert(topic.to_string());
    }
}

#[async_trait]
impl IdentityStore for FakeDirectory {
    async fn fetch_identity(&self, user_id: &str) -> Result<Identity, ServiceError> {
        let role = self
            .roles
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .unwrap_or(Role::Member);
        Ok(Identity::new(user_id, role))
    }
}

#[async_trait]
impl AccessControl for FakeDirectory {
    async fn accessible_ids(
        &self,
        user_id: &str,
        permission: Permission,
    ) -> Result<HashSet<String>, ServiceError> {
        let map = match permission {
            Permission::ViewAnalysis => self.accessible_analyses.lock().unwrap(),
            Permission::ViewTeam => self.accessible_teams.lock().unwrap(),
        };
        Ok(map.get(user_id).cloned().unwrap_or_default())
    }

    async fn authorized_users(
        &self,
        resource_id: &str,
        _permission: Permission,
    ) -> Result<HashSet<String>, ServiceError> {
        Ok(self
            .authorized
            .lock()
            .unwrap()
            .get(resource_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn can_subscribe(&self, _user_id: &str, topic: &str) -> bool {
        !self.denied_topics.lock().unwrap().contains(topic)
    }
}

#[async_trait]
impl SnapshotSource for FakeDirectory {
    async fn full_snapshot(&self) -> Result<SnapshotData, ServiceError> {
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

#[async_trait]
impl MetricsSource for FakeDirectory {
    async fn aggregate(&self) -> Result<AggregateMetrics, ServiceError> {
        Ok(self.metrics.lock().unwrap().clone())
    }
}

fn quiet_config() -> HubConfig {
    HubConfig {
        heartbeat_interval: Duration::from_secs(3600),
        stale_after: Duration::from_secs(3600),
        metrics_interval: Duration::from_secs(3600),
        logout_grace: Duration::from_millis(50),
    }
}

fn new_hub(config: HubConfig, directory: Arc<FakeDirectory>) -> Arc<SseManager> {
    SseManager::new(
        config,
        directory.clone(),
        directory.clone(),
        directory.clone(),
        directory,
    )
}

/// Pulls every queued frame and parses the JSON after the `data: ` prefix.
fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut bodies = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        let json = frame
            .strip_prefix("data: ")
            .expect("frame missing data prefix")
            .trim_end();
        bodies.push(serde_json::from_str(json).unwrap());
    }
    bodies
}

fn of_kind<'a>(bodies: &'a [Value], kind: &str) -> Vec<&'a Value> {
    bodies.iter().filter(|body| body["type"] == kind).collect()
}

#[tokio::test]
async fn send_to_user_reaches_every_session_of_that_user() {
    let directory = Arc::new(FakeDirectory::default());
    let hub = new_hub(quiet_config(), directory);

    let (_, mut rx1) = hub.add_session(Identity::new("u1", Role::Member));
    let (_, mut rx2) = hub.add_session(Identity::new("u1", Role::Member));
    let (_, mut rx3) = hub.add_session(Identity::new("u2", Role::Member));

    let envelope = analysis_hub::message::Envelope::new(
        analysis_hub::message::EventKind::AnalysisUpdate,
        json!({ "ping": true }),
    );
    assert_eq!(hub.send_to_user("u1", &envelope), 2);

    assert_eq!(of_kind(&drain(&mut rx1), "analysisUpdate").len(), 1);
    assert_eq!(of_kind(&drain(&mut rx2), "analysisUpdate").len(), 1);
    assert_eq!(of_kind(&drain(&mut rx3), "analysisUpdate").len(), 0);
}

#[tokio::test]
async fn broadcast_to_admins_only_hits_privileged_sessions() {
    let directory = Arc::new(FakeDirectory::default());
    let hub = new_hub(quiet_config(), directory);

    let (_, mut admin_rx) = hub.add_session(Identity::new("boss", Role::Admin));
    let (_, mut rx1) = hub.add_session(Identity::new("u1", Role::Member));
    let (_, mut rx2) = hub.add_session(Identity::new("u2", Role::Member));

    let delivered = hub.notify_admin_event(
        analysis_hub::message::EventKind::AnalysisUpdate,
        json!({ "x": 1 }),
    );
    assert_eq!(delivered, 1);

    assert_eq!(of_kind(&drain(&mut admin_rx), "analysisUpdate").len(), 1);
    assert_eq!(of_kind(&drain(&mut rx1), "analysisUpdate").len(), 0);
    assert_eq!(of_kind(&drain(&mut rx2), "analysisUpdate").len(), 0);
}

#[tokio::test]
async fn subscribe_reports_denied_topics_without_registering_them() {
    let directory = Arc::new(FakeDirectory::default());
    directory.deny_topic("job-7");
    let hub = new_hub(quiet_config(), directory);

    let (session_id, _rx) = hub.add_session(Identity::new("u1", Role::Member));

    let outcome = hub
        .subscribe(&session_id, vec!["job-1".to_string(), "job-7".to_string()])
        .await
        .unwrap();
    assert_eq!(outcome.subscribed, vec!["job-1"]);
    assert_eq!(outcome.denied, vec!["job-7"]);

    let envelope = analysis_hub::message::Envelope::new(
        analysis_hub::message::EventKind::Log,
        json!({ "chunk": "x" }),
    );
    assert_eq!(hub.broadcast_topic("job-7", &envelope), 0);
    assert_eq!(hub.broadcast_topic("job-1", &envelope), 1);
}

#[tokio::test]
async fn subscribe_is_idempotent_per_topic() {
    let directory = Arc::new(FakeDirectory::default());
    let hub = new_hub(quiet_config(), directory);

    let (session_id, _rx) = hub.add_session(Identity::new("u1", Role::Member));

    hub.subscribe(&session_id, vec!["job-42".to_string()])
        .await
        .unwrap();
    let outcome = hub
        .subscribe(&session_id, vec!["job-42".to_string()])
        .await
        .unwrap();
    assert_eq!(outcome.subscribed, vec!["job-42"]);
    assert!(outcome.denied.is_empty());

    // still exactly one member
    assert_eq!(hub.publish_analysis_log("job-42", "line"), 1);
}

#[tokio::test]
async fn disconnect_empties_topic_channels() {
    let directory = Arc::new(FakeDirectory::default());
    let hub = new_hub(quiet_config(), directory);

    let (session_id, rx) = hub.add_session(Identity::new("u1", Role::Member));
    hub.subscribe(&session_id, vec!["job-42".to_string()])
        .await
        .unwrap();

    drop(rx);
    hub.remove_session(&session_id);

    assert_eq!(hub.publish_analysis_log("job-42", "line"), 0);
    assert_eq!(hub.stats().total_sessions, 0);
}

#[tokio::test]
async fn unsubscribe_reports_dropped_topics() {
    let directory = Arc::new(FakeDirectory::default());
    let hub = new_hub(quiet_config(), directory);

    let (session_id, _rx) = hub.add_session(Identity::new("u1", Role::Member));
    hub.subscribe(&session_id, vec!["job-1".to_string(), "job-2".to_string()])
        .await
        .unwrap();

    let unsubscribed = hub
        .unsubscribe(&session_id, vec!["job-1".to_string(), "job-9".to_string()])
        .unwrap();
    assert_eq!(unsubscribed, vec!["job-1"]);

    assert_eq!(hub.publish_analysis_log("job-1", "line"), 0);
    assert_eq!(hub.publish_analysis_log("job-2", "line"), 1);
}

#[tokio::test]
async fn operations_on_unknown_sessions_are_not_fatal() {
    let directory = Arc::new(FakeDirectory::default());
    let hub = new_hub(quiet_config(), directory);

    assert!(!hub.remove_session("nope"));
    assert!(matches!(
        hub.subscribe("nope", vec!["job-1".to_string()]).await,
        Err(HubError::UnknownSession(_))
    ));
    assert!(matches!(
        hub.unsubscribe("nope", vec!["job-1".to_string()]),
        Err(HubError::UnknownSession(_))
    ));
}

#[tokio::test]
async fn failed_write_removes_only_the_failing_session() {
    let directory = Arc::new(FakeDirectory::default());
    let hub = new_hub(quiet_config(), directory);

    let (_, mut rx1) = hub.add_session(Identity::new("u1", Role::Member));
    let (_, rx2) = hub.add_session(Identity::new("u2", Role::Member));
    let (_, mut rx3) = hub.add_session(Identity::new("u3", Role::Member));

    // u2's client hung up without signaling
    drop(rx2);

    let delivered = hub.broadcast_status_update();
    assert_eq!(delivered, 2);

    let stats = hub.stats();
    assert_eq!(stats.total_sessions, 2);
    assert!(!stats.per_user_counts.contains_key("u2"));

    assert_eq!(of_kind(&drain(&mut rx1), "statusUpdate").len(), 1);
    assert_eq!(of_kind(&drain(&mut rx3), "statusUpdate").len(), 1);
}

#[tokio::test]
async fn heartbeat_reaches_live_sessions() {
    let directory = Arc::new(FakeDirectory::default());
    let mut config = quiet_config();
    config.heartbeat_interval = Duration::from_millis(30);
    let hub = new_hub(config, directory);

    let (_, mut rx) = hub.add_session(Identity::new("u1", Role::Member));

    tokio::time::sleep(Duration::from_millis(110)).await;

    let bodies = drain(&mut rx);
    assert!(of_kind(&bodies, "heartbeat").len() >= 2);
    assert_eq!(hub.stats().total_sessions, 1);
}

#[tokio::test]
async fn sweep_reaps_sessions_outside_the_staleness_window() {
    let directory = Arc::new(FakeDirectory::default());
    let mut config = quiet_config();
    config.heartbeat_interval = Duration::from_millis(40);
    config.stale_after = Duration::from_millis(1);
    let hub = new_hub(config, directory);

    let (_, mut rx) = hub.add_session(Identity::new("u1", Role::Member));

    tokio::time::sleep(Duration::from_millis(120)).await;

    // reaped on the first sweep, before that tick's heartbeat went out
    assert_eq!(hub.stats().total_sessions, 0);
    let bodies = drain(&mut rx);
    assert_eq!(of_kind(&bodies, "heartbeat").len(), 0);
    assert_eq!(of_kind(&bodies, "connection").len(), 1);
}

#[tokio::test]
async fn snapshot_is_filtered_to_the_accessible_set() {
    let directory = Arc::new(FakeDirectory::default());
    directory.set_accessible_analyses("u1", &["a1"]);
    *directory.snapshot.lock().unwrap() = SnapshotData {
        analyses: vec![
            ResourceRecord::new("a1", json!({ "name": "first" })),
            ResourceRecord::new("a2", json!({ "name": "second" })),
            ResourceRecord::new("a3", json!({ "name": "third" })),
        ],
        teams: vec![ResourceRecord::new("t1", json!({ "name": "core" }))],
        team_tree: json!({ "t1": { "children": [] }, "t2": { "children": [] } }),
    };
    let hub = new_hub(quiet_config(), directory);

    let (session_id, mut rx) = hub.add_session(Identity::new("u1", Role::Member));
    hub.send_initial_snapshot(&session_id).await;

    let bodies = drain(&mut rx);
    let init = of_kind(&bodies, "init")[0];
    let analyses = init["analyses"].as_array().unwrap();
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0]["id"], "a1");
    // inaccessible teams are pruned from the folder tree too
    assert!(init["teamTree"].get("t2").is_none());
    assert_eq!(init["user"]["role"], "member");

    // init is followed by a status update
    assert_eq!(of_kind(&bodies, "statusUpdate").len(), 1);
}

#[tokio::test]
async fn snapshot_for_admin_is_unfiltered_and_uses_the_fresh_role() {
    let directory = Arc::new(FakeDirectory::default());
    directory.set_role("boss", Role::Admin);
    *directory.snapshot.lock().unwrap() = SnapshotData {
        analyses: vec![
            ResourceRecord::new("a1", json!({})),
            ResourceRecord::new("a2", json!({})),
        ],
        teams: vec![],
        team_tree: json!({}),
    };
    let hub = new_hub(quiet_config(), directory);

    // connected before the role was known to be privileged
    let (session_id, mut rx) = hub.add_session(Identity::new("boss", Role::Member));
    hub.send_initial_snapshot(&session_id).await;

    let bodies = drain(&mut rx);
    let init = of_kind(&bodies, "init")[0];
    assert_eq!(init["analyses"].as_array().unwrap().len(), 2);
    assert_eq!(init["user"]["role"], "admin");
}

#[tokio::test]
async fn permissions_change_pushes_refresh_and_a_corrected_snapshot() {
    let directory = Arc::new(FakeDirectory::default());
    directory.set_accessible_analyses("u1", &["a1"]);
    *directory.snapshot.lock().unwrap() = SnapshotData {
        analyses: vec![
            ResourceRecord::new("a1", json!({})),
            ResourceRecord::new("a2", json!({})),
        ],
        teams: vec![],
        team_tree: json!({}),
    };
    let hub = new_hub(quiet_config(), directory.clone());

    let (_, mut rx) = hub.add_session(Identity::new("u1", Role::Member));

    directory.set_accessible_analyses("u1", &["a1", "a2"]);
    hub.notify_user_permissions_changed("u1").await;

    let bodies = drain(&mut rx);
    assert_eq!(of_kind(&bodies, "refresh").len(), 1);
    let init = of_kind(&bodies, "init")[0];
    assert_eq!(init["analyses"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn snapshot_failure_keeps_the_connection_open() {
    struct FailingSnapshots;

    #[async_trait]
    impl SnapshotSource for FailingSnapshots {
        async fn full_snapshot(&self) -> Result<SnapshotData, ServiceError> {
            Err(ServiceError::Upstream("db down".to_string()))
        }
    }

    let directory = Arc::new(FakeDirectory::default());
    let hub = SseManager::new(
        quiet_config(),
        directory.clone(),
        directory.clone(),
        Arc::new(FailingSnapshots),
        directory,
    );

    let (session_id, mut rx) = hub.add_session(Identity::new("u1", Role::Member));
    hub.send_initial_snapshot(&session_id).await;

    let bodies = drain(&mut rx);
    assert_eq!(of_kind(&bodies, "init").len(), 0);
    assert_eq!(hub.stats().total_sessions, 1);
}

#[tokio::test]
async fn metrics_totals_are_rederived_per_recipient() {
    let directory = Arc::new(FakeDirectory::default());
    directory.set_role("boss", Role::Admin);
    directory.set_accessible_analyses("u1", &["a1"]);
    *directory.metrics.lock().unwrap() = AggregateMetrics {
        analyses: vec![
            AnalysisMetrics {
                analysis_id: "a1".to_string(),
                running: true,
                cpu_percent: 10.0,
                memory_bytes: 100,
            },
            AnalysisMetrics {
                analysis_id: "a2".to_string(),
                running: true,
                cpu_percent: 30.0,
                memory_bytes: 300,
            },
        ],
    };
    let hub = new_hub(quiet_config(), directory);

    let (_, mut member_rx) = hub.add_session(Identity::new("u1", Role::Member));
    let (_, mut admin_rx) = hub.add_session(Identity::new("boss", Role::Admin));

    hub.broadcast_metrics_update().await;

    let member_update = drain(&mut member_rx);
    let update = of_kind(&member_update, "metricsUpdate")[0];
    assert_eq!(update["analyses"].as_array().unwrap().len(), 1);
    assert_eq!(update["totals"]["memoryBytes"], 100);

    let admin_update = drain(&mut admin_rx);
    let update = of_kind(&admin_update, "metricsUpdate")[0];
    assert_eq!(update["analyses"].as_array().unwrap().len(), 2);
    assert_eq!(update["totals"]["memoryBytes"], 400);
}

#[tokio::test]
async fn authorized_broadcast_falls_back_to_global_without_a_resource() {
    let directory = Arc::new(FakeDirectory::default());
    directory.set_authorized("a1", &["u1"]);
    let hub = new_hub(quiet_config(), directory);

    let (_, mut rx1) = hub.add_session(Identity::new("u1", Role::Member));
    let (_, mut rx2) = hub.add_session(Identity::new("u2", Role::Member));

    assert_eq!(
        hub.notify_analysis_changed(Some("a1"), json!({ "status": "running" }))
            .await,
        1
    );
    assert_eq!(
        hub.notify_analysis_changed(None, json!({ "status": "running" }))
            .await,
        2
    );

    assert_eq!(of_kind(&drain(&mut rx1), "analysisUpdate").len(), 2);
    assert_eq!(of_kind(&drain(&mut rx2), "analysisUpdate").len(), 1);
}

#[tokio::test]
async fn forced_logout_notifies_then_closes_after_the_grace_period() {
    let directory = Arc::new(FakeDirectory::default());
    let hub = new_hub(quiet_config(), directory);

    let (_, mut rx1) = hub.add_session(Identity::new("u1", Role::Member));
    let (_, mut rx2) = hub.add_session(Identity::new("u1", Role::Member));
    let (_, _rx3) = hub.add_session(Identity::new("u2", Role::Member));

    hub.force_disconnect_user("u1", "Password changed");

    // terminal message is attempted before the close
    let bodies = drain(&mut rx1);
    let logout = of_kind(&bodies, "forceLogout")[0];
    assert_eq!(logout["reason"], "Password changed");
    assert_eq!(of_kind(&drain(&mut rx2), "forceLogout").len(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let stats = hub.stats();
    assert!(!stats.per_user_counts.contains_key("u1"));
    assert_eq!(stats.total_sessions, 1);
}

#[tokio::test]
async fn shutdown_disconnects_everything() {
    let directory = Arc::new(FakeDirectory::default());
    let hub = new_hub(quiet_config(), directory);

    hub.add_session(Identity::new("u1", Role::Member));
    hub.add_session(Identity::new("u2", Role::Member));

    hub.shutdown();

    let stats = hub.stats();
    assert_eq!(stats.total_sessions, 0);
    assert_eq!(stats.unique_users, 0);
}

#[tokio::test]
async fn health_update_broadcasts_a_status_update() {
    let directory = Arc::new(FakeDirectory::default());
    let hub = new_hub(quiet_config(), directory);

    let (_, mut rx) = hub.add_session(Identity::new("u1", Role::Member));

    let delivered = hub.update_health(HealthPatch {
        status: Some("degraded".to_string()),
        message: Some("Supervisor restarting".to_string()),
    });
    assert_eq!(delivered, 1);

    let bodies = drain(&mut rx);
    let status = of_kind(&bodies, "statusUpdate")[0];
    assert_eq!(status["status"], "degraded");
    assert_eq!(status["message"], "Supervisor restarting");
    assert_eq!(status["sessions"]["totalSessions"], 1);

    assert_eq!(hub.health().status, "degraded");
}
