// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    actions::{Action, ActionError, ActionRegistry, CommandAction, LambdaAction},
    config,
    discovery::LambdaDiscovery,
    models::{ActionDescriptor, ActionStatus, HostRecord, HostTable, Outcome, STANDALONE_PORT, Target},
    scheduling::{RetryPolicy, Strategy},
    storage::{HostStore, InMemoryHostStore, StorageError},
};

use super::{OrchestratorHandle, OrchestratorPhase, Scheduler, SchedulerError};

type Calls = Arc<Mutex<Vec<String>>>;

fn recording(descriptor: ActionDescriptor, calls: &Calls, outcome: Outcome) -> Arc<dyn Action> {
    let calls = calls.clone();
    let name = descriptor.name.clone();
    Arc::new(LambdaAction::new(descriptor, move |target, _| {
        calls.lock().unwrap().push(format!("{name}@{target}"));
        Ok(outcome)
    }))
}

fn ssh() -> ActionDescriptor {
    ActionDescriptor::new("SSHBruteforce", 22)
}

fn steal() -> ActionDescriptor {
    ActionDescriptor::new("StealFilesSSH", 22).with_parent("SSHBruteforce")
}

fn vuln() -> ActionDescriptor {
    ActionDescriptor::new("NmapVulnScanner", STANDALONE_PORT)
}

fn host(mac: &str, ip: &str, ports: &[&str]) -> HostRecord {
    let mut record = HostRecord::new(mac, ip);
    record.alive = true;
    record.ports = ports.iter().map(|p| p.to_string()).collect();
    record
}

fn store(hosts: Vec<HostRecord>) -> Arc<InMemoryHostStore> {
    Arc::new(InMemoryHostStore::new(HostTable {
        action_columns: vec![],
        hosts,
    }))
}

/// Retries failures right away.
fn eager() -> RetryPolicy {
    RetryPolicy {
        failed_retry_delay: Duration::ZERO,
        ..Default::default()
    }
}

fn scheduler(
    config: config::Scheduler,
    policy: RetryPolicy,
    actions: Vec<Arc<dyn Action>>,
    store: Arc<dyn HostStore>,
) -> Scheduler {
    Scheduler::new(
        config,
        policy,
        ActionRegistry::new(actions).unwrap(),
        store,
        CancellationToken::new(),
    )
    .unwrap()
}

fn status(store: &InMemoryHostStore, mac: &str, action: &str) -> ActionStatus {
    store.load().unwrap().get(mac).unwrap().status(action)
}

fn calls(calls: &Calls) -> Vec<String> {
    calls.lock().unwrap().clone()
}

#[tokio::test]
async fn child_runs_after_parent_succeeded() {
    let log = Calls::default();
    let store = store(vec![host("aa", "10.0.0.1", &["22"])]);
    let scheduler = scheduler(
        Default::default(),
        RetryPolicy::default(),
        vec![
            recording(steal(), &log, Outcome::Success),
            recording(ssh(), &log, Outcome::Success),
        ],
        store.clone(),
    );
    let tally = scheduler.run_pass().await.unwrap();
    assert_eq!(tally.actions, 2);
    assert_eq!(
        calls(&log),
        vec!["SSHBruteforce@10.0.0.1:22", "StealFilesSSH@10.0.0.1:22"]
    );
    assert!(status(&store, "aa", "SSHBruteforce").is_success());
    assert!(status(&store, "aa", "StealFilesSSH").is_success());
    let table = store.load().unwrap();
    assert!(table.action_columns.contains(&"StealFilesSSH".to_owned()));

    // successes are retried after five minutes only
    assert_eq!(scheduler.run_pass().await.unwrap().total(), 0);
}

#[tokio::test]
async fn child_never_runs_before_parent() {
    let log = Calls::default();
    let store = store(vec![host("aa", "10.0.0.1", &["22"])]);
    let scheduler = scheduler(
        Default::default(),
        RetryPolicy::default(),
        vec![
            recording(ssh(), &log, Outcome::Failed),
            recording(steal(), &log, Outcome::Success),
        ],
        store.clone(),
    );
    scheduler.run_pass().await.unwrap();
    assert_eq!(calls(&log), vec!["SSHBruteforce@10.0.0.1:22"]);
    assert!(status(&store, "aa", "StealFilesSSH").is_never_attempted());
    assert_eq!(status(&store, "aa", "SSHBruteforce").failure_count(), 1);

    // the failure delay did not pass yet
    assert_eq!(scheduler.run_pass().await.unwrap().total(), 0);
}

#[tokio::test]
async fn no_creds_is_terminal() {
    let log = Calls::default();
    let store = store(vec![host("aa", "10.0.0.1", &["22"])]);
    let scheduler = scheduler(
        Default::default(),
        eager(),
        vec![
            recording(ssh(), &log, Outcome::NoCredsFound),
            recording(steal(), &log, Outcome::Success),
        ],
        store.clone(),
    );
    for _ in 0..3 {
        scheduler.run_pass().await.unwrap();
    }
    assert_eq!(calls(&log), vec!["SSHBruteforce@10.0.0.1:22"]);
    assert!(matches!(
        status(&store, "aa", "SSHBruteforce"),
        ActionStatus::NoCreds { .. }
    ));
}

#[tokio::test]
async fn failures_are_counted_until_max_retries() {
    let log = Calls::default();
    let store = store(vec![host("aa", "10.0.0.1", &["22"])]);
    let scheduler = scheduler(
        Default::default(),
        eager(),
        vec![recording(ssh(), &log, Outcome::Failed)],
        store.clone(),
    );
    for _ in 0..5 {
        scheduler.run_pass().await.unwrap();
    }
    assert_eq!(calls(&log).len(), 3);
    assert_eq!(status(&store, "aa", "SSHBruteforce").failure_count(), 3);
}

#[tokio::test]
async fn errors_are_recorded_as_failures() {
    let store = store(vec![host("aa", "10.0.0.1", &["22"])]);
    let failing: Arc<dyn Action> = Arc::new(LambdaAction::new(ssh(), |_, _| {
        Err(ActionError::Other("connection reset".to_owned()))
    }));
    let scheduler = scheduler(Default::default(), eager(), vec![failing], store.clone());
    assert_eq!(scheduler.run_pass().await.unwrap().actions, 1);
    assert_eq!(status(&store, "aa", "SSHBruteforce").failure_count(), 1);
    assert_eq!(scheduler.status().await.attacks, 1);
}

fn position(log: &[String], prefix: &str, last: bool) -> usize {
    let mut matching = log.iter().enumerate().filter(|(_, c)| c.starts_with(prefix));
    let found = if last { matching.last() } else { matching.next() };
    found.map(|(i, _)| i).unwrap()
}

async fn run_with(strategy: Strategy) -> Vec<String> {
    let log = Calls::default();
    let store = store(vec![
        host("aa", "10.0.0.1", &["22"]),
        host("bb", "10.0.0.2", &["22"]),
    ]);
    let config = config::Scheduler {
        attack_order: strategy,
        max_concurrent: 1,
        ..Default::default()
    };
    let scheduler = scheduler(
        config,
        RetryPolicy::default(),
        vec![recording(ssh(), &log, Outcome::Success)],
        store,
    )
    .with_vuln_scan(recording(vuln(), &log, Outcome::Success));
    let tally = scheduler.run_pass().await.unwrap();
    assert_eq!(tally.actions, 2, "{strategy}");
    assert_eq!(tally.vuln_scans, 2, "{strategy}");
    calls(&log)
}

#[tokio::test]
async fn spread_scans_after_all_parents() {
    let log = run_with(Strategy::Spread).await;
    assert!(position(&log, "SSHBruteforce", true) < position(&log, "NmapVulnScanner", false));
}

#[tokio::test]
async fn per_phase_scans_after_all_parents() {
    let log = run_with(Strategy::PerPhase).await;
    assert_eq!(
        log,
        vec![
            "SSHBruteforce@10.0.0.1:22",
            "SSHBruteforce@10.0.0.2:22",
            "NmapVulnScanner@10.0.0.1",
            "NmapVulnScanner@10.0.0.2",
        ]
    );
}

#[tokio::test]
async fn per_host_scans_after_parents_of_the_host() {
    let log = run_with(Strategy::PerHost).await;
    assert_eq!(log.len(), 4);
    for ip in ["10.0.0.1", "10.0.0.2"] {
        let parent = position(&log, &format!("SSHBruteforce@{ip}"), false);
        let scan = position(&log, &format!("NmapVulnScanner@{ip}"), false);
        assert!(parent < scan, "{log:?}");
    }
}

#[tokio::test]
async fn only_alive_hosts_within_target_network() {
    let log = Calls::default();
    let mut dead = host("cc", "10.0.0.3", &["22"]);
    dead.alive = false;
    let store = store(vec![
        host("aa", "10.0.0.1", &["22"]),
        host("bb", "192.168.1.1", &["22"]),
        dead,
    ]);
    let config = config::Scheduler {
        target_network: Some("10.0.0.0/24".to_owned()),
        ..Default::default()
    };
    let scheduler = scheduler(
        config,
        RetryPolicy::default(),
        vec![recording(ssh(), &log, Outcome::Success)],
        store,
    );
    scheduler.run_pass().await.unwrap();
    assert_eq!(calls(&log), vec!["SSHBruteforce@10.0.0.1:22"]);
}

#[tokio::test]
async fn disabled_phases_are_not_executed() {
    let log = Calls::default();
    let store = store(vec![host("aa", "10.0.0.1", &["22"])]);
    let config = config::Scheduler {
        run_vuln_scan: false,
        ..Default::default()
    };
    let scheduler = scheduler(
        config,
        RetryPolicy::default(),
        vec![recording(ssh(), &log, Outcome::Success)],
        store,
    )
    .with_vuln_scan(recording(vuln(), &log, Outcome::Success));
    scheduler.run_pass().await.unwrap();
    assert_eq!(calls(&log), vec!["SSHBruteforce@10.0.0.1:22"]);
}

#[tokio::test]
async fn idle_cycle_tries_standalone_actions_until_first_success() {
    let log = Calls::default();
    let scans = Arc::new(AtomicUsize::new(0));
    let counter = scans.clone();
    let store = store(vec![]);
    let scheduler = scheduler(
        Default::default(),
        RetryPolicy::default(),
        vec![
            recording(ActionDescriptor::new("A", STANDALONE_PORT), &log, Outcome::Failed),
            recording(ActionDescriptor::new("B", STANDALONE_PORT), &log, Outcome::Success),
            recording(ActionDescriptor::new("C", STANDALONE_PORT), &log, Outcome::Success),
        ],
        store.clone(),
    )
    .with_discovery(Arc::new(LambdaDiscovery::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })));
    assert_eq!(scheduler.run_cycle().await.unwrap(), 2);
    assert_eq!(scans.load(Ordering::SeqCst), 1);
    assert_eq!(calls(&log), vec!["A@standalone", "B@standalone"]);
    let table = store.load().unwrap();
    let standalone = table.hosts.iter().find(|h| h.is_standalone()).unwrap();
    assert!(standalone.status("B").is_success());
    assert_eq!(scheduler.status().await.idle_streak, 0);
}

#[tokio::test]
async fn idle_cycle_uses_fresh_discovery_results_and_tries_standalone() {
    let log = Calls::default();
    let store = store(vec![]);
    let discovered = store.clone();
    let scheduler = scheduler(
        Default::default(),
        RetryPolicy::default(),
        vec![
            recording(ssh(), &log, Outcome::Success),
            recording(ActionDescriptor::new("A", STANDALONE_PORT), &log, Outcome::Success),
        ],
        store,
    )
    .with_discovery(Arc::new(LambdaDiscovery::new(move || {
        let mut table = discovered.load().unwrap();
        if table.get("aa").is_none() {
            table.hosts.push(host("aa", "10.0.0.1", &["22"]));
        }
        discovered.store(&table).unwrap();
        Ok(())
    })));
    assert_eq!(scheduler.run_cycle().await.unwrap(), 2);
    assert_eq!(
        calls(&log),
        vec!["SSHBruteforce@10.0.0.1:22", "A@standalone"]
    );
}

#[tokio::test]
async fn nothing_to_do_is_idle() {
    let scheduler = scheduler(Default::default(), RetryPolicy::default(), vec![], store(vec![]));
    assert_eq!(scheduler.run_cycle().await.unwrap(), 0);
    assert_eq!(scheduler.run_cycle().await.unwrap(), 0);
    let status = scheduler.status().await;
    assert_eq!(status.phase, OrchestratorPhase::Idle);
    assert_eq!(status.idle_streak, 2);
}

struct SlowAction {
    descriptor: ActionDescriptor,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    executed: AtomicUsize,
}

#[async_trait]
impl Action for SlowAction {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    async fn execute(&self, _: &Target, _: &HostRecord) -> Result<Outcome, ActionError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(Outcome::Success)
    }
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let slow = Arc::new(SlowAction {
        descriptor: ssh(),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
        executed: AtomicUsize::new(0),
    });
    let hosts = (1..=5)
        .map(|i| host(&format!("mac{i}"), &format!("10.0.0.{i}"), &["22"]))
        .collect();
    let config = config::Scheduler {
        max_concurrent: 2,
        ..Default::default()
    };
    let scheduler = scheduler(
        config,
        RetryPolicy::default(),
        vec![slow.clone() as Arc<dyn Action>],
        store(hosts),
    );
    assert_eq!(scheduler.run_pass().await.unwrap().actions, 5);
    assert_eq!(slow.executed.load(Ordering::SeqCst), 5);
    assert_eq!(slow.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stops_while_idle() {
    let config = config::Scheduler {
        scan_interval: Duration::from_secs(3600),
        ..Default::default()
    };
    let mut handle = OrchestratorHandle::start(scheduler(
        config,
        RetryPolicy::default(),
        vec![],
        store(vec![]),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());
    handle.stop();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(handle.status().await.phase, OrchestratorPhase::Stopped);
    handle.wait().await.unwrap();
}

#[tokio::test]
async fn running_action_modules_finish_on_stop() {
    let store = store(vec![host("aa", "10.0.0.1", &["22"])]);
    let action = CommandAction::new(
        ssh(),
        vec!["sh".to_owned(), "-c".to_owned(), "sleep 0.5; exit 0".to_owned()],
        Duration::from_secs(10),
    );
    let mut handle = OrchestratorHandle::start(scheduler(
        Default::default(),
        RetryPolicy::default(),
        vec![Arc::new(action)],
        store.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        handle.status().await.current_action.as_deref(),
        Some("SSHBruteforce")
    );
    handle.stop();
    tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(status(&store, "aa", "SSHBruteforce").is_success());
    assert_eq!(handle.status().await.attacks, 1);
}

/// Loads fine but refuses every write.
struct ReadOnlyStore {
    table: HostTable,
}

impl HostStore for ReadOnlyStore {
    fn load(&self) -> Result<HostTable, StorageError> {
        Ok(self.table.clone())
    }

    fn store(&self, _: &HostTable) -> Result<(), StorageError> {
        Err(StorageError::UnexpectedData("host table is read-only".to_owned()))
    }
}

#[tokio::test]
async fn storage_errors_stop_the_loop() {
    let log = Calls::default();
    let store = Arc::new(ReadOnlyStore {
        table: HostTable {
            action_columns: vec![],
            hosts: vec![host("aa", "10.0.0.1", &["22"])],
        },
    });
    let failing = scheduler(
        Default::default(),
        eager(),
        vec![recording(ssh(), &log, Outcome::Success)],
        store.clone(),
    );
    assert!(matches!(failing.run().await, Err(SchedulerError::Storage(_))));
    assert_eq!(failing.status().await.phase, OrchestratorPhase::Stopped);
    assert_eq!(calls(&log).len(), 1);

    let mut handle = OrchestratorHandle::start(scheduler(
        Default::default(),
        eager(),
        vec![recording(ssh(), &log, Outcome::Success)],
        store,
    ));
    let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap();
    assert!(matches!(result, Err(SchedulerError::Storage(_))));
    assert!(handle.is_finished());
    assert_eq!(calls(&log).len(), 2);
}
