//! Supervisor tests
//!
//! Projects are registered as static sites whose commands are replaced with
//! small shell scripts, so no language runtime is needed.

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use berth::deploy::command::{CommandOverride, CommandOverrides};
use berth::deploy::hub::LogHub;
use berth::deploy::supervisor::{Supervisor, SupervisorOptions};
use berth::detect::ProjectType;
use berth::errors::BerthError;
use berth::models::deployment::{DeployOptions, Deployment, DeploymentId, DeploymentStatus};
use berth::models::log::{LogEvent, LogFileKind, LogRecord, LogType};
use berth::models::port::{PortAssignment, PortPair};
use berth::models::project::{NewProject, Project, ProjectFilter, ProjectId, ProjectStatus};
use berth::ports::{PortAllocator, PortRange};
use berth::store::{SqliteStore, Store};
use berth::workers::{deployer, log_writer};
use tempfile::TempDir;
use tokio::sync::broadcast;

const WAIT_LIMIT: Duration = Duration::from_secs(20);

struct Harness {
    tmp: TempDir,
    store: Arc<dyn Store>,
    supervisor: Arc<Supervisor>,
}

impl Harness {
    fn new(start: &str, build: Option<&str>) -> Self {
        Self::with_store(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            start,
            build,
        )
    }

    fn with_store(store: Arc<dyn Store>, start: &str, build: Option<&str>) -> Self {
        let tmp = TempDir::new().unwrap();
        let (hub, log_events) = LogHub::new(256);
        let hub = Arc::new(hub);
        let ports = Arc::new(PortAllocator::new(
            store.clone(),
            PortRange::new(4000, 4999).unwrap(),
        ));

        let mut commands = CommandOverrides::new();
        commands.insert(
            ProjectType::Static,
            CommandOverride {
                start: Some(start.to_string()),
                build: Some(build.unwrap_or("").to_string()),
            },
        );
        let options = SupervisorOptions {
            logs_dir: tmp.path().join("logs"),
            restart_delay: Duration::from_millis(100),
            public_host: "localhost".to_string(),
            commands,
        };

        let (supervisor, queue) = Supervisor::new(store.clone(), ports, hub, options);
        tokio::spawn(deployer::run(
            supervisor.clone(),
            queue,
            Box::pin(std::future::pending::<()>()),
        ));
        tokio::spawn(log_writer::run(
            store.clone(),
            log_events,
            Box::pin(std::future::pending::<()>()),
        ));

        Self {
            tmp,
            store,
            supervisor,
        }
    }

    fn projects_dir(&self) -> PathBuf {
        self.tmp.path().join("projects")
    }

    async fn add_project(&self, name: &str) -> ProjectId {
        let path = self.projects_dir().join(name);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("index.html"), "<html></html>").unwrap();
        self.store
            .upsert_project(NewProject {
                name: name.to_string(),
                path,
                project_type: ProjectType::Static,
                description: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn status(&self, project_id: ProjectId) -> ProjectStatus {
        self.store
            .get_project(project_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    async fn wait_for_deployment(&self, deployment_id: DeploymentId) -> Deployment {
        let deadline = Instant::now() + WAIT_LIMIT;
        loop {
            let deployment = self
                .store
                .get_deployment(deployment_id)
                .await
                .unwrap()
                .unwrap();
            if deployment.status.is_terminal() {
                return deployment;
            }
            assert!(Instant::now() < deadline, "deployment #{} never finished", deployment_id);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn wait_for_status(&self, project_id: ProjectId, status: ProjectStatus) {
        let deadline = Instant::now() + WAIT_LIMIT;
        while self.status(project_id).await != status {
            assert!(Instant::now() < deadline, "project never became {}", status);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Store whose writes of the `running` status fail once `fail_running` is set
struct RunningWriteFails {
    inner: SqliteStore,
    fail_running: AtomicBool,
}

impl RunningWriteFails {
    fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            fail_running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Store for RunningWriteFails {
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, BerthError> {
        self.inner.get_project(id).await
    }

    async fn get_project_by_name(&self, name: &str) -> Result<Option<Project>, BerthError> {
        self.inner.get_project_by_name(name).await
    }

    async fn list_projects(&self, filter: ProjectFilter) -> Result<Vec<Project>, BerthError> {
        self.inner.list_projects(filter).await
    }

    async fn upsert_project(&self, project: NewProject) -> Result<Project, BerthError> {
        self.inner.upsert_project(project).await
    }

    async fn delete_project(&self, id: ProjectId) -> Result<bool, BerthError> {
        self.inner.delete_project(id).await
    }

    async fn update_project_status(
        &self,
        id: ProjectId,
        status: ProjectStatus,
    ) -> Result<(), BerthError> {
        if status == ProjectStatus::Running && self.fail_running.load(Ordering::SeqCst) {
            return Err(BerthError::StoreError("disk full".to_string()));
        }
        self.inner.update_project_status(id, status).await
    }

    async fn create_deployment(
        &self,
        project_id: ProjectId,
        log_path: Option<PathBuf>,
    ) -> Result<DeploymentId, BerthError> {
        self.inner.create_deployment(project_id, log_path).await
    }

    async fn get_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>, BerthError> {
        self.inner.get_deployment(id).await
    }

    async fn list_deployments(
        &self,
        project_id: Option<ProjectId>,
        limit: usize,
    ) -> Result<Vec<Deployment>, BerthError> {
        self.inner.list_deployments(project_id, limit).await
    }

    async fn update_deployment_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
        error_message: Option<String>,
    ) -> Result<bool, BerthError> {
        self.inner
            .update_deployment_status(id, status, error_message)
            .await
    }

    async fn insert_port_assignment(
        &self,
        project_id: ProjectId,
        ports: PortPair,
    ) -> Result<(), BerthError> {
        self.inner.insert_port_assignment(project_id, ports).await
    }

    async fn get_port_assignment(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<PortAssignment>, BerthError> {
        self.inner.get_port_assignment(project_id).await
    }

    async fn delete_port_assignment(&self, project_id: ProjectId) -> Result<bool, BerthError> {
        self.inner.delete_port_assignment(project_id).await
    }

    async fn update_port_fields(
        &self,
        project_id: ProjectId,
        ports: PortPair,
    ) -> Result<(), BerthError> {
        self.inner.update_port_fields(project_id, ports).await
    }

    async fn clear_port_fields(&self, project_id: ProjectId) -> Result<(), BerthError> {
        self.inner.clear_port_fields(project_id).await
    }

    async fn used_ports(&self) -> Result<Vec<u16>, BerthError> {
        self.inner.used_ports().await
    }

    async fn append_log(
        &self,
        project_id: ProjectId,
        log_type: LogType,
        message: &str,
    ) -> Result<(), BerthError> {
        self.inner.append_log(project_id, log_type, message).await
    }

    async fn list_logs(
        &self,
        project_id: ProjectId,
        limit: usize,
    ) -> Result<Vec<LogRecord>, BerthError> {
        self.inner.list_logs(project_id, limit).await
    }

    async fn clear_logs(&self, project_id: ProjectId) -> Result<(), BerthError> {
        self.inner.clear_logs(project_id).await
    }
}

async fn wait_for_line(
    rx: &mut broadcast::Receiver<LogEvent>,
    matches: impl Fn(&LogEvent) -> bool,
) -> LogEvent {
    let deadline = Instant::now() + WAIT_LIMIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) if matches(&event) => return event,
            Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => panic!("log stream closed"),
            Err(_) => panic!("expected log line never arrived"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_build_records_exit_code_and_starts_nothing() {
    let harness = Harness::new("sleep 30", Some("echo compiling; exit 1"));
    let project = harness.add_project("site").await;

    let deployment_id = harness
        .supervisor
        .deploy(project, DeployOptions::default())
        .await
        .unwrap();
    let deployment = harness.wait_for_deployment(deployment_id).await;

    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.error_message.unwrap().contains("exit code: 1"));
    assert!(deployment.finished_at.is_some());
    assert!(harness.supervisor.list_running().is_empty());
    assert_eq!(harness.status(project).await, ProjectStatus::Stopped);
    assert!(harness.supervisor.ports().project_ports(project).await.unwrap().is_none());

    let build_log = harness
        .supervisor
        .read_log_file(project, LogFileKind::Build)
        .await
        .unwrap();
    assert!(build_log.contains("compiling"));

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_build_keeps_prior_status() {
    let harness = Harness::new("sleep 30", Some("exit 2"));
    let project = harness.add_project("site").await;
    harness
        .store
        .update_project_status(project, ProjectStatus::Running)
        .await
        .unwrap();

    let deployment_id = harness
        .supervisor
        .deploy(project, DeployOptions::default())
        .await
        .unwrap();
    let deployment = harness.wait_for_deployment(deployment_id).await;

    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert_eq!(harness.status(project).await, ProjectStatus::Running);

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deployments_run_one_at_a_time() {
    let build = r#"echo "begin $(basename "$PWD")" >> ../order.log; sleep 0.3; echo "end $(basename "$PWD")" >> ../order.log"#;
    let harness = Harness::new("sleep 30", Some(build));
    let first = harness.add_project("alpha").await;
    let second = harness.add_project("beta").await;
    let mut first_logs = harness.supervisor.hub().subscribe(first);

    let first_deployment = harness
        .supervisor
        .deploy(first, DeployOptions::default())
        .await
        .unwrap();
    let second_deployment = harness
        .supervisor
        .deploy(second, DeployOptions::default())
        .await
        .unwrap();

    assert_eq!(
        harness.wait_for_deployment(first_deployment).await.status,
        DeploymentStatus::Success
    );
    assert_eq!(
        harness.wait_for_deployment(second_deployment).await.status,
        DeploymentStatus::Success
    );

    let order = std::fs::read_to_string(harness.projects_dir().join("order.log")).unwrap();
    let order: Vec<&str> = order.lines().collect();
    assert_eq!(order, vec!["begin alpha", "end alpha", "begin beta", "end beta"]);

    let reachable = wait_for_line(&mut first_logs, |e| e.message.contains("reachable")).await;
    assert_eq!(reachable.log_type, LogType::System);
    assert!(reachable.message.contains("http://localhost:4000"));

    let running = harness.supervisor.list_running();
    assert_eq!(running.len(), 2);
    assert_ne!(running[0].ports.internal, running[1].ports.internal);
    assert_eq!(harness.status(first).await, ProjectStatus::Running);

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_preferred_port_is_used_for_deploy() {
    let harness = Harness::new("sleep 30", None);
    let project = harness.add_project("site").await;

    let deployment_id = harness
        .supervisor
        .deploy(
            project,
            DeployOptions {
                preferred_port: Some(4321),
                skip_build: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(
        harness.wait_for_deployment(deployment_id).await.status,
        DeploymentStatus::Success
    );

    let running = harness.supervisor.list_running();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].ports.internal, 4321);

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_reconciles_stale_running_claim() {
    let harness = Harness::new("sleep 30", None);
    let project = harness.add_project("site").await;
    harness
        .supervisor
        .ports()
        .reserve(project, Some(4100))
        .await
        .unwrap();
    harness
        .store
        .update_project_status(project, ProjectStatus::Running)
        .await
        .unwrap();

    harness.supervisor.stop(project).await.unwrap();

    assert_eq!(harness.status(project).await, ProjectStatus::Stopped);
    assert!(harness.supervisor.ports().project_ports(project).await.unwrap().is_none());

    let err = harness.supervisor.stop(project).await.unwrap_err();
    assert!(matches!(err, BerthError::NotRunning(_)));

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_terminates_live_process() {
    let harness = Harness::new("sleep 30", None);
    let project = harness.add_project("site").await;

    harness.supervisor.start(project, false).await.unwrap();
    assert!(harness.supervisor.is_running(project));

    harness.supervisor.stop(project).await.unwrap();
    assert!(!harness.supervisor.is_running(project));
    assert_eq!(harness.status(project).await, ProjectStatus::Stopped);
    assert!(harness.supervisor.ports().project_ports(project).await.unwrap().is_none());

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_leaves_exactly_one_process() {
    let harness = Harness::new("sleep 30", None);
    let project = harness.add_project("site").await;

    let first_pid = harness.supervisor.start(project, false).await.unwrap();
    let second_pid = harness.supervisor.restart(project).await.unwrap();
    assert_ne!(first_pid, second_pid);

    // Let the first process's exit settle
    tokio::time::sleep(Duration::from_millis(300)).await;

    let running = harness.supervisor.list_running();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].project_id, project);
    assert_eq!(running[0].pid, Some(second_pid));
    assert_eq!(harness.status(project).await, ProjectStatus::Running);

    // Restart never records a deployment
    assert!(harness
        .supervisor
        .list_deployments(Some(project), 10)
        .await
        .unwrap()
        .is_empty());

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_replaces_live_process() {
    let harness = Harness::new("sleep 30", None);
    let project = harness.add_project("site").await;

    let first_pid = harness.supervisor.start(project, false).await.unwrap();
    let second_pid = harness.supervisor.start(project, true).await.unwrap();
    assert_ne!(first_pid, second_pid);
    assert_eq!(harness.supervisor.list_running().len(), 1);

    let deployments = harness
        .supervisor
        .list_deployments(Some(project), 10)
        .await
        .unwrap();
    assert_eq!(deployments.len(), 1);
    assert_eq!(deployments[0].status, DeploymentStatus::Success);

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_process_exit_is_logged_and_cleaned_up() {
    let harness = Harness::new("exit 3", None);
    let project = harness.add_project("site").await;
    let mut logs = harness.supervisor.hub().subscribe(project);

    harness.supervisor.start(project, false).await.unwrap();

    let exited = wait_for_line(&mut logs, |e| e.message.contains("exit code: 3")).await;
    assert_eq!(exited.log_type, LogType::System);

    harness.wait_for_status(project, ProjectStatus::Stopped).await;
    assert!(harness.supervisor.list_running().is_empty());
    assert!(harness.supervisor.ports().project_ports(project).await.unwrap().is_none());

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_output_reaches_subscribers_and_runtime_log() {
    let harness = Harness::new("echo hello-from-app; echo oops >&2; sleep 30", None);
    let project = harness.add_project("site").await;
    let mut logs = harness.supervisor.hub().subscribe(project);

    harness.supervisor.start(project, false).await.unwrap();

    let stdout = wait_for_line(&mut logs, |e| e.message == "hello-from-app").await;
    assert_eq!(stdout.log_type, LogType::Stdout);
    assert_eq!(stdout.project_id, project);

    let runtime_log = harness
        .supervisor
        .read_log_file(project, LogFileKind::Runtime)
        .await
        .unwrap();
    assert!(runtime_log.contains("hello-from-app"));

    let deadline = Instant::now() + WAIT_LIMIT;
    loop {
        let stored = harness.supervisor.list_logs(project, 100).await.unwrap();
        if stored
            .iter()
            .any(|l| l.log_type == LogType::Stderr && l.message == "oops")
        {
            break;
        }
        assert!(Instant::now() < deadline, "stderr line never persisted");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spawn_failure_marks_error_and_frees_port() {
    let harness = Harness::new("sleep 30", None);
    let project = harness.add_project("site").await;
    std::fs::remove_dir_all(harness.projects_dir().join("site")).unwrap();

    let err = harness.supervisor.start(project, false).await.unwrap_err();
    assert!(matches!(err, BerthError::SpawnFailed(_)));
    assert_eq!(harness.status(project).await, ProjectStatus::Error);
    assert!(harness.supervisor.ports().project_ports(project).await.unwrap().is_none());

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_pending_deployment() {
    let harness = Harness::new("sleep 30", Some("sleep 1"));
    let first = harness.add_project("alpha").await;
    let second = harness.add_project("beta").await;

    let first_deployment = harness
        .supervisor
        .deploy(first, DeployOptions::default())
        .await
        .unwrap();
    let second_deployment = harness
        .supervisor
        .deploy(second, DeployOptions::default())
        .await
        .unwrap();
    harness
        .supervisor
        .cancel_deployment(second_deployment)
        .await
        .unwrap();

    assert_eq!(
        harness.wait_for_deployment(first_deployment).await.status,
        DeploymentStatus::Success
    );
    // The worker skips the cancelled item
    tokio::time::sleep(Duration::from_millis(300)).await;
    let cancelled = harness.wait_for_deployment(second_deployment).await;
    assert_eq!(cancelled.status, DeploymentStatus::Cancelled);
    assert!(!harness.supervisor.is_running(second));

    let err = harness
        .supervisor
        .cancel_deployment(first_deployment)
        .await
        .unwrap_err();
    assert!(matches!(err, BerthError::InvalidTransition(_)));

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_project_stops_and_frees_port() {
    let harness = Harness::new("sleep 30", None);
    let project = harness.add_project("site").await;

    harness.supervisor.start(project, false).await.unwrap();
    harness.supervisor.delete_project(project).await.unwrap();

    assert!(harness.supervisor.list_running().is_empty());
    assert!(harness.store.get_project(project).await.unwrap().is_none());
    assert!(harness.store.used_ports().await.unwrap().is_empty());

    let err = harness.supervisor.delete_project(project).await.unwrap_err();
    assert!(matches!(err, BerthError::NotFound(_)));

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recover_restarts_running_projects() {
    let harness = Harness::new("sleep 30", None);
    let running = harness.add_project("running").await;
    let stopped = harness.add_project("stopped").await;
    harness
        .store
        .update_project_status(running, ProjectStatus::Running)
        .await
        .unwrap();
    let interrupted = harness.store.create_deployment(stopped, None).await.unwrap();

    let started = harness.supervisor.recover().await.unwrap();

    assert_eq!(started, 1);
    assert!(harness.supervisor.is_running(running));
    assert!(!harness.supervisor.is_running(stopped));

    let deployment = harness.store.get_deployment(interrupted).await.unwrap().unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_keeps_persisted_status() {
    let harness = Harness::new("sleep 30", None);
    let project = harness.add_project("site").await;

    harness.supervisor.start(project, false).await.unwrap();
    harness.supervisor.shutdown().await;

    assert!(harness.supervisor.list_running().is_empty());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.status(project).await, ProjectStatus::Running);

    let err = harness.supervisor.start(project, false).await.unwrap_err();
    assert!(matches!(err, BerthError::ShutdownError(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recorded_start_waits_for_queued_deploy() {
    let harness = Harness::new("sleep 30", Some("sleep 1.5"));
    let project = harness.add_project("site").await;

    let deployment_id = harness
        .supervisor
        .deploy(project, DeployOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let supervisor = harness.supervisor.clone();
    let recorded = tokio::spawn(async move { supervisor.start(project, true).await });

    // The build is still running; the recorded start must wait its turn
    let deadline = Instant::now() + Duration::from_millis(1000);
    while Instant::now() < deadline {
        let building = harness
            .supervisor
            .list_deployments(Some(project), 10)
            .await
            .unwrap()
            .iter()
            .filter(|d| d.status == DeploymentStatus::Building)
            .count();
        assert!(building <= 1, "{} deployments building at once", building);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let pid = recorded.await.unwrap().unwrap();
    assert_eq!(
        harness.wait_for_deployment(deployment_id).await.status,
        DeploymentStatus::Success
    );

    let deployments = harness
        .supervisor
        .list_deployments(Some(project), 10)
        .await
        .unwrap();
    assert_eq!(deployments.len(), 2);
    assert!(deployments
        .iter()
        .all(|d| d.status == DeploymentStatus::Success));
    assert!(deployments[0].finished_at >= deployments[1].finished_at);

    let running = harness.supervisor.list_running();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].pid, Some(pid));

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_escalates_when_term_is_ignored() {
    let harness = Harness::new("trap '' TERM; while true; do sleep 0.2; done", None);
    let project = harness.add_project("stubborn").await;

    let pid = harness.supervisor.start(project, false).await.unwrap();
    // Give the shell time to install its trap
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = Instant::now();
    tokio::time::timeout(WAIT_LIMIT, harness.supervisor.stop(project))
        .await
        .expect("stop never returned")
        .unwrap();
    assert!(started.elapsed() >= Duration::from_secs(2));

    let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok();
    assert!(!alive, "pid {} survived stop", pid);
    assert!(!harness.supervisor.is_running(project));
    assert_eq!(harness.status(project).await, ProjectStatus::Stopped);

    harness.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_reports_failed_status_write() {
    let store = Arc::new(RunningWriteFails::new());
    let harness = Harness::with_store(store.clone(), "sleep 30", None);
    let project = harness.add_project("site").await;
    store.fail_running.store(true, Ordering::SeqCst);

    let err = harness.supervisor.start(project, false).await.unwrap_err();
    assert!(matches!(err, BerthError::StoreError(_)));
    assert!(!harness.supervisor.is_running(project));
    assert!(harness.supervisor.ports().project_ports(project).await.unwrap().is_none());
    assert_eq!(harness.status(project).await, ProjectStatus::Stopped);

    harness.supervisor.shutdown().await;
}
