//! Process supervisor
//!
//! Owns the running-process table and the deployment queue. Deployments are
//! queued and drained one at a time by the deployer worker; start, stop and
//! restart run directly and are serialized per project by a lifecycle lock.
//!
//! Lifecycle of a project: `stopped -> (deploy | start) -> building | running
//! -> (exit | stop | error) -> stopped | error`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::deploy::command::{CommandOverrides, CommandTemplates, LaunchCommand};
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::hub::LogHub;
use crate::deploy::output::{pipe_lines, LogSink};
use crate::deploy::platform::{Platform, TerminationOutcome, TerminationStrategy};
use crate::deploy::table::{ExitInfo, ProcessControl, ProcessTable, RunningInfo, RunningProcess};
use crate::errors::BerthError;
use crate::models::deployment::{DeployOptions, Deployment, DeploymentId, DeploymentStatus};
use crate::models::log::{LogFileKind, LogRecord, LogType};
use crate::models::port::PortPair;
use crate::models::project::{Project, ProjectFilter, ProjectId, ProjectStatus};
use crate::ports::PortAllocator;
use crate::store::Store;

/// How long readers get to flush after their process exited
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Most recent deployments checked for interrupted rows on recovery
const RECOVERY_SCAN_LIMIT: usize = 500;

/// Supervisor options
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Directory of the per-project build and runtime logs
    pub logs_dir: PathBuf,

    /// Pause between stop and start on restart
    pub restart_delay: Duration,

    /// Host name used in the reachable address announced after a deploy
    pub public_host: String,

    pub commands: CommandOverrides,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            restart_delay: Duration::from_secs(2),
            public_host: "localhost".to_string(),
            commands: CommandOverrides::new(),
        }
    }
}

/// One queued deployment
#[derive(Debug)]
pub struct DeployRequest {
    pub project_id: ProjectId,
    pub deployment_id: DeploymentId,
    pub options: DeployOptions,
    /// Receives the started process id once the deployment settles
    pub reply: Option<oneshot::Sender<Result<u32, BerthError>>>,
}

pub type DeployQueue = mpsc::UnboundedReceiver<DeployRequest>;

#[derive(Default)]
struct ProjectLocks {
    locks: Mutex<HashMap<ProjectId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProjectLocks {
    async fn acquire(&self, project_id: ProjectId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(project_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    fn forget(&self, project_id: ProjectId) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&project_id);
    }
}

pub struct Supervisor {
    store: Arc<dyn Store>,
    ports: Arc<PortAllocator>,
    hub: Arc<LogHub>,
    platform: Platform,
    strategy: TerminationStrategy,
    templates: CommandTemplates,
    options: SupervisorOptions,
    table: ProcessTable,
    locks: ProjectLocks,
    queue_tx: mpsc::UnboundedSender<DeployRequest>,
    next_instance: AtomicU64,
    shutting_down: AtomicBool,
}

impl Supervisor {
    /// Creates the supervisor and the receiving end of its deployment queue,
    /// which belongs to exactly one deployer worker.
    pub fn new(
        store: Arc<dyn Store>,
        ports: Arc<PortAllocator>,
        hub: Arc<LogHub>,
        options: SupervisorOptions,
    ) -> (Arc<Self>, DeployQueue) {
        let platform = Platform::current();
        let strategy = platform.termination_strategy();
        info!("Platform detected: {} ({:?})", platform, strategy);

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            store,
            ports,
            hub,
            platform,
            strategy,
            templates: CommandTemplates::new(options.commands.clone()),
            options,
            table: ProcessTable::new(),
            locks: ProjectLocks::default(),
            queue_tx,
            next_instance: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
        };
        (Arc::new(supervisor), queue_rx)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn strategy(&self) -> TerminationStrategy {
        self.strategy
    }

    pub fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    pub fn hub(&self) -> &Arc<LogHub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn ensure_accepting(&self) -> Result<(), BerthError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(BerthError::ShutdownError(
                "Supervisor is shutting down".to_string(),
            ));
        }
        Ok(())
    }

    async fn project(&self, project_id: ProjectId) -> Result<Project, BerthError> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or_else(|| BerthError::NotFound(format!("project {}", project_id)))
    }

    pub fn log_path(&self, project: &Project, kind: LogFileKind) -> PathBuf {
        self.options.logs_dir.join(kind.file_name(&project.name))
    }

    fn system_line(&self, project_id: ProjectId, message: impl Into<String>) {
        self.hub.publish(project_id, LogType::System, message);
    }

    async fn set_status(&self, project_id: ProjectId, status: ProjectStatus) {
        if let Err(e) = self.store.update_project_status(project_id, status).await {
            error!("Failed to set project {} {}: {}", project_id, status, e);
        }
    }

    async fn release_port(&self, project_id: ProjectId) {
        if let Err(e) = self.ports.release(project_id).await {
            error!("Failed to release port of project {}: {}", project_id, e);
        }
    }

    // =============================== DEPLOYMENTS ================================== //

    /// Records a pending deployment and queues it. Returns immediately.
    pub async fn deploy(
        &self,
        project_id: ProjectId,
        options: DeployOptions,
    ) -> Result<DeploymentId, BerthError> {
        self.enqueue(project_id, options, None).await
    }

    async fn enqueue(
        &self,
        project_id: ProjectId,
        options: DeployOptions,
        reply: Option<oneshot::Sender<Result<u32, BerthError>>>,
    ) -> Result<DeploymentId, BerthError> {
        self.ensure_accepting()?;

        let project = self.project(project_id).await?;
        let build_log = (!options.skip_build).then(|| self.log_path(&project, LogFileKind::Build));
        let deployment_id = self.store.create_deployment(project_id, build_log).await?;

        let request = DeployRequest {
            project_id,
            deployment_id,
            options,
            reply,
        };
        if self.queue_tx.send(request).is_err() {
            let message = "Deployment queue is closed".to_string();
            self.store
                .update_deployment_status(deployment_id, DeploymentStatus::Cancelled, Some(message.clone()))
                .await?;
            return Err(BerthError::ShutdownError(message));
        }

        info!("Queued deployment #{} of {}", deployment_id, project.name);
        self.system_line(project_id, format!("Deployment #{} queued", deployment_id));
        Ok(deployment_id)
    }

    /// Cancels a deployment that is still pending or building.
    ///
    /// Best effort: a deployment the worker already picked up keeps running to
    /// completion, only its final status write is dropped.
    pub async fn cancel_deployment(&self, deployment_id: DeploymentId) -> Result<(), BerthError> {
        let deployment = self
            .store
            .get_deployment(deployment_id)
            .await?
            .ok_or_else(|| BerthError::NotFound(format!("deployment {}", deployment_id)))?;

        let mut fsm = DeploymentFsm::from_status(deployment.status);
        let status = fsm.process(DeploymentEvent::Cancel)?;
        let applied = self
            .store
            .update_deployment_status(deployment_id, status, Some("Cancelled by request".to_string()))
            .await?;
        if !applied {
            return Err(BerthError::InvalidTransition(format!(
                "deployment #{} already finished",
                deployment_id
            )));
        }

        info!("Cancelled deployment #{}", deployment_id);
        self.system_line(
            deployment.project_id,
            format!("Deployment #{} cancelled", deployment_id),
        );
        Ok(())
    }

    async fn transition(
        &self,
        deployment_id: DeploymentId,
        fsm: &mut DeploymentFsm,
        event: DeploymentEvent,
    ) -> Result<bool, BerthError> {
        let status = fsm.process(event)?;
        self.store
            .update_deployment_status(deployment_id, status, fsm.error().map(str::to_string))
            .await
    }

    /// Runs one queued deployment to completion. Failures are recorded on the
    /// deployment and reported to the waiting caller, if any; they never
    /// propagate to the worker.
    pub async fn execute_deployment(self: &Arc<Self>, request: DeployRequest) {
        let DeployRequest {
            project_id,
            deployment_id,
            options,
            reply,
        } = request;
        let result = self
            .execute_inner(project_id, deployment_id, &options)
            .await;
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    async fn execute_inner(
        self: &Arc<Self>,
        project_id: ProjectId,
        deployment_id: DeploymentId,
        options: &DeployOptions,
    ) -> Result<u32, BerthError> {
        let mut fsm = DeploymentFsm::new();

        match self
            .transition(deployment_id, &mut fsm, DeploymentEvent::Build)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!("Deployment #{} was cancelled before it started, skipping", deployment_id);
                return Err(BerthError::InvalidTransition(format!(
                    "deployment #{} was cancelled",
                    deployment_id
                )));
            }
            Err(e) => {
                error!("Failed to mark deployment #{} building: {}", deployment_id, e);
                return Err(e);
            }
        }

        info!("Executing deployment #{} of project {}", deployment_id, project_id);
        match self.run_deployment(project_id, options).await {
            Ok((pid, ports)) => {
                match self
                    .transition(deployment_id, &mut fsm, DeploymentEvent::Succeed)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        "Deployment #{} was cancelled while running, success not recorded",
                        deployment_id
                    ),
                    Err(e) => error!("Failed to record deployment #{}: {}", deployment_id, e),
                }
                self.system_line(project_id, format!("Deployment #{} completed", deployment_id));
                self.system_line(
                    project_id,
                    format!(
                        "Project reachable at http://{}:{}",
                        self.options.public_host, ports.external
                    ),
                );
                info!("Deployment #{} completed on port {}", deployment_id, ports.external);
                Ok(pid)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(record_err) = self
                    .transition(deployment_id, &mut fsm, DeploymentEvent::Fail(message.clone()))
                    .await
                {
                    error!("Failed to record deployment #{}: {}", deployment_id, record_err);
                }
                self.system_line(
                    project_id,
                    format!("Deployment #{} failed: {}", deployment_id, message),
                );
                error!("Deployment #{} failed: {}", deployment_id, message);
                Err(e)
            }
        }
    }

    async fn run_deployment(
        self: &Arc<Self>,
        project_id: ProjectId,
        options: &DeployOptions,
    ) -> Result<(u32, PortPair), BerthError> {
        let project = self.project(project_id).await?;

        let build = if options.skip_build {
            None
        } else {
            LaunchCommand::build(&project, self.platform, &self.templates)
        };
        let built = build.is_some();
        if let Some(build) = build {
            self.run_build(&project, &build).await?;
        }

        let preferred = options
            .preferred_port
            .unwrap_or(project.project_type.profile().default_port);
        let result = async {
            let reserved = self.ports.reserve(project_id, Some(preferred)).await?;
            self.start_inner(project_id, Some(reserved.internal)).await
        }
        .await;

        if result.is_err() && built {
            // The build left the project in `building`
            if let Ok(current) = self.project(project_id).await {
                if current.status == ProjectStatus::Building {
                    self.set_status(project_id, ProjectStatus::Error).await;
                }
            }
        }
        result
    }

    async fn run_build(&self, project: &Project, build: &LaunchCommand) -> Result<(), BerthError> {
        let _guard = self.locks.acquire(project.id).await;
        let prior = self.project(project.id).await?.status;

        self.store
            .update_project_status(project.id, ProjectStatus::Building)
            .await?;
        self.system_line(project.id, format!("Building {}: {}", project.name, build.command_line));

        let result = self.exec_build(project, build).await;
        if result.is_err() {
            // A failed build leaves the project as it was
            self.set_status(project.id, prior).await;
        }
        result
    }

    async fn exec_build(&self, project: &Project, build: &LaunchCommand) -> Result<(), BerthError> {
        let sink = LogSink::open(&self.log_path(project, LogFileKind::Build)).await?;
        sink.write_line(&format!(
            "=== {} build: {}",
            Utc::now().to_rfc3339(),
            build.command_line
        ))
        .await;

        let mut child = build.to_command().spawn().map_err(|e| {
            BerthError::SpawnFailed(format!("build of {} ({}): {}", project.name, build.command_line, e))
        })?;

        let mut pipes = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pipes.push(pipe_lines(stdout, project.id, LogType::Build, sink.clone(), self.hub.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pipes.push(pipe_lines(stderr, project.id, LogType::BuildError, sink.clone(), self.hub.clone()));
        }

        let status = child.wait().await?;
        drain(pipes).await;

        if status.success() {
            sink.write_line("=== build succeeded").await;
            Ok(())
        } else {
            let err = BerthError::BuildFailed {
                exit_code: status.code(),
            };
            sink.write_line(&format!("=== {}", err)).await;
            Err(err)
        }
    }

    pub async fn get_deployment(&self, deployment_id: DeploymentId) -> Result<Option<Deployment>, BerthError> {
        self.store.get_deployment(deployment_id).await
    }

    pub async fn list_deployments(
        &self,
        project_id: Option<ProjectId>,
        limit: usize,
    ) -> Result<Vec<Deployment>, BerthError> {
        self.store.list_deployments(project_id, limit).await
    }

    // ================================ LIFECYCLE =================================== //

    /// Starts the project's process, replacing a live one. Returns the
    /// process id.
    ///
    /// With `record_as_deployment` the start is queued as a deployment without
    /// a build step and this waits for the deployer to run it, so it never
    /// overlaps another deployment.
    pub async fn start(
        self: &Arc<Self>,
        project_id: ProjectId,
        record_as_deployment: bool,
    ) -> Result<u32, BerthError> {
        if !record_as_deployment {
            return self.start_inner(project_id, None).await.map(|(pid, _)| pid);
        }

        let options = DeployOptions {
            preferred_port: None,
            skip_build: true,
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        let deployment_id = self.enqueue(project_id, options, Some(reply_tx)).await?;
        debug!("Waiting on deployment #{} to start project {}", deployment_id, project_id);

        reply_rx.await.map_err(|_| {
            BerthError::ShutdownError(format!("deployment #{} was abandoned", deployment_id))
        })?
    }

    async fn start_inner(
        self: &Arc<Self>,
        project_id: ProjectId,
        preferred_port: Option<u16>,
    ) -> Result<(u32, PortPair), BerthError> {
        self.ensure_accepting()?;
        let _guard = self.locks.acquire(project_id).await;
        self.ensure_accepting()?;

        if self.table.contains(project_id) {
            debug!("Project {} already has a process, stopping it first", project_id);
            self.stop_locked(project_id).await?;
        }

        let project = self.project(project_id).await?;
        let ports = match self.ports.project_ports(project_id).await? {
            Some(ports) => ports,
            None => {
                let preferred =
                    preferred_port.unwrap_or(project.project_type.profile().default_port);
                self.ports.reserve(project_id, Some(preferred)).await?
            }
        };

        let launch = LaunchCommand::start(&project, ports.internal, self.platform, &self.templates);
        let sink = match LogSink::open(&self.log_path(&project, LogFileKind::Runtime)).await {
            Ok(sink) => sink,
            Err(e) => return Err(self.fail_start(&project, e.to_string()).await),
        };
        sink.write_line(&format!(
            "=== {} start: {}",
            Utc::now().to_rfc3339(),
            launch.command_line
        ))
        .await;

        let mut child = match launch.to_command().spawn() {
            Ok(child) => child,
            Err(e) => return Err(self.fail_start(&project, e.to_string()).await),
        };
        let Some(pid) = child.id() else {
            return Err(self
                .fail_start(&project, "process exited before it was tracked".to_string())
                .await);
        };

        let mut pipes = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pipes.push(pipe_lines(stdout, project_id, LogType::Stdout, sink.clone(), self.hub.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pipes.push(pipe_lines(stderr, project_id, LogType::Stderr, sink.clone(), self.hub.clone()));
        }

        let instance = self.next_instance.fetch_add(1, Ordering::SeqCst);
        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = mpsc::channel(1);
        self.table.insert(
            project_id,
            RunningProcess {
                instance,
                started_at: Utc::now(),
                ports,
                control: ProcessControl::new(Some(pid), exit_rx, kill_tx),
            },
        );

        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            supervisor
                .watch_process(project_id, instance, child, kill_rx, exit_tx, pipes, sink)
                .await;
        });

        if let Err(e) = self
            .store
            .update_project_status(project_id, ProjectStatus::Running)
            .await
        {
            error!("Failed to record {} running, stopping it: {}", project.name, e);
            if let Err(stop_err) = self.stop_locked(project_id).await {
                warn!("Failed to stop {}: {}", project.name, stop_err);
            }
            return Err(e);
        }
        info!("Started {} (pid {}, port {})", project.name, pid, ports.external);
        self.system_line(
            project_id,
            format!("Project started: {} (port {})", project.name, ports.external),
        );
        Ok((pid, ports))
    }

    async fn fail_start(&self, project: &Project, reason: String) -> BerthError {
        let message = format!("Failed to start {}: {}", project.name, reason);
        error!("{}", message);
        self.release_port(project.id).await;
        self.set_status(project.id, ProjectStatus::Error).await;
        self.hub.publish(project.id, LogType::Error, message.clone());
        BerthError::SpawnFailed(message)
    }

    #[allow(clippy::too_many_arguments)]
    async fn watch_process(
        self: Arc<Self>,
        project_id: ProjectId,
        instance: u64,
        mut child: Child,
        mut kill_rx: mpsc::Receiver<()>,
        exit_tx: watch::Sender<Option<ExitInfo>>,
        pipes: Vec<JoinHandle<()>>,
        sink: LogSink,
    ) {
        let waited = loop {
            tokio::select! {
                status = child.wait() => break status,
                Some(()) = kill_rx.recv() => {
                    if let Err(e) = child.start_kill() {
                        debug!("Kill of project {} process failed: {}", project_id, e);
                    }
                }
            }
        };

        let exit = match waited {
            Ok(status) => ExitInfo {
                code: status.code(),
                error: None,
            },
            Err(e) => ExitInfo {
                code: None,
                error: Some(e.to_string()),
            },
        };
        let _ = exit_tx.send(Some(exit.clone()));

        drain(pipes).await;
        sink.write_line(&format!(
            "=== {} exited ({})",
            Utc::now().to_rfc3339(),
            exit.describe()
        ))
        .await;

        self.on_exit(project_id, instance, exit).await;
    }

    async fn on_exit(&self, project_id: ProjectId, instance: u64, exit: ExitInfo) {
        let _guard = self.locks.acquire(project_id).await;
        self.system_line(project_id, format!("Process exited ({})", exit.describe()));

        if self.table.remove_if_instance(project_id, instance).is_none() {
            // Stopped on purpose; whoever stopped it already cleaned up
            debug!("Process {} of project {} exited after stop", instance, project_id);
            return;
        }

        self.release_port(project_id).await;
        match exit.error {
            Some(reason) => {
                self.set_status(project_id, ProjectStatus::Error).await;
                self.hub
                    .publish(project_id, LogType::Error, format!("Process error: {}", reason));
                error!("Project {} process failed: {}", project_id, reason);
            }
            None => {
                self.set_status(project_id, ProjectStatus::Stopped).await;
                if exit.code != Some(0) {
                    warn!(
                        "{}",
                        BerthError::ProcessCrashed(format!(
                            "project {} ({})",
                            project_id,
                            exit.describe()
                        ))
                    );
                } else {
                    info!("Project {} process exited cleanly", project_id);
                }
            }
        }
    }

    /// Stops the project's process.
    ///
    /// Without a live process, a persisted `running` claim is corrected to
    /// `stopped` and the port released; this never fails on account of the
    /// missing process.
    pub async fn stop(&self, project_id: ProjectId) -> Result<(), BerthError> {
        let _guard = self.locks.acquire(project_id).await;
        self.stop_locked(project_id).await
    }

    async fn stop_locked(&self, project_id: ProjectId) -> Result<(), BerthError> {
        let Some(process) = self.table.remove(project_id) else {
            return self.reconcile_stopped(project_id).await;
        };

        let outcome = self.strategy.terminate(&process.control).await;
        if outcome == TerminationOutcome::Unconfirmed {
            warn!(
                "Process {:?} of project {} did not confirm exit",
                process.pid(),
                project_id
            );
        }

        self.ports.release(project_id).await?;
        self.store
            .update_project_status(project_id, ProjectStatus::Stopped)
            .await?;
        info!("Stopped project {}", project_id);
        self.system_line(project_id, "Project stopped");
        Ok(())
    }

    async fn reconcile_stopped(&self, project_id: ProjectId) -> Result<(), BerthError> {
        let project = self.project(project_id).await?;
        if project.status != ProjectStatus::Running {
            return Err(BerthError::NotRunning(project.name));
        }

        warn!(
            "Project {} is marked running without a live process, marking stopped",
            project.name
        );
        self.release_port(project_id).await;
        self.set_status(project_id, ProjectStatus::Stopped).await;
        self.system_line(project_id, "Project stopped");
        Ok(())
    }

    /// Stops, waits the restart delay, then starts again without recording a
    /// deployment. A project that was not running is simply started.
    pub async fn restart(self: &Arc<Self>, project_id: ProjectId) -> Result<u32, BerthError> {
        match self.stop(project_id).await {
            Ok(()) | Err(BerthError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }
        tokio::time::sleep(self.options.restart_delay).await;
        self.start(project_id, false).await
    }

    /// Snapshot of the running-process table
    pub fn list_running(&self) -> Vec<RunningInfo> {
        self.table.snapshot()
    }

    pub fn is_running(&self, project_id: ProjectId) -> bool {
        self.table.contains(project_id)
    }

    /// Restarts every project persisted as running. Returns how many started.
    ///
    /// Deployments left pending or building by the previous run can never
    /// finish and are marked failed first.
    pub async fn recover(self: &Arc<Self>) -> Result<usize, BerthError> {
        self.fail_interrupted_deployments().await?;

        let projects = self
            .store
            .list_projects(ProjectFilter::with_status(ProjectStatus::Running))
            .await?;
        info!("Recovering {} projects marked running", projects.len());

        let mut started = 0;
        for project in projects {
            match self.start(project.id, false).await {
                Ok(pid) => {
                    info!("Recovered {} (pid {})", project.name, pid);
                    started += 1;
                }
                Err(e) => error!("Failed to recover {}: {}", project.name, e),
            }
        }
        Ok(started)
    }

    async fn fail_interrupted_deployments(&self) -> Result<(), BerthError> {
        let deployments = self
            .store
            .list_deployments(None, RECOVERY_SCAN_LIMIT)
            .await?;
        for deployment in deployments.iter().filter(|d| !d.status.is_terminal()) {
            warn!(
                "Deployment #{} was {} when the daemon stopped, marking failed",
                deployment.id, deployment.status
            );
            self.store
                .update_deployment_status(
                    deployment.id,
                    DeploymentStatus::Failed,
                    Some("Interrupted by daemon restart".to_string()),
                )
                .await?;
        }
        Ok(())
    }

    /// Deletes a project, stopping its process and freeing its port first
    pub async fn delete_project(&self, project_id: ProjectId) -> Result<(), BerthError> {
        {
            let _guard = self.locks.acquire(project_id).await;
            let project = self.project(project_id).await?;

            if self.table.contains(project_id) {
                self.stop_locked(project_id).await?;
            }
            self.ports.release(project_id).await?;
            self.store.delete_project(project_id).await?;
            self.hub.remove(project_id);
            info!("Deleted project {}", project.name);
        }
        self.locks.forget(project_id);
        Ok(())
    }

    /// Terminates every live process without touching persisted status, so the
    /// next startup recovers exactly the projects that were running.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let processes = self.table.drain();
        if processes.is_empty() {
            return;
        }

        info!("Terminating {} running projects...", processes.len());
        let strategy = self.strategy;
        join_all(processes.iter().map(|(project_id, process)| async move {
            let outcome = strategy.terminate(&process.control).await;
            debug!("Project {} terminated: {:?}", project_id, outcome);
        }))
        .await;
    }

    // ================================== LOGS ===================================== //

    pub async fn list_logs(
        &self,
        project_id: ProjectId,
        limit: usize,
    ) -> Result<Vec<LogRecord>, BerthError> {
        self.store.list_logs(project_id, limit).await
    }

    /// Contents of a project's build or runtime log file. A file that was never
    /// written reads as empty.
    pub async fn read_log_file(
        &self,
        project_id: ProjectId,
        kind: LogFileKind,
    ) -> Result<String, BerthError> {
        let project = self.project(project_id).await?;
        match tokio::fs::read_to_string(self.log_path(&project, kind)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn drain(pipes: Vec<JoinHandle<()>>) {
    // Grandchildren may keep a pipe open after the process itself is gone
    if tokio::time::timeout(PIPE_DRAIN_TIMEOUT, join_all(pipes))
        .await
        .is_err()
    {
        debug!("Output readers still open after {:?}", PIPE_DRAIN_TIMEOUT);
    }
}
