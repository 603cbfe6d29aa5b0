//! Child processes launched from the dashboard.
//!
//! Each workflow has at most one live child. Output from stdout and stderr
//! is merged line by line into a bounded ring buffer and mirrored onto the
//! event bus. On unix each child leads its own process group; stopping sends
//! SIGTERM to the group and SIGKILL once the grace period runs out.

use crate::dashboard::registry::{self, Workflow};
use crate::events::{now_timestamp, EventBus, HarvestEvent};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, watch};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

pub const LOG_CAPACITY: usize = 200;
pub const STATUS_LOG_LINES: usize = 80;
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("unknown workflow: {0}")]
    Unknown(String),

    #[error("already running")]
    AlreadyRunning,

    #[error("failed to spawn {key}: {source}")]
    Spawn {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Idle,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    pub state: WorkflowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,
    pub return_code: Option<i32>,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Started {
    pub status: &'static str,
    pub pid: Option<u32>,
}

struct Entry {
    pid: Option<u32>,
    started: String,
    running: bool,
    return_code: Option<i32>,
    logs: VecDeque<String>,
    kill: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
}

impl Entry {
    fn status(&self) -> WorkflowStatus {
        let state = match (self.running, self.return_code) {
            (true, _) => WorkflowState::Running,
            (false, Some(0)) => WorkflowState::Completed,
            (false, _) => WorkflowState::Error,
        };
        let skip = self.logs.len().saturating_sub(STATUS_LOG_LINES);
        WorkflowStatus {
            state,
            pid: self.pid,
            started: Some(self.started.clone()),
            return_code: self.return_code,
            logs: self.logs.iter().skip(skip).cloned().collect(),
        }
    }
}

type Entries = Arc<Mutex<HashMap<String, Entry>>>;

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<String, Entry>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Exit code, or the negated signal number for a killed child.
fn exit_code(status: &ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().or_else(|| status.signal().map(|s| -s))
    }
    #[cfg(not(unix))]
    {
        status.code()
    }
}

/// Send `signal` to the process group led by `pid` with the system `kill`.
#[cfg(unix)]
async fn signal_group(pid: u32, signal: &str) -> bool {
    let group = format!("-{pid}");
    match Command::new("kill").args([signal, "--", &group]).output().await {
        Ok(out) => out.status.success(),
        Err(e) => {
            warn!(pid, "failed to run kill {signal}: {e}");
            false
        }
    }
}

#[cfg(not(unix))]
async fn signal_group(_pid: u32, _signal: &str) -> bool {
    false
}

/// Launches and tracks workflow processes.
pub struct ProcessManager {
    program: PathBuf,
    workflows: &'static [Workflow],
    entries: Entries,
    events: EventBus,
    stop_grace: Duration,
}

impl ProcessManager {
    /// Manage the built-in workflows, re-invoking the running executable.
    pub fn new(events: EventBus) -> std::io::Result<Self> {
        Ok(Self::with_program(
            std::env::current_exe()?,
            registry::WORKFLOWS,
            events,
        ))
    }

    pub fn with_program(program: PathBuf, workflows: &'static [Workflow], events: EventBus) -> Self {
        Self {
            program,
            workflows,
            entries: Arc::new(Mutex::new(HashMap::new())),
            events,
            stop_grace: STOP_TIMEOUT,
        }
    }

    /// How long a stopped workflow gets between SIGTERM and SIGKILL.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn workflows(&self) -> &'static [Workflow] {
        self.workflows
    }

    pub fn workflow(&self, key: &str) -> Option<&'static Workflow> {
        self.workflows.iter().find(|w| w.key == key)
    }

    pub fn start(&self, key: &str, env: &HashMap<String, String>) -> Result<Started, WorkflowError> {
        let workflow = self
            .workflow(key)
            .ok_or_else(|| WorkflowError::Unknown(key.to_string()))?;

        let mut entries = lock(&self.entries);
        if entries.get(key).is_some_and(|e| e.running) {
            return Err(WorkflowError::AlreadyRunning);
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(workflow.args)
            .envs(workflow.default_env.iter().copied())
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = cmd
            .spawn()
            .map_err(|source| WorkflowError::Spawn {
                key: key.to_string(),
                source,
            })?;

        let pid = child.id();
        info!(workflow = key, ?pid, "workflow started");
        self.events.emit(HarvestEvent::WorkflowStarted {
            key: key.to_string(),
            pid,
        });

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exited_tx, exited_rx) = watch::channel(false);
        entries.insert(
            key.to_string(),
            Entry {
                pid,
                started: now_timestamp(),
                running: true,
                return_code: None,
                logs: VecDeque::with_capacity(LOG_CAPACITY),
                kill: Some(kill_tx),
                exited: exited_rx,
            },
        );
        drop(entries);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let reader = stdout.zip(stderr).map(|(out, err)| {
            let out = LinesStream::new(BufReader::new(out).lines());
            let err = LinesStream::new(BufReader::new(err).lines());
            let entries = Arc::clone(&self.entries);
            let events = self.events.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                let mut lines = out.merge(err);
                while let Some(Ok(line)) = lines.next().await {
                    if let Some(entry) = lock(&entries).get_mut(&key) {
                        if entry.logs.len() == LOG_CAPACITY {
                            entry.logs.pop_front();
                        }
                        entry.logs.push_back(line.clone());
                    }
                    events.emit(HarvestEvent::WorkflowLog {
                        key: key.clone(),
                        line,
                    });
                }
            })
        });

        let entries = Arc::clone(&self.entries);
        let events = self.events.clone();
        let key = key.to_string();
        let grace = self.stop_grace;
        tokio::spawn(async move {
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill_rx => None,
            };
            let status = match finished {
                Some(status) => status,
                None => {
                    let terminated = match pid {
                        Some(pid) => signal_group(pid, "-TERM").await,
                        None => false,
                    };
                    let graceful = if terminated {
                        tokio::time::timeout(grace, child.wait()).await.ok()
                    } else {
                        None
                    };
                    match graceful {
                        Some(status) => status,
                        None => {
                            warn!(workflow = %key, "no exit after SIGTERM, killing");
                            if let Some(pid) = pid {
                                signal_group(pid, "-KILL").await;
                            }
                            if let Err(e) = child.start_kill() {
                                warn!(workflow = %key, "kill failed: {e}");
                            }
                            child.wait().await
                        }
                    }
                }
            };
            // Drain remaining output before reporting the exit. Grandchildren
            // can hold the pipes open, so the wait is bounded.
            if let Some(reader) = reader {
                let _ = tokio::time::timeout(DRAIN_TIMEOUT, reader).await;
            }
            let code = match status {
                Ok(s) => exit_code(&s),
                Err(e) => {
                    warn!(workflow = %key, "wait failed: {e}");
                    None
                }
            };
            if let Some(entry) = lock(&entries).get_mut(&key) {
                entry.running = false;
                entry.return_code = code;
                entry.kill = None;
            }
            info!(workflow = %key, ?code, "workflow exited");
            events.emit(HarvestEvent::WorkflowExited { key, code });
            let _ = exited_tx.send(true);
        });

        Ok(Started {
            status: "started",
            pid,
        })
    }

    /// Terminate a running workflow and wait for it to be reaped.
    pub async fn stop(&self, key: &str) -> Result<&'static str, WorkflowError> {
        if self.workflow(key).is_none() {
            return Err(WorkflowError::Unknown(key.to_string()));
        }
        let (kill, mut exited) = {
            let mut entries = lock(&self.entries);
            match entries.get_mut(key) {
                Some(entry) if entry.running => (entry.kill.take(), entry.exited.clone()),
                _ => return Ok("not_running"),
            }
        };
        if let Some(kill) = kill {
            let _ = kill.send(());
        }
        let limit = self.stop_grace + DRAIN_TIMEOUT + Duration::from_secs(1);
        if tokio::time::timeout(limit, exited.wait_for(|done| *done))
            .await
            .is_err()
        {
            warn!(workflow = key, "did not exit within {:?}", limit);
        }
        Ok("stopped")
    }

    pub fn status(&self, key: &str) -> WorkflowStatus {
        match lock(&self.entries).get(key) {
            Some(entry) => entry.status(),
            None => WorkflowStatus {
                state: WorkflowState::Idle,
                pid: None,
                started: None,
                return_code: None,
                logs: Vec::new(),
            },
        }
    }
}
