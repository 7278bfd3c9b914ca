//! Scripted in-memory cluster shared by the integration tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use vesta_common::types::{ContainerId, PowerState};
use vesta_runtime::codec::{GuestInfoCodec, MetadataCodec};
use vesta_runtime::executor::{Cmd, ExecutorConfig, Session};
use vesta_runtime::infra::{
    ConfigInfo, Fault, GuestAuth, InfraError, Infrastructure, InstanceHandle, OptionValue,
    ProgramSpec, RuntimeInfo, TaskRef,
};
use vesta_runtime::Snapshot;

/// Every call the core made, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Properties,
    PowerOn,
    PowerOff,
    WaitForTask(String),
    StartProgram {
        user: String,
        program: String,
        args: String,
    },
    WaitForKey(String),
    WaitForPowerState(PowerState),
}

/// How the simulated VM and its guest behave.
#[derive(Debug, Default, Clone)]
pub struct Script {
    /// Signals the guest obeys, with the delay before it powers off.
    pub responds_to: HashMap<String, Duration>,
    /// Failure returned when a guest program is started.
    pub program_error: Option<InfraError>,
    /// Fault the power-on task completes with.
    pub power_on_fault: Option<Fault>,
    /// Fault the power-off task completes with.
    pub power_off_fault: Option<Fault>,
    /// Launch status the guest writes after power-on; `None` never writes.
    pub launch_status: Option<String>,
    /// Failure returned by property queries.
    pub properties_error: Option<InfraError>,
    /// Failure returned by power-state waits.
    pub power_wait_error: Option<InfraError>,
    /// Entries appended to the metadata returned by property queries.
    pub extra_metadata: Vec<OptionValue>,
}

impl Script {
    pub fn responding_to(mut self, signal: &str, after: Duration) -> Self {
        let _ = self.responds_to.insert(signal.to_string(), after);
        self
    }
}

struct ClusterState {
    power: PowerState,
    power_off_at: Option<Instant>,
    exec_config: ExecutorConfig,
    tasks: HashMap<String, (PowerState, Option<Fault>)>,
    calls: Vec<Call>,
    script: Script,
}

/// One simulated VM behind the [`Infrastructure`] trait.
pub struct SimulatedCluster {
    state: Mutex<ClusterState>,
    codec: GuestInfoCodec,
}

impl SimulatedCluster {
    pub fn new(exec_config: ExecutorConfig, power: PowerState, script: Script) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ClusterState {
                power,
                power_off_at: None,
                exec_config,
                tasks: HashMap::new(),
                calls: Vec::new(),
                script,
            }),
            codec: GuestInfoCodec::default(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn power_off_calls(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::PowerOff).count()
    }

    /// Arguments of every guest program started, in order.
    pub fn signals_sent(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::StartProgram { args, .. } => Some(args),
                _ => None,
            })
            .collect()
    }

    pub fn power_state(&self) -> PowerState {
        let mut state = self.lock();
        settle(&mut state);
        state.power
    }

    pub fn set_power_state(&self, power: PowerState) {
        self.lock().power = power;
    }

    pub fn update_script(&self, update: impl FnOnce(&mut Script)) {
        update(&mut self.lock().script);
    }

    pub fn config_info(&self) -> ConfigInfo {
        let state = self.lock();
        ConfigInfo {
            name: state.exec_config.name.clone(),
            uuid: "4211-sim".into(),
            extra_config: self.codec.encode(&state.exec_config),
        }
    }

    fn submit(&self, call: Call, outcome: PowerState, fault: Option<Fault>) -> TaskRef {
        let mut state = self.lock();
        state.calls.push(call);
        let id = format!("task-{}", state.tasks.len() + 1);
        let _ = state.tasks.insert(id.clone(), (outcome, fault));
        TaskRef(id)
    }
}

/// Applies a pending guest-initiated power-off once its time has come.
fn settle(state: &mut ClusterState) {
    if let Some(at) = state.power_off_at {
        if Instant::now() >= at {
            state.power = PowerState::PoweredOff;
            state.power_off_at = None;
        }
    }
}

#[async_trait]
impl Infrastructure for SimulatedCluster {
    async fn properties(&self, _reference: &str) -> Result<(ConfigInfo, RuntimeInfo), InfraError> {
        let (error, power, extra) = {
            let mut state = self.lock();
            state.calls.push(Call::Properties);
            settle(&mut state);
            (
                state.script.properties_error.clone(),
                state.power,
                state.script.extra_metadata.clone(),
            )
        };
        if let Some(err) = error {
            return Err(err);
        }
        let mut config = self.config_info();
        config.extra_config.extend(extra);
        Ok((
            config,
            RuntimeInfo {
                power_state: power,
                boot_time: None,
            },
        ))
    }

    async fn power_on(&self, _reference: &str) -> Result<TaskRef, InfraError> {
        let fault = self.lock().script.power_on_fault.clone();
        Ok(self.submit(Call::PowerOn, PowerState::PoweredOn, fault))
    }

    async fn power_off(&self, _reference: &str) -> Result<TaskRef, InfraError> {
        let fault = self.lock().script.power_off_fault.clone();
        Ok(self.submit(Call::PowerOff, PowerState::PoweredOff, fault))
    }

    async fn wait_for_task(&self, task: &TaskRef) -> Result<(), InfraError> {
        let mut state = self.lock();
        state.calls.push(Call::WaitForTask(task.0.clone()));
        let (outcome, fault) = state
            .tasks
            .get(&task.0)
            .cloned()
            .ok_or_else(|| InfraError::request(format!("unknown task {task}")))?;
        if let Some(fault) = fault {
            return Err(InfraError::Fault(fault));
        }
        state.power = outcome;
        state.power_off_at = None;
        Ok(())
    }

    async fn start_program(
        &self,
        _reference: &str,
        auth: &GuestAuth,
        spec: &ProgramSpec,
    ) -> Result<i64, InfraError> {
        let mut state = self.lock();
        state.calls.push(Call::StartProgram {
            user: auth.username.clone(),
            program: spec.program_path.clone(),
            args: spec.arguments.clone(),
        });
        if let Some(err) = state.script.program_error.clone() {
            return Err(err);
        }
        if let Some(delay) = state.script.responds_to.get(&spec.arguments).copied() {
            let at = Instant::now() + delay;
            state.power_off_at = Some(state.power_off_at.map_or(at, |prev| prev.min(at)));
        }
        Ok(4242)
    }

    async fn wait_for_metadata_key(&self, _reference: &str, key: &str) -> Result<String, InfraError> {
        let status = {
            let mut state = self.lock();
            state.calls.push(Call::WaitForKey(key.to_string()));
            state.script.launch_status.clone()
        };
        match status {
            Some(value) => Ok(value),
            None => std::future::pending().await,
        }
    }

    async fn wait_for_power_state(&self, _reference: &str, target: PowerState) -> Result<(), InfraError> {
        let (error, pending) = {
            let mut state = self.lock();
            state.calls.push(Call::WaitForPowerState(target));
            settle(&mut state);
            if state.power == target {
                return Ok(());
            }
            let pending = (target == PowerState::PoweredOff)
                .then_some(state.power_off_at)
                .flatten();
            (state.script.power_wait_error.clone(), pending)
        };
        if let Some(err) = error {
            return Err(err);
        }
        match pending {
            Some(at) => {
                tokio::time::sleep_until(at).await;
                settle(&mut self.lock());
                Ok(())
            }
            None => std::future::pending().await,
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Executor configuration with one primary session `c1`.
pub fn exec_config(stop_signal: Option<&str>) -> ExecutorConfig {
    let mut config = ExecutorConfig::new(ContainerId::new("c1"));
    config.name = "web".into();
    let _ = config.sessions.insert(
        "c1".into(),
        Session {
            id: "c1".into(),
            cmd: Cmd {
                path: "/bin/httpd".into(),
                args: vec!["httpd".into(), "-f".into()],
            },
            stop_signal: stop_signal.map(str::to_string),
            ..Session::default()
        },
    );
    config
}

/// Snapshot of the cluster's VM as a refresh would build it.
pub fn snapshot_of(cluster: &Arc<SimulatedCluster>) -> Snapshot {
    let infra: Arc<dyn Infrastructure> = cluster.clone();
    let handle = InstanceHandle::new("vm-42", infra);
    let runtime = RuntimeInfo {
        power_state: cluster.power_state(),
        boot_time: None,
    };
    Snapshot::from_parts(handle, cluster.config_info(), runtime, &GuestInfoCodec::default())
        .expect("snapshot")
}
