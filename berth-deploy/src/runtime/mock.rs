/// In-memory runtime for tests
///
/// Keeps a container table, records every call that changes or runs
/// something, and lets tests script probe results and failures.
///
/// # Example
///
/// ```
/// use berth_deploy::runtime::{ContainerRuntime, MockCall, MockRuntime};
/// use berth_deploy::stack::ServiceDescriptor;
///
/// # async fn example() {
/// let runtime = MockRuntime::new().with_probe_results([false, true]);
/// runtime.run(&ServiceDescriptor::new("db", "postgres:16"), "berth").await.unwrap();
/// assert_eq!(runtime.calls().len(), 1);
/// # }
/// ```

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    ContainerRuntime, ContainerStatus, ContainerSummary, ExecOutput, RuntimeError, RuntimeResult,
};
use crate::stack::ServiceDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateNetwork(String),
    Create { name: String, network: String },
    Start(String),
    Stop(String),
    Remove(String),
    Exec { container: String, argv: Vec<String> },
    Probe { image: String, argv: Vec<String> },
}

#[derive(Default)]
struct MockState {
    networks: HashSet<String>,
    /// name -> (status, image)
    containers: BTreeMap<String, (ContainerStatus, String)>,
    calls: Vec<MockCall>,
    probe_results: VecDeque<bool>,
    failing: HashSet<String>,
    exec_status: i32,
}

#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, name: &str, status: ContainerStatus) -> Self {
        self.lock()
            .containers
            .insert(name.to_string(), (status, "mock".to_string()));
        self
    }

    pub fn with_network(self, network: &str) -> Self {
        self.lock().networks.insert(network.to_string());
        self
    }

    /// Queues probe results; once drained every probe succeeds
    pub fn with_probe_results(self, results: impl IntoIterator<Item = bool>) -> Self {
        self.lock().probe_results.extend(results);
        self
    }

    /// Makes create and stop fail for container `name`
    pub fn failing(self, name: &str) -> Self {
        self.lock().failing.insert(name.to_string());
        self
    }

    /// Exit status returned by every `exec`
    pub fn with_exec_status(self, status: i32) -> Self {
        self.lock().exec_status = status;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Names of created containers, in creation order
    pub fn created(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Create { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn failure(name: &str, action: &str) -> RuntimeError {
        RuntimeError::CommandFailed {
            command: format!("mock {} {}", action, name),
            status: 1,
            stderr: format!("mock {} failure for {}", action, name),
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn network_exists(&self, network: &str) -> RuntimeResult<bool> {
        Ok(self.lock().networks.contains(network))
    }

    async fn create_network(&self, network: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::CreateNetwork(network.to_string()));
        state.networks.insert(network.to_string());
        Ok(())
    }

    async fn container_status(&self, name: &str) -> RuntimeResult<ContainerStatus> {
        Ok(self
            .lock()
            .containers
            .get(name)
            .map(|(status, _)| *status)
            .unwrap_or(ContainerStatus::Missing))
    }

    async fn create(&self, descriptor: &ServiceDescriptor, network: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::Create {
            name: descriptor.name.clone(),
            network: network.to_string(),
        });
        if state.failing.contains(&descriptor.name) {
            return Err(Self::failure(&descriptor.name, "create"));
        }
        // Foreground containers have exited by the time create returns
        let status = if descriptor.detach {
            ContainerStatus::Running
        } else {
            ContainerStatus::Stopped
        };
        state
            .containers
            .insert(descriptor.name.clone(), (status, descriptor.image.clone()));
        Ok(())
    }

    async fn start(&self, name: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::Start(name.to_string()));
        match state.containers.get_mut(name) {
            Some((status, _)) => {
                *status = ContainerStatus::Running;
                Ok(())
            }
            None => Err(Self::failure(name, "start")),
        }
    }

    async fn stop(&self, name: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::Stop(name.to_string()));
        if state.failing.contains(name) {
            return Err(Self::failure(name, "stop"));
        }
        match state.containers.get_mut(name) {
            Some((status, _)) => {
                *status = ContainerStatus::Stopped;
                Ok(())
            }
            None => Err(Self::failure(name, "stop")),
        }
    }

    async fn remove(&self, name: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::Remove(name.to_string()));
        state.containers.remove(name);
        Ok(())
    }

    async fn list_running(&self) -> RuntimeResult<Vec<ContainerSummary>> {
        Ok(self
            .lock()
            .containers
            .iter()
            .filter(|(_, (status, _))| *status == ContainerStatus::Running)
            .map(|(name, (_, image))| ContainerSummary {
                name: name.clone(),
                image: image.clone(),
            })
            .collect())
    }

    async fn exec(&self, container: &str, argv: &[String]) -> RuntimeResult<ExecOutput> {
        let mut state = self.lock();
        state.calls.push(MockCall::Exec {
            container: container.to_string(),
            argv: argv.to_vec(),
        });
        Ok(ExecOutput {
            status: state.exec_status,
            ..Default::default()
        })
    }

    async fn probe(&self, _network: &str, image: &str, argv: &[String]) -> RuntimeResult<bool> {
        let mut state = self.lock();
        state.calls.push(MockCall::Probe {
            image: image.to_string(),
            argv: argv.to_vec(),
        });
        Ok(state.probe_results.pop_front().unwrap_or(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_and_list() {
        let runtime = MockRuntime::new()
            .with_container("a", ContainerStatus::Running)
            .with_container("b", ContainerStatus::Running);

        runtime.stop("a").await.unwrap();
        let running = runtime.list_running().await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].name, "b");

        assert!(runtime.stop("missing").await.is_err());
        runtime.start("a").await.unwrap();
        assert_eq!(runtime.list_running().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_probes_then_success() {
        let runtime = MockRuntime::new().with_probe_results([false]);
        assert!(!runtime.probe("n", "img", &[]).await.unwrap());
        assert!(runtime.probe("n", "img", &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_container() {
        let runtime = MockRuntime::new().failing("db");
        let err = runtime
            .create(&ServiceDescriptor::new("db", "postgres:16"), "n")
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::CommandFailed { status: 1, .. }));
        assert_eq!(
            runtime.container_status("db").await.unwrap(),
            ContainerStatus::Missing
        );
    }
}
