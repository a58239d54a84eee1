//! Pod snapshots as seen by the control plane.

use serde::{Deserialize, Serialize};

/// Transport protocol exposed by a container port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// TCP.
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

/// A port a container exposes on its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    /// Transport protocol.
    #[serde(default)]
    pub protocol: Protocol,
    /// Host IP the port is bound to.
    pub host_ip: String,
    /// Host port number.
    pub host_port: u16,
}

/// A container within a pod, reduced to what the scheduler needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    /// Ports declared by the container.
    pub ports: Vec<ContainerPort>,
}

/// The control plane's view of a remote execution instance.
///
/// Pod lifecycle is owned by the pod manager; the scheduler only reads
/// this snapshot when binding sessions and deciding whether a pod may be
/// terminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSnapshot {
    /// Pod name, unique within its application.
    pub name: String,
    /// Containers running in the pod.
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
    /// True while the pod is up and able to accept a session.
    pub running: bool,
    /// True once pod termination has begun.
    #[serde(default)]
    pub terminating: bool,
}

impl PodSnapshot {
    /// Iterate all `(protocol, host_ip, host_port)` triples the pod
    /// exposes, in declaration order.
    pub fn host_ports(&self) -> impl Iterator<Item = &ContainerPort> {
        self.containers.iter().flat_map(|c| c.ports.iter())
    }
}
