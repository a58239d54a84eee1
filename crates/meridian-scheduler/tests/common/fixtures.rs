//! Builders for sessions and pods used across integration tests.

use chrono::{Duration, Utc};

use meridian_api::{
    ApplicationSession, ContainerPort, ContainerSpec, PodSnapshot, Protocol, SessionSpec,
    SessionState, SessionStatus, SessionUid,
};

/// Builder for test sessions.
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    uid: String,
    application: String,
    state: SessionState,
    pod: Option<String>,
    created_secs_ago: i64,
    open_timeout_seconds: u32,
    kill_on_close: bool,
    deleting: bool,
    clients: Vec<String>,
}

impl SessionBuilder {
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_owned(),
            application: "default/echo".to_owned(),
            state: SessionState::Pending,
            pod: None,
            created_secs_ago: 0,
            open_timeout_seconds: 10,
            kill_on_close: false,
            deleting: false,
            clients: Vec::new(),
        }
    }

    pub fn application(mut self, application: &str) -> Self {
        self.application = application.to_owned();
        self
    }

    pub fn state(mut self, state: SessionState) -> Self {
        self.state = state;
        self
    }

    pub fn on_pod(mut self, pod: &str) -> Self {
        self.pod = Some(pod.to_owned());
        self
    }

    pub fn created_secs_ago(mut self, secs: i64) -> Self {
        self.created_secs_ago = secs;
        self
    }

    pub fn open_timeout_seconds(mut self, secs: u32) -> Self {
        self.open_timeout_seconds = secs;
        self
    }

    pub fn kill_on_close(mut self) -> Self {
        self.kill_on_close = true;
        self
    }

    pub fn deleting(mut self) -> Self {
        self.deleting = true;
        self
    }

    pub fn with_client(mut self, client: &str) -> Self {
        self.clients.push(client.to_owned());
        self
    }

    pub fn build(self) -> ApplicationSession {
        let now = Utc::now();
        ApplicationSession {
            uid: SessionUid::new(self.uid.clone()),
            name: format!("default/{}", self.uid),
            spec: SessionSpec {
                application_name: self.application,
                session_data: "c2Vzc2lvbg==".to_owned(),
                kill_instance_when_session_closed: self.kill_on_close,
                open_timeout_seconds: self.open_timeout_seconds,
                ..SessionSpec::default()
            },
            status: SessionStatus {
                session_status: self.state,
                pod_reference: self.pod,
                client_sessions: self.clients,
                ..SessionStatus::default()
            },
            creation_timestamp: now - Duration::seconds(self.created_secs_ago),
            deletion_timestamp: self.deleting.then_some(now),
        }
    }
}

/// Builder for test pods.
#[derive(Debug, Clone)]
pub struct PodBuilder {
    name: String,
    ports: Vec<(Protocol, String, u16)>,
    running: bool,
    terminating: bool,
}

impl PodBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ports: Vec::new(),
            running: true,
            terminating: false,
        }
    }

    pub fn with_tcp_port(mut self, host_ip: &str, host_port: u16) -> Self {
        self.ports.push((Protocol::Tcp, host_ip.to_owned(), host_port));
        self
    }

    pub fn terminating(mut self) -> Self {
        self.terminating = true;
        self
    }

    pub fn build(self) -> PodSnapshot {
        PodSnapshot {
            name: self.name,
            containers: vec![ContainerSpec {
                ports: self
                    .ports
                    .into_iter()
                    .map(|(protocol, host_ip, host_port)| ContainerPort {
                        protocol,
                        host_ip,
                        host_port,
                    })
                    .collect(),
            }],
            running: self.running,
            terminating: self.terminating,
        }
    }
}
