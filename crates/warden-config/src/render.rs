//! Pure config rendering.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use warden_core::{
    QuorumMode, UnitId, CLIENT_PORT, ELECTION_PORT, PEER_PORT, SECURE_CLIENT_PORT,
};

/// One line of the dynamic membership file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub id: UnitId,
    pub host: String,
}

impl ServerEntry {
    /// Renders the canonical dynamic-membership form:
    /// `server.<id>=<host>:<peer>:<election>:participant;<client-port>`.
    pub fn render(&self, mode: QuorumMode) -> String {
        let client_port = if mode == QuorumMode::Ssl {
            SECURE_CLIENT_PORT
        } else {
            CLIENT_PORT
        };
        format!(
            "server.{}={}:{PEER_PORT}:{ELECTION_PORT}:participant;{client_port}",
            self.id, self.host
        )
    }
}

/// Everything rendering depends on. Assembled by the agent from the
/// coordinator-approved snapshot plus local paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderInput {
    /// This unit's id; becomes the `myid` file.
    pub myid: UnitId,
    /// Admitted servers, ascending id order.
    pub servers: Vec<ServerEntry>,
    /// Target quorum encryption mode.
    pub mode: QuorumMode,
    /// Unit accepts both peer transports (mid encryption transition).
    pub unified: bool,
    /// Internal user -> password for the JAAS config, sorted.
    pub credentials: BTreeMap<String, String>,
    /// Workload data directory.
    pub data_dir: String,
    /// Conf directory, used for the dynamic-config file pointer.
    pub conf_dir: String,
}

/// The rendered file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub myid: String,
    pub dynamic: String,
    pub properties: String,
    pub jaas: String,
    pub jvm_flags: String,
}

impl RenderInput {
    pub fn render(&self) -> Rendered {
        Rendered {
            myid: format!("{}\n", self.myid),
            dynamic: self.render_dynamic(),
            properties: self.render_properties(),
            jaas: self.render_jaas(),
            jvm_flags: self.render_jvm_flags(),
        }
    }

    fn dynamic_path(&self) -> String {
        format!("{}/zookeeper-dynamic.properties", self.conf_dir)
    }

    fn jaas_path(&self) -> String {
        format!("{}/zookeeper-jaas.cfg", self.conf_dir)
    }

    fn render_dynamic(&self) -> String {
        let mut out = String::new();
        for server in &self.servers {
            let _ = writeln!(out, "{}", server.render(self.mode));
        }
        out
    }

    fn render_properties(&self) -> String {
        let mut lines = vec![
            format!("dataDir={}", self.data_dir),
            format!("dataLogDir={}/logs", self.data_dir),
            "tickTime=2000".to_string(),
            "initLimit=5".to_string(),
            "syncLimit=2".to_string(),
            // dynamic reconfiguration is the whole point
            "reconfigEnabled=true".to_string(),
            "standaloneEnabled=false".to_string(),
            "4lw.commands.whitelist=mntr,srvr,stat,ruok".to_string(),
            "DigestAuthenticationProvider.digestAlg=SHA3-256".to_string(),
            "quorum.auth.enableSasl=true".to_string(),
            "quorum.auth.learnerRequireSasl=true".to_string(),
            "quorum.auth.serverRequireSasl=true".to_string(),
            "authProvider.sasl=org.apache.zookeeper.server.auth.SASLAuthenticationProvider"
                .to_string(),
            format!("dynamicConfigFile={}", self.dynamic_path()),
        ];

        if self.mode == QuorumMode::Ssl {
            lines.push("sslQuorum=true".to_string());
            lines.push(format!("secureClientPort={SECURE_CLIENT_PORT}"));
        } else {
            lines.push(format!("clientPort={CLIENT_PORT}"));
        }
        if self.unified {
            // accept both peer transports while the ensemble flips
            lines.push("portUnification=true".to_string());
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    fn render_jaas(&self) -> String {
        let mut users = String::new();
        for (user, password) in &self.credentials {
            let _ = writeln!(users, "    user_{user}=\"{password}\"");
        }
        format!(
            "QuorumServer {{\n    org.apache.zookeeper.server.auth.DigestLoginModule required\n{users}    ;\n}};\n\
             QuorumLearner {{\n    org.apache.zookeeper.server.auth.DigestLoginModule required\n{users}    ;\n}};\n\
             Server {{\n    org.apache.zookeeper.server.auth.DigestLoginModule required\n{users}    ;\n}};\n"
        )
    }

    /// JVM flags passed via `SERVER_JVMFLAGS`. The dynamic-config pointer
    /// rides along as a system property because the server must know its
    /// member list before it can read the dynamic file in some startup
    /// paths.
    fn render_jvm_flags(&self) -> String {
        format!(
            "-Dzookeeper.dynamicConfigFile={} -Djava.security.auth.login.config={}",
            self.dynamic_path(),
            self.jaas_path()
        )
    }
}
