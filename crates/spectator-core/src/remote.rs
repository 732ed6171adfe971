//! Optional web controller: remote commands (restart, rotation pause, next player) and the
//! server the spectator should be on.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::session::ServerTarget;

type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteCommands {
    pub game_restart: bool,
    pub pause_rotation: bool,
    pub resume_rotation: bool,
    pub next_player: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GameRestart,
    PauseRotation,
    ResumeRotation,
    NextPlayer,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::GameRestart => "game_restart",
            Command::PauseRotation => "pause_rotation",
            Command::ResumeRotation => "resume_rotation",
            Command::NextPlayer => "next_player",
        }
    }
}

impl RemoteCommands {
    /// Issued commands, in the order they are applied.
    pub fn issued(&self) -> Vec<Command> {
        [
            (self.game_restart, Command::GameRestart),
            (self.pause_rotation, Command::PauseRotation),
            (self.resume_rotation, Command::ResumeRotation),
            (self.next_player, Command::NextPlayer),
        ]
        .into_iter()
        .filter_map(|(set, command)| set.then_some(command))
        .collect()
    }
}

pub trait RemoteControl: Send + Sync {
    fn commands<'a>(&'a self) -> RemoteFuture<'a, RemoteCommands>;

    /// Resets a command flag on the controller so it is applied once.
    fn acknowledge<'a>(&'a self, command: Command) -> RemoteFuture<'a, ()>;

    fn join_server<'a>(&'a self) -> RemoteFuture<'a, Option<ServerTarget>>;

    fn post_current_server<'a>(&'a self, server: &'a ServerTarget) -> RemoteFuture<'a, ()>;
}

/// Game ports arrive as numbers from the controller but are strings everywhere else.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum PortValue {
    Number(u32),
    Text(String),
}

impl PortValue {
    fn into_string(self) -> String {
        match self {
            PortValue::Number(n) => n.to_string(),
            PortValue::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct ServerWire {
    ip: String,
    #[serde(rename = "gamePort")]
    game_port: PortValue,
    #[serde(default)]
    password: Option<String>,
}

impl From<ServerWire> for ServerTarget {
    fn from(wire: ServerWire) -> Self {
        ServerTarget::new(wire.ip, wire.game_port.into_string(), wire.password)
    }
}

impl From<&ServerTarget> for ServerWire {
    fn from(target: &ServerTarget) -> Self {
        Self {
            ip: target.ip.clone(),
            game_port: PortValue::Text(target.port.clone()),
            password: target.password.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_uri: String,
    app_key: Option<String>,
}

impl HttpRemote {
    pub fn new(base_uri: &str, app_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build controller http client")?;
        Ok(Self {
            client,
            base_uri: base_uri.trim_end_matches('/').to_string(),
            app_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_uri, path.trim_start_matches('/'))
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_key(self.client.get(self.url(path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_key(self.client.post(self.url(path)))
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.app_key {
            Some(key) => request.header("X-App-Key", key),
            None => request,
        }
    }
}

impl RemoteControl for HttpRemote {
    fn commands<'a>(&'a self) -> RemoteFuture<'a, RemoteCommands> {
        Box::pin(async move {
            self.get("commands")
                .send()
                .await
                .context("controller commands request failed")?
                .error_for_status()
                .context("controller commands non-2xx response")?
                .json::<RemoteCommands>()
                .await
                .context("controller commands decode failed")
        })
    }

    fn acknowledge<'a>(&'a self, command: Command) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let mut body = serde_json::Map::new();
            body.insert(command.name().to_string(), serde_json::Value::Bool(false));
            self.post("commands")
                .json(&body)
                .send()
                .await
                .context("controller command reset failed")?
                .error_for_status()
                .context("controller command reset non-2xx response")?;
            Ok(())
        })
    }

    fn join_server<'a>(&'a self) -> RemoteFuture<'a, Option<ServerTarget>> {
        Box::pin(async move {
            let wire = self
                .get("servers/join")
                .send()
                .await
                .context("controller join server request failed")?
                .error_for_status()
                .context("controller join server non-2xx response")?
                .json::<Option<ServerWire>>()
                .await
                .context("controller join server decode failed")?;
            Ok(wire.map(ServerTarget::from))
        })
    }

    fn post_current_server<'a>(&'a self, server: &'a ServerTarget) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            self.post("servers/current")
                .json(&ServerWire::from(server))
                .send()
                .await
                .context("controller current server update failed")?
                .error_for_status()
                .context("controller current server non-2xx response")?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_command_flags_default_to_false() -> anyhow::Result<()> {
        let cmds: RemoteCommands = serde_json::from_str(r#"{"next_player": true}"#)?;
        assert_eq!(cmds.issued(), vec![Command::NextPlayer]);
        Ok(())
    }

    #[test]
    fn join_server_accepts_numeric_port() -> anyhow::Result<()> {
        let wire: Option<ServerWire> =
            serde_json::from_str(r#"{"ip": "1.2.3.4", "gamePort": 16567, "password": null}"#)?;
        let target = wire.map(ServerTarget::from);
        assert_eq!(target, Some(ServerTarget::new("1.2.3.4", "16567", None)));

        let none: Option<ServerWire> = serde_json::from_str("null")?;
        assert!(none.is_none());
        Ok(())
    }

    #[test]
    fn urls_join_cleanly() -> anyhow::Result<()> {
        let remote = HttpRemote::new("http://ctl.local/api/", None, Duration::from_secs(2))?;
        assert_eq!(remote.url("servers/join"), "http://ctl.local/api/servers/join");
        Ok(())
    }
}
