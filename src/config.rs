// Конфигурация приложения
// В релизе по умолчанию пишем только предупреждения, RUST_LOG это переопределяет

use crate::error::ConfigError;
use crate::peer::media::MediaConstraints;
use crate::peer::types::ServerConfig;
use crate::utils::random_id;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[cfg(debug_assertions)]
pub const DEFAULT_LOG_FILTER: &str = "debug,webrtc=warn,webrtc_ice=warn,webrtc_mdns=warn";

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Публичный STUN по умолчанию
pub const DEFAULT_STUN: &str = "stun:stun.l.google.com:19302";

fn default_ice_servers() -> Vec<ServerConfig> {
    vec![ServerConfig::stun("default-stun", DEFAULT_STUN)]
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Настройки одного клиента звонка
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Идентификатор стороны; по нему разрешаются встречные offer
    #[serde(default = "random_id")]
    pub endpoint_id: String,
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<ServerConfig>,
    #[serde(default)]
    pub media: MediaConstraints,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            endpoint_id: random_id(),
            ice_servers: default_ice_servers(),
            media: MediaConstraints::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl CallConfig {
    /// Проверка ICE серверов
    pub fn validate(&self) -> Result<(), ConfigError> {
        for server in &self.ice_servers {
            if server.url.trim().is_empty() {
                return Err(ConfigError::EmptyUrl(server.id.clone()));
            }
            if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none())
            {
                return Err(ConfigError::MissingTurnCredentials(server.id.clone()));
            }
        }
        Ok(())
    }
}

/// Аргументы командной строки
#[derive(Parser, Debug)]
#[command(name = "p2pcall", version, about = "Two-party WebRTC call over a signaling relay")]
pub struct Cli {
    /// Relay address: ws://host:port/path, or `stdio` for copy/paste signaling
    #[arg(long, env = "P2PCALL_RELAY", default_value = "stdio")]
    pub relay: String,

    /// Start the call instead of waiting for an offer
    #[arg(long)]
    pub call: bool,

    /// Endpoint identifier (random by default)
    #[arg(long, env = "P2PCALL_ENDPOINT_ID")]
    pub endpoint_id: Option<String>,

    /// STUN/TURN server URLs; replaces the default public STUN server
    #[arg(long = "ice-server", env = "P2PCALL_ICE_SERVERS", value_delimiter = ',')]
    pub ice_servers: Vec<String>,

    /// Username for TURN servers
    #[arg(long, env = "P2PCALL_TURN_USERNAME")]
    pub turn_username: Option<String>,

    /// Credential for TURN servers
    #[arg(long, env = "P2PCALL_TURN_CREDENTIAL")]
    pub turn_credential: Option<String>,

    /// Do not capture audio
    #[arg(long)]
    pub no_audio: bool,

    /// Do not capture video
    #[arg(long)]
    pub no_video: bool,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = DEFAULT_LOG_FILTER)]
    pub log: String,
}

impl Cli {
    pub fn to_config(&self) -> CallConfig {
        let mut config = CallConfig {
            media: MediaConstraints {
                audio: !self.no_audio,
                video: !self.no_video,
            },
            log_filter: self.log.clone(),
            ..Default::default()
        };
        if let Some(id) = &self.endpoint_id {
            config.endpoint_id = id.clone();
        }
        if !self.ice_servers.is_empty() {
            config.ice_servers = self
                .ice_servers
                .iter()
                .enumerate()
                .map(|(i, url)| {
                    let is_turn = url.starts_with("turn:") || url.starts_with("turns:");
                    ServerConfig {
                        id: format!("cli-{i}"),
                        r#type: if is_turn { "turn" } else { "stun" }.into(),
                        url: url.clone(),
                        username: self.turn_username.clone().filter(|_| is_turn),
                        credential: self.turn_credential.clone().filter(|_| is_turn),
                    }
                })
                .collect();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_public_stun() {
        let config = CallConfig::default();
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.ice_servers[0].url, DEFAULT_STUN);
        assert!(config.media.audio && config.media.video);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: CallConfig = serde_json::from_str(r#"{"endpoint_id":"alice"}"#).unwrap();
        assert_eq!(config.endpoint_id, "alice");
        assert_eq!(config.ice_servers[0].url, DEFAULT_STUN);
    }

    #[test]
    fn turn_without_credentials_is_invalid() {
        let config = CallConfig {
            ice_servers: vec![ServerConfig {
                id: "relay".into(),
                r#type: "turn".into(),
                url: "turn:turn.example.org:3478".into(),
                username: Some("user".into()),
                credential: None,
            }],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingTurnCredentials(id)) if id == "relay"
        ));
    }

    #[test]
    fn empty_url_is_invalid() {
        let config = CallConfig {
            ice_servers: vec![ServerConfig::stun("blank", " ")],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyUrl(_))));
    }

    #[test]
    fn cli_overrides_servers_and_media() {
        let cli = Cli::parse_from([
            "p2pcall",
            "--ice-server",
            "stun:stun.example.org:3478,turn:turn.example.org:3478",
            "--turn-username",
            "u",
            "--turn-credential",
            "p",
            "--no-video",
            "--endpoint-id",
            "bob",
        ]);
        let config = cli.to_config();
        assert_eq!(config.endpoint_id, "bob");
        assert!(config.media.audio);
        assert!(!config.media.video);
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.ice_servers[0].username, None);
        assert_eq!(config.ice_servers[1].r#type, "turn");
        assert_eq!(config.ice_servers[1].credential.as_deref(), Some("p"));
        assert!(config.validate().is_ok());
    }
}
