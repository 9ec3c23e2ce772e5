use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chatterbox_audio::EngineConfig;
use chatterbox_core::DEFAULT_SHUTDOWN_GRACE;

use crate::{BridgeError, Result};

/// High-level configuration for the Chatterbox server
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

/// HTTP listener settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("CHATTERBOX_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("CHATTERBOX_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8765),
            shutdown_grace_ms: std::env::var("CHATTERBOX_SHUTDOWN_GRACE_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE.as_millis() as u64),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr> {
        let raw = format!("{}:{}", self.host, self.port);
        // "localhost" is not a socket address literal
        let raw = raw.replacen("localhost:", "127.0.0.1:", 1);
        raw.parse()
            .map_err(|e| BridgeError::Config(format!("invalid listen address {}: {}", raw, e)))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        // Feature module defaults already consider env vars
        Self {
            server: ServerConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file (path via CHATTERBOX_CONFIG or ./chatterbox.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path =
            std::env::var("CHATTERBOX_CONFIG").unwrap_or_else(|_| "chatterbox.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "bridge", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match Self::overlay_toml(default.clone(), &s) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(target: "bridge", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "bridge", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    /// Apply the tables of a TOML document on top of `base`.
    pub fn overlay_toml(base: Self, toml_src: &str) -> Result<Self> {
        let t: BridgeToml =
            toml::from_str(toml_src).map_err(|e| BridgeError::Config(e.to_string()))?;
        Ok(t.overlay(base))
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct BridgeToml {
    pub server: Option<ServerToml>,
    pub engine: Option<EngineToml>,
}

impl BridgeToml {
    fn overlay(self, mut base: BridgeConfig) -> BridgeConfig {
        if let Some(s) = self.server {
            s.apply(&mut base.server);
        }
        if let Some(e) = self.engine {
            e.apply(&mut base.engine);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ServerToml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub shutdown_grace_ms: Option<u64>,
}
impl ServerToml {
    fn apply(self, s: &mut ServerConfig) {
        if let Some(x) = self.host {
            s.host = x;
        }
        if let Some(x) = self.port {
            s.port = x;
        }
        if let Some(x) = self.shutdown_grace_ms {
            s.shutdown_grace_ms = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct EngineToml {
    pub piper_bin: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
    pub espeak_bin: Option<PathBuf>,
    pub voice: Option<String>,
    pub timeout_ms: Option<u64>,
}
impl EngineToml {
    fn apply(self, e: &mut EngineConfig) {
        if let Some(x) = self.piper_bin {
            e.piper_bin = Some(x);
        }
        if let Some(x) = self.piper_voice {
            e.piper_voice = Some(x);
        }
        if let Some(x) = self.piper_voice_dir {
            e.piper_voice_dir = Some(x);
        }
        if let Some(x) = self.espeak_bin {
            e.espeak_bin = Some(x);
        }
        if let Some(x) = self.voice {
            e.voice = Some(x);
        }
        if let Some(x) = self.timeout_ms {
            e.timeout_ms = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BridgeConfig {
        BridgeConfig {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8765,
                shutdown_grace_ms: 500,
            },
            engine: EngineConfig::empty(),
        }
    }

    #[test]
    fn test_overlay_replaces_only_given_keys() {
        let cfg = BridgeConfig::overlay_toml(
            base(),
            r#"
            [server]
            port = 9000

            [engine]
            espeak_bin = "/usr/local/bin/espeak-ng"
            timeout_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.shutdown_grace_ms, 500);
        assert_eq!(
            cfg.engine.espeak_bin,
            Some(PathBuf::from("/usr/local/bin/espeak-ng"))
        );
        assert_eq!(cfg.engine.timeout_ms, 1500);
        assert_eq!(cfg.engine.piper_bin, None);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = BridgeConfig::overlay_toml(base(), "[server]\nport = \"eighty\"").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_localhost_resolves_to_loopback() {
        let mut server = base().server;
        server.host = "localhost".into();
        assert_eq!(server.addr().unwrap().to_string(), "127.0.0.1:8765");
        assert_eq!(server.shutdown_grace(), Duration::from_millis(500));
    }
}
