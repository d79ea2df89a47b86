//! Configuration file support for ymboot.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (YMBOOT_*)
//! 3. Local config file (./ymboot.toml)
//! 4. Global config file (~/.config/ymboot/config.toml)

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use ymboot::{IntegrityMode, SessionConfig};

/// Name of the per-project config file.
pub const LOCAL_CONFIG_FILE: &str = "ymboot.toml";

/// Application region start on the reference target.
pub const DEFAULT_BASE: u32 = 0x0801_0000;

/// Application region size on the reference target (sectors 4..8).
pub const DEFAULT_CAPACITY: u32 = 0x0007_0000;

/// Largest region the host-side receiver will buffer in memory (64 MiB).
pub const MAX_CAPACITY: u32 = 64 * 1024 * 1024;

/// Serial link settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSection {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Transfer tuning. Unset fields keep the engine defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferSection {
    /// Wait for one packet or reply, in milliseconds.
    pub packet_timeout_ms: Option<u32>,
    /// Whole-session watchdog, in milliseconds.
    pub session_timeout_ms: Option<u32>,
    /// Wait for a transmitter's reply, in milliseconds.
    pub response_timeout_ms: Option<u32>,
    /// Window for a confirming control byte, in milliseconds.
    pub control_timeout_ms: Option<u32>,
    /// Consecutive failures before giving up.
    pub max_errors: Option<u32>,
    /// Request the 8-bit checksum trailer instead of CRC-16.
    #[serde(default)]
    pub checksum: bool,
}

/// Emulated flash region used by `receive`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    /// First address of the region.
    pub base: Option<u32>,
    /// Region size in bytes.
    pub capacity: Option<u32>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Serial link settings.
    #[serde(default)]
    pub port: PortSection,
    /// Transfer tuning.
    #[serde(default)]
    pub transfer: TransferSection,
    /// Flash region.
    #[serde(default)]
    pub storage: StorageSection,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ymboot").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    fn merge(&mut self, other: Self) {
        let Self {
            port,
            transfer,
            storage,
        } = other;

        if port.serial.is_some() {
            self.port.serial = port.serial;
        }
        if port.baud.is_some() {
            self.port.baud = port.baud;
        }

        let t = &mut self.transfer;
        t.packet_timeout_ms = transfer.packet_timeout_ms.or(t.packet_timeout_ms);
        t.session_timeout_ms = transfer.session_timeout_ms.or(t.session_timeout_ms);
        t.response_timeout_ms = transfer.response_timeout_ms.or(t.response_timeout_ms);
        t.control_timeout_ms = transfer.control_timeout_ms.or(t.control_timeout_ms);
        t.max_errors = transfer.max_errors.or(t.max_errors);
        if transfer.checksum {
            t.checksum = true;
        }

        self.storage.base = storage.base.or(self.storage.base);
        self.storage.capacity = storage.capacity.or(self.storage.capacity);
    }

    /// Engine settings from the `[transfer]` section.
    ///
    /// `force_checksum` comes from the command line and wins over the file.
    pub fn session_config(&self, force_checksum: bool) -> SessionConfig {
        let t = &self.transfer;
        let mut session = SessionConfig::default();

        // Packet timeout first: it also rescales the watchdog.
        if let Some(ms) = t.packet_timeout_ms {
            session = session.with_packet_timeout(ms);
        }
        if let Some(ms) = t.session_timeout_ms {
            session = session.with_session_timeout(ms);
        }
        if let Some(ms) = t.response_timeout_ms {
            session = session.with_response_timeout(ms);
        }
        if let Some(ms) = t.control_timeout_ms {
            session = session.with_control_timeout(ms);
        }
        if let Some(n) = t.max_errors {
            session = session.with_max_errors(n);
        }
        if force_checksum || t.checksum {
            session = session.with_integrity(IntegrityMode::Checksum);
        }
        session
    }

    /// Region start, falling back to [`DEFAULT_BASE`].
    pub fn base(&self) -> u32 {
        self.storage
            .base
            .unwrap_or(DEFAULT_BASE)
    }

    /// Region size, falling back to [`DEFAULT_CAPACITY`].
    pub fn capacity(&self) -> u32 {
        self.storage
            .capacity
            .unwrap_or(DEFAULT_CAPACITY)
    }
}
