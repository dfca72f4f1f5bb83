use std::io;
use thiserror::Error;
use std::str::Utf8Error;
use btleplug;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },

    #[error("Unknown model code {0:?}")]
    InvalidModel(String),

    #[error("Idle window of {0} ticks is too short, at least 3 ticks are required")]
    IdleWindowTooShort(u32),

    #[error("Tick interval of {0} s is too short, it must be longer than the bluetooth call deadline")]
    TickIntervalTooShort(u64),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Error communicating with the bluetooth stack (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Device {0} has no properties")]
    MissingProperties(String),

    #[error("Call into the bluetooth stack took longer than {0} ms")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start monitor (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start monitor (transport): {source}")]
    TransportError { #[from] source: TransportError },

    #[error("I/O error: {source}")]
    Io { #[from] source: io::Error },

    #[error("Failed to encode device list: {source}")]
    Encode { #[from] source: serde_json::Error },
}
