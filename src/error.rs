use std::path::PathBuf;
use thiserror::Error;

/// Failures while bringing up input and output devices.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("unknown key `{0}` (use an evdev name like BTN_LEFT or a numeric code)")]
    UnknownKey(String),
    #[error("no input device reports any of the bound keys")]
    NoDevices,
    #[error("failed to open {path}: {source}")]
    OpenDevice {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create virtual mouse: {0}")]
    VirtualMouse(#[source] std::io::Error),
}
