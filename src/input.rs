use crate::binds::{BindSnapshot, BindSource, LogicalBind};
use crate::error::SetupError;
use crate::virtual_mouse::VIRTUAL_MOUSE_NAME;
use clap::ValueEnum;
use evdev::{AttributeSet, Device, InputEventKind, Key};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Highest key code the kernel defines (KEY_MAX).
const KEY_MAX: u16 = 0x2ff;

/// Kernel names that share a code with another name. A key's `Debug` form
/// gives only one name per code, so these are looked up first.
const KEY_ALIASES: [(&str, u16); 17] = [
    ("KEY_MIN_INTERESTING", 113),
    ("KEY_HANGUEL", 122),
    ("KEY_SCREENLOCK", 152),
    ("KEY_DIRECTION", 153),
    ("KEY_BRIGHTNESS_ZERO", 244),
    ("KEY_WIMAX", 246),
    ("BTN_MISC", 0x100),
    ("BTN_MOUSE", 0x110),
    ("BTN_JOYSTICK", 0x120),
    ("BTN_GAMEPAD", 0x130),
    ("BTN_A", 0x130),
    ("BTN_B", 0x131),
    ("BTN_X", 0x133),
    ("BTN_Y", 0x134),
    ("BTN_DIGI", 0x140),
    ("BTN_WHEEL", 0x150),
    ("BTN_TRIGGER_HAPPY", 0x2c0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputMode {
    /// Query each device's key state every tick.
    Poll,
    /// Drain queued key events every tick.
    Events,
}

/// Resolve an evdev key name (`BTN_LEFT`, `key_leftshift`, the alias
/// `BTN_MOUSE`) or a numeric code (`272`, `0x110`).
pub fn parse_key(text: &str) -> Result<Key, SetupError> {
    let text = text.trim();
    let code = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => text.parse::<u16>().ok(),
    };
    if let Some(code) = code {
        return if code <= KEY_MAX {
            Ok(Key::new(code))
        } else {
            Err(SetupError::UnknownKey(text.to_string()))
        };
    }

    let name = text.to_ascii_uppercase();
    if let Some(&(_, code)) = KEY_ALIASES.iter().find(|(alias, _)| *alias == name) {
        return Ok(Key::new(code));
    }
    (0..=KEY_MAX)
        .map(Key::new)
        .find(|key| format!("{:?}", key) == name)
        .ok_or_else(|| SetupError::UnknownKey(text.to_string()))
}

/// Physical key for each logical bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindKeys {
    keys: [Key; 4],
}

impl BindKeys {
    pub fn new(left: Key, right: Key, speed: Key, cycle: Key) -> Self {
        Self {
            keys: [left, right, speed, cycle],
        }
    }

    pub fn key(&self, bind: LogicalBind) -> Key {
        self.keys[bind as usize]
    }

    /// Snapshot of the binds whose keys are in `pressed`.
    pub fn snapshot(&self, pressed: &AttributeSet<Key>, into: &mut BindSnapshot) {
        for bind in LogicalBind::ALL {
            if pressed.contains(self.key(bind)) {
                into.set(bind, true);
            }
        }
    }
}

/// Find every input device that reports at least one bound key.
pub fn find_bind_devices(keys: &BindKeys) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for i in 0..64 {
        let path = PathBuf::from(format!("/dev/input/event{}", i));
        if !path.exists() {
            continue;
        }
        if let Ok(device) = Device::open(&path) {
            let name = device.name().unwrap_or("unknown");
            if name == VIRTUAL_MOUSE_NAME {
                continue;
            }
            let relevant = device.supported_keys().is_some_and(|supported| {
                LogicalBind::ALL
                    .iter()
                    .any(|&bind| supported.contains(keys.key(bind)))
            });
            if relevant {
                log::info!("Found input device: {} at {}", name, path.display());
                found.push(path);
            }
        }
    }
    found
}

struct InputDevice {
    path: PathBuf,
    device: Device,
    /// Keys currently down, as last observed.
    pressed: AttributeSet<Key>,
    failing: bool,
}

impl InputDevice {
    fn open(path: &Path) -> Result<Self, SetupError> {
        let device = Device::open(path).map_err(|source| SetupError::OpenDevice {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!(
            "Opened input device: {} ({})",
            device.name().unwrap_or("unknown"),
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            device,
            pressed: AttributeSet::new(),
            failing: false,
        })
    }

    fn set_nonblocking(&self) -> std::io::Result<()> {
        let fd = self.device.as_raw_fd();
        // SAFETY: fd is owned by `self.device` and stays open for the call.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(std::io::Error::last_os_error());
        }
        // SAFETY: as above.
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn report(&mut self, result: std::io::Result<()>) {
        match result {
            Ok(()) => {
                if self.failing {
                    log::info!("Input device {} recovered", self.path.display());
                    self.failing = false;
                }
            }
            Err(e) => {
                if !self.failing {
                    log::warn!("Failed to read {}: {}", self.path.display(), e);
                    self.failing = true;
                }
                self.pressed = AttributeSet::new();
            }
        }
    }

    fn poll_state(&mut self) {
        let result = self.device.get_key_state().map(|state| self.pressed = state);
        self.report(result);
    }

    fn drain_events(&mut self) {
        let result = match self.device.fetch_events() {
            Ok(events) => {
                for ev in events {
                    if let InputEventKind::Key(key) = ev.kind() {
                        match ev.value() {
                            0 => {
                                self.pressed.remove(key);
                            }
                            1 => {
                                self.pressed.insert(key);
                            }
                            // Autorepeat.
                            _ => {}
                        }
                    }
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        };
        self.report(result);
    }
}

/// Reads bind state from one or more evdev devices without grabbing them.
pub struct EvdevBindSource {
    mode: InputMode,
    keys: BindKeys,
    devices: Vec<InputDevice>,
}

impl EvdevBindSource {
    pub fn open(paths: &[PathBuf], keys: BindKeys, mode: InputMode) -> Result<Self, SetupError> {
        if paths.is_empty() {
            return Err(SetupError::NoDevices);
        }
        let devices = paths
            .iter()
            .map(|path| InputDevice::open(path))
            .collect::<Result<Vec<_>, _>>()?;
        if mode == InputMode::Events {
            for device in &devices {
                if let Err(e) = device.set_nonblocking() {
                    log::warn!(
                        "Failed to set {} non-blocking: {}",
                        device.path.display(),
                        e
                    );
                }
            }
        }
        let mut source = Self {
            mode,
            keys,
            devices,
        };
        source.resync();
        Ok(source)
    }
}

impl BindSource for EvdevBindSource {
    fn refresh(&mut self) -> BindSnapshot {
        let mut snapshot = BindSnapshot::default();
        for device in &mut self.devices {
            match self.mode {
                InputMode::Poll => device.poll_state(),
                InputMode::Events => device.drain_events(),
            }
            self.keys.snapshot(&device.pressed, &mut snapshot);
        }
        snapshot
    }

    fn resync(&mut self) {
        for device in &mut self.devices {
            if self.mode == InputMode::Events {
                // Discard whatever queued up while idle.
                device.drain_events();
            }
            device.poll_state();
        }
    }
}
