use crate::input::InputMode;
use crate::params::ParameterText;
use crate::scheduler::SleepStrategy;
use clap::Parser;
use std::path::PathBuf;

/// Turn binds for Linux: hold a key or button to turn at a constant,
/// configurable yaw speed. Movement goes out through a virtual uinput mouse.
#[derive(Parser, Debug)]
#[command(name = "turnbinds")]
pub struct Config {
    /// Key that turns left: evdev name (BTN_LEFT, aliases like BTN_MOUSE) or numeric code
    #[arg(long, default_value = "BTN_LEFT")]
    pub bind_left: String,

    /// Key that turns right
    #[arg(long, default_value = "BTN_RIGHT")]
    pub bind_right: String,

    /// Key that scales turn speed by --anglespeedkey while held
    #[arg(long, default_value = "KEY_LEFTSHIFT")]
    pub bind_speed: String,

    /// Key that steps to the next cycle position
    #[arg(long, default_value = "BTN_SIDE")]
    pub bind_cycle: String,

    /// Maximum movement updates per second
    #[arg(long, default_value = "1000", allow_hyphen_values = true)]
    pub rate: String,

    /// Tick budget in 100ns units (3500 = 0.35ms)
    #[arg(long, default_value = "3500", allow_hyphen_values = true)]
    pub sleep: String,

    /// Turn speed in degrees per second; space-separated values form a cycle
    #[arg(long, default_value = "75 120 210", allow_hyphen_values = true)]
    pub yawspeed: String,

    /// In-game mouse sensitivity (cycle)
    #[arg(long, default_value = "1.0", allow_hyphen_values = true)]
    pub sensitivity: String,

    /// Speed factor while the speed key is held (cycle)
    #[arg(long, default_value = "0.67", allow_hyphen_values = true)]
    pub anglespeedkey: String,

    /// Degrees per mouse count, the game's m_yaw (cycle)
    #[arg(long, default_value = "0.022", allow_hyphen_values = true)]
    pub yaw: String,

    /// Initial cycle position
    #[arg(long, default_value_t = 0)]
    pub current: usize,

    /// Start disabled (enable with `turnbinds toggle`)
    #[arg(long, default_value_t = false)]
    pub disabled: bool,

    /// evdev device to read binds from; repeatable. Default: auto-detect
    #[arg(short, long)]
    pub device: Vec<PathBuf>,

    /// How bind state is read from the devices
    #[arg(long, value_enum, default_value_t = InputMode::Poll)]
    pub input_mode: InputMode,

    /// How the loop sleeps between ticks
    #[arg(long, value_enum, default_value_t = SleepStrategy::Spin)]
    pub sleep_strategy: SleepStrategy,

    /// Requested timer slack in 100ns units
    #[arg(long, default_value_t = 1)]
    pub timer_resolution: u32,

    /// Log debug diagnostics every 1000 active ticks
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

impl Config {
    pub fn parameter_text(&self) -> ParameterText {
        ParameterText {
            rate: self.rate.clone(),
            sleep: self.sleep.clone(),
            yawspeed: self.yawspeed.clone(),
            sensitivity: self.sensitivity.clone(),
            anglespeedkey: self.anglespeedkey.clone(),
            yaw: self.yaw.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_parameter_defaults() {
        let config = Config::try_parse_from(["turnbinds"]).unwrap();
        assert_eq!(config.parameter_text(), ParameterText::default());
        assert_eq!(config.bind_left, "BTN_LEFT");
        assert_eq!(config.bind_cycle, "BTN_SIDE");
        assert_eq!(config.input_mode, InputMode::Poll);
        assert_eq!(config.sleep_strategy, SleepStrategy::Spin);
        assert!(config.device.is_empty());
        assert!(!config.disabled);
    }

    #[test]
    fn parses_overrides() {
        let config = Config::try_parse_from([
            "turnbinds",
            "--yawspeed",
            "100 200",
            "--rate",
            "-5",
            "-d",
            "/dev/input/event3",
            "--device",
            "/dev/input/event7",
            "--input-mode",
            "events",
            "--sleep-strategy",
            "native",
            "--disabled",
        ])
        .unwrap();
        assert_eq!(config.yawspeed, "100 200");
        // Kept as text; validation happens when parameters load.
        assert_eq!(config.rate, "-5");
        assert_eq!(
            config.device,
            vec![
                PathBuf::from("/dev/input/event3"),
                PathBuf::from("/dev/input/event7")
            ]
        );
        assert_eq!(config.input_mode, InputMode::Events);
        assert_eq!(config.sleep_strategy, SleepStrategy::Native);
        assert!(config.disabled);
    }

    #[test]
    fn rejects_unknown_modes() {
        assert!(Config::try_parse_from(["turnbinds", "--input-mode", "raw"]).is_err());
    }
}
