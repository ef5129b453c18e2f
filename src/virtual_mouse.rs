use crate::error::SetupError;
use evdev::uinput::VirtualDeviceBuilder;
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId, Key, RelativeAxisType};

pub const VIRTUAL_MOUSE_NAME: &str = "turnbinds Mouse";

/// Relative pointer output. Fire-and-forget: failures are not reported.
pub trait MouseInjector {
    fn move_relative(&mut self, dx: i32, dy: i32);
}

pub struct VirtualMouse {
    device: evdev::uinput::VirtualDevice,
}

impl VirtualMouse {
    pub fn new() -> Result<Self, SetupError> {
        let device = Self::build().map_err(SetupError::VirtualMouse)?;
        log::info!("Created virtual mouse: {}", VIRTUAL_MOUSE_NAME);
        Ok(Self { device })
    }

    fn build() -> std::io::Result<evdev::uinput::VirtualDevice> {
        // Buttons make compositors and games classify this as a mouse.
        let mut keys = AttributeSet::<Key>::new();
        keys.insert(Key::BTN_LEFT);
        keys.insert(Key::BTN_RIGHT);

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);

        VirtualDeviceBuilder::new()?
            .name(VIRTUAL_MOUSE_NAME)
            .input_id(InputId::new(BusType::BUS_VIRTUAL, 0x1234, 0x5679, 1))
            .with_keys(&keys)?
            .with_relative_axes(&axes)?
            .build()
    }
}

impl MouseInjector for VirtualMouse {
    fn move_relative(&mut self, dx: i32, dy: i32) {
        let mut events = Vec::with_capacity(3);
        if dx != 0 {
            events.push(InputEvent::new_now(
                EventType::RELATIVE,
                RelativeAxisType::REL_X.0,
                dx,
            ));
        }
        if dy != 0 {
            events.push(InputEvent::new_now(
                EventType::RELATIVE,
                RelativeAxisType::REL_Y.0,
                dy,
            ));
        }
        if events.is_empty() {
            return;
        }
        events.push(InputEvent::new_now(EventType::SYNCHRONIZATION, 0, 0));
        if let Err(e) = self.device.emit(&events) {
            log::warn!("Failed to emit mouse motion: {}", e);
        }
    }
}

/// Records every motion instead of moving the pointer.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMouse {
    pub moves: Vec<(i32, i32)>,
}

#[cfg(test)]
impl RecordingMouse {
    pub fn total_dx(&self) -> i64 {
        self.moves.iter().map(|&(dx, _)| dx as i64).sum()
    }
}

#[cfg(test)]
impl MouseInjector for RecordingMouse {
    fn move_relative(&mut self, dx: i32, dy: i32) {
        self.moves.push((dx, dy));
    }
}
