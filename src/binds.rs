#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalBind {
    Left,
    Right,
    Speed,
    Cycle,
}

impl LogicalBind {
    pub const ALL: [LogicalBind; 4] = [
        LogicalBind::Left,
        LogicalBind::Right,
        LogicalBind::Speed,
        LogicalBind::Cycle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LogicalBind::Left => "left",
            LogicalBind::Right => "right",
            LogicalBind::Speed => "speed",
            LogicalBind::Cycle => "cycle",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Held state of every logical bind at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindSnapshot {
    held: [bool; 4],
}

impl BindSnapshot {
    pub fn is_held(&self, bind: LogicalBind) -> bool {
        self.held[bind.index()]
    }

    pub fn set(&mut self, bind: LogicalBind, held: bool) {
        self.held[bind.index()] = held;
    }

    #[cfg(test)]
    pub fn with(mut self, bind: LogicalBind, held: bool) -> Self {
        self.set(bind, held);
        self
    }

    /// Released in `prev`, held now.
    pub fn rising(&self, prev: &BindSnapshot, bind: LogicalBind) -> bool {
        !prev.is_held(bind) && self.is_held(bind)
    }

    pub fn changed(&self, prev: &BindSnapshot, bind: LogicalBind) -> bool {
        prev.is_held(bind) != self.is_held(bind)
    }
}

/// An input backend that can report current bind state once per tick.
pub trait BindSource {
    fn refresh(&mut self) -> BindSnapshot;

    /// Called on every idle-to-active transition, before the first refresh.
    fn resync(&mut self) {}
}
