//! The control loop: ACTIVE ticks paced by the scheduler, IDLE blocks on
//! external requests.

use crate::accumulator::MovementAccumulator;
use crate::binds::BindSource;
use crate::clock::{Clock, Tick};
use crate::params::{CycleVar, Param, Parameters, Signals};
use crate::scheduler::Scheduler;
use crate::signals::Controls;
use crate::virtual_mouse::MouseInjector;

/// Active ticks between debug diagnostics.
const DEBUG_INTERVAL: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Not active; nothing was sampled.
    Idle,
    /// One tick ran, started at the given time.
    Ticked { started: Tick, signals: Signals },
}

#[derive(Default)]
struct Diagnostics {
    ticks: u32,
    emitted: i64,
    moves: u32,
}

/// Owns everything the control loop touches.
pub struct Engine<C, B, M> {
    clock: C,
    source: B,
    mouse: M,
    params: Parameters,
    accumulator: MovementAccumulator,
    enabled: bool,
    mode: Mode,
    debug: bool,
    diag: Diagnostics,
}

impl<C: Clock, B: BindSource, M: MouseInjector> Engine<C, B, M> {
    pub fn new(clock: C, source: B, mouse: M, params: Parameters, enabled: bool) -> Self {
        let accumulator = MovementAccumulator::new(clock.frequency());
        Self {
            clock,
            source,
            mouse,
            params,
            accumulator,
            enabled,
            mode: Mode::Idle,
            debug: false,
            diag: Diagnostics::default(),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[cfg(test)]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    #[cfg(test)]
    pub fn mouse(&self) -> &M {
        &self.mouse
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether ticks should run: enabled and the parameters are usable.
    pub fn is_active(&self) -> bool {
        self.enabled && self.params.is_valid()
    }

    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        log::info!("{}", if self.enabled { "Enabled" } else { "Disabled" });
        self.enabled
    }

    /// Step the cycle from outside the bind path.
    pub fn cycle(&mut self) -> Signals {
        Signals {
            cycle_index: self.params.advance_cycle(),
            validity: None,
        }
    }

    /// Set the parameter called `name` between ticks. Unknown names are
    /// logged and change nothing.
    pub fn edit(&mut self, name: &str, text: &str) -> Signals {
        let Some(param) = Param::from_name(name) else {
            log::warn!(
                "Unknown parameter `{}` (expected one of: {})",
                name,
                Param::names().join(", ")
            );
            return Signals::default();
        };
        let signals = self.params.set(param, text);
        log::info!("Set {} = {}", name, text);
        signals
    }

    pub fn tick(&mut self) -> Step {
        if !self.is_active() {
            if self.mode == Mode::Active {
                log::info!("Idle");
                self.mode = Mode::Idle;
            }
            return Step::Idle;
        }

        let now = self.clock.now();
        let binds = if self.mode == Mode::Idle {
            self.source.resync();
            let binds = self.source.refresh();
            self.accumulator.reset(now, binds);
            self.mode = Mode::Active;
            log::info!("Active");
            binds
        } else {
            self.source.refresh()
        };

        let update = self.accumulator.update(now, binds, &mut self.params);
        if update.units != 0 {
            let dx = update.units.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
            self.mouse.move_relative(dx, 0);
        }

        if self.debug {
            self.record(update.units);
        }

        Step::Ticked {
            started: now,
            signals: update.signals,
        }
    }

    /// Run until `controls` asks to quit.
    pub fn run(&mut self, scheduler: &impl Scheduler, controls: &impl Controls) {
        while !controls.quit_requested() {
            if controls.take_toggle() {
                self.toggle();
            }
            if controls.take_cycle() {
                let signals = self.cycle();
                self.report(signals);
            }
            for edit in controls.take_edits() {
                let signals = self.edit(&edit.name, &edit.value);
                self.report(signals);
            }

            match self.tick() {
                Step::Idle => controls.wait(),
                Step::Ticked { started, signals } => {
                    self.report(signals);
                    let budget = self.params.tick_budget().unwrap_or(0.0);
                    let spent = self.clock.elapsed_seconds(started, self.clock.now());
                    scheduler.precise_sleep(budget - spent);
                }
            }
        }
    }

    /// Log parameter changes for whoever is watching.
    pub fn report(&self, signals: Signals) {
        if signals.is_empty() {
            return;
        }
        if let Some(index) = signals.cycle_index {
            let values: Vec<String> = CycleVar::ALL
                .iter()
                .map(|&var| format!("{}={}", var.name(), self.params.describe_cycle(var)))
                .collect();
            log::info!("Cycle position {}: {}", index, values.join(" "));
        }
        if let Some(valid) = signals.validity {
            if valid {
                log::info!("Parameters valid");
            } else {
                for (name, e) in self.params.errors() {
                    log::warn!("Invalid {}: {}", name, e);
                }
            }
        }
    }

    fn record(&mut self, units: i64) {
        self.diag.ticks += 1;
        if units != 0 {
            self.diag.emitted += units;
            self.diag.moves += 1;
        }
        if self.diag.ticks >= DEBUG_INTERVAL {
            log::debug!(
                "ticks={} moves={} emitted={:+} remainder={:+.3}",
                self.diag.ticks,
                self.diag.moves,
                self.diag.emitted,
                self.accumulator.remainder()
            );
            self.diag = Diagnostics::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binds::{BindSnapshot, LogicalBind};
    use crate::clock::ManualClock;
    use crate::control::Edit;
    use crate::params::{ParameterText, Var};
    use crate::signals::ScriptedControls;
    use crate::virtual_mouse::RecordingMouse;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    const FREQ: u64 = 1_000_000_000;

    #[derive(Clone, Default)]
    struct SharedBinds {
        held: Rc<Cell<BindSnapshot>>,
        resyncs: Rc<Cell<u32>>,
    }

    impl SharedBinds {
        fn hold(&self, bind: LogicalBind, held: bool) {
            self.held.set(self.held.get().with(bind, held));
        }
    }

    impl BindSource for SharedBinds {
        fn refresh(&mut self) -> BindSnapshot {
            self.held.get()
        }

        fn resync(&mut self) {
            self.resyncs.set(self.resyncs.get() + 1);
        }
    }

    /// Sleeping just moves the manual clock forward.
    struct ClockScheduler<'a> {
        clock: &'a ManualClock,
        sleeps: RefCell<Vec<f64>>,
    }

    impl Scheduler for ClockScheduler<'_> {
        fn request_high_resolution_timing(&mut self, _units_of_100ns: u32) {}

        fn precise_sleep(&self, seconds: f64) {
            self.sleeps.borrow_mut().push(seconds);
            if seconds > 0.0 {
                self.clock.advance_secs(seconds);
            }
        }
    }

    fn text(rate: &str, sleep: &str, yawspeed: &str) -> ParameterText {
        ParameterText {
            rate: rate.into(),
            sleep: sleep.into(),
            yawspeed: yawspeed.into(),
            sensitivity: "1".into(),
            anglespeedkey: "2".into(),
            yaw: "1".into(),
        }
    }

    fn engine<'a>(
        clock: &'a ManualClock,
        binds: &SharedBinds,
        text: &ParameterText,
        enabled: bool,
    ) -> Engine<&'a ManualClock, SharedBinds, RecordingMouse> {
        Engine::new(
            clock,
            binds.clone(),
            RecordingMouse::default(),
            Parameters::load(text, 0),
            enabled,
        )
    }

    #[test]
    fn one_second_held_left_through_the_loop() {
        let clock = ManualClock::new(FREQ);
        let binds = SharedBinds::default();
        binds.hold(LogicalBind::Left, true);
        // 10000 * 100ns = 1ms tick budget.
        let mut engine = engine(&clock, &binds, &text("1000", "10000", "100"), true);
        let scheduler = ClockScheduler {
            clock: &clock,
            sleeps: RefCell::new(Vec::new()),
        };
        let controls = ScriptedControls::default();
        controls.quit_after_checks.set(Some(1001));

        engine.run(&scheduler, &controls);

        assert_eq!(scheduler.sleeps.borrow().len(), 1001);
        assert!((scheduler.sleeps.borrow()[0] - 0.001).abs() < 1e-12);
        let total = engine.mouse().total_dx();
        assert!((-101..=-99).contains(&total), "total {}", total);
        assert!(engine.mouse().moves.iter().all(|&(dx, dy)| dx < 0 && dy == 0));
    }

    #[test]
    fn disabled_engine_idles_and_waits() {
        let clock = ManualClock::new(FREQ);
        let binds = SharedBinds::default();
        binds.hold(LogicalBind::Right, true);
        let mut engine = engine(&clock, &binds, &ParameterText::default(), false);
        let scheduler = ClockScheduler {
            clock: &clock,
            sleeps: RefCell::new(Vec::new()),
        };
        let controls = ScriptedControls::default();
        controls.quit_after_waits.set(Some(3));

        engine.run(&scheduler, &controls);

        assert_eq!(controls.waits.get(), 3);
        assert!(scheduler.sleeps.borrow().is_empty());
        assert!(engine.mouse().moves.is_empty());
        assert_eq!(engine.mode(), Mode::Idle);
    }

    #[test]
    fn invalid_parameters_keep_the_engine_idle() {
        let clock = ManualClock::new(FREQ);
        let binds = SharedBinds::default();
        binds.hold(LogicalBind::Left, true);
        let mut engine = engine(&clock, &binds, &text("-5", "3500", "100"), true);

        for _ in 0..10 {
            clock.advance(FREQ / 100);
            assert_eq!(engine.tick(), Step::Idle);
        }
        assert!(engine.mouse().moves.is_empty());
        assert_eq!(binds.resyncs.get(), 0);
    }

    #[test]
    fn activation_resets_without_a_jump() {
        let clock = ManualClock::new(FREQ);
        let binds = SharedBinds::default();
        binds.hold(LogicalBind::Right, true);
        let mut engine = engine(&clock, &binds, &text("100", "0", "100"), false);

        // A long idle stretch must not be integrated once enabled.
        clock.advance(5 * FREQ);
        assert_eq!(engine.tick(), Step::Idle);
        engine.toggle();
        assert!(matches!(engine.tick(), Step::Ticked { .. }));
        assert_eq!(engine.mode(), Mode::Active);
        assert_eq!(binds.resyncs.get(), 1);
        assert!(engine.mouse().moves.is_empty());

        clock.advance(FREQ / 10);
        engine.tick();
        assert_eq!(engine.mouse().moves, vec![(10, 0)]);

        engine.toggle();
        assert_eq!(engine.tick(), Step::Idle);
        assert_eq!(engine.mode(), Mode::Idle);
    }

    #[test]
    fn toggle_and_cycle_requests() {
        let clock = ManualClock::new(FREQ);
        let binds = SharedBinds::default();
        let mut engine = engine(&clock, &binds, &text("1000", "10000", "100 200"), false);
        let scheduler = ClockScheduler {
            clock: &clock,
            sleeps: RefCell::new(Vec::new()),
        };
        let controls = ScriptedControls::default();
        controls.toggles.set(1);
        controls.cycles.set(1);
        controls.quit_after_checks.set(Some(5));

        engine.run(&scheduler, &controls);

        assert!(engine.is_enabled());
        assert_eq!(engine.params().current(), 1);
        assert_eq!(controls.waits.get(), 0);
    }

    #[test]
    fn cycle_bind_reports_new_position() {
        let clock = ManualClock::new(FREQ);
        let binds = SharedBinds::default();
        let mut engine = engine(&clock, &binds, &text("1000", "0", "100 200 300"), true);
        engine.tick();

        binds.hold(LogicalBind::Cycle, true);
        clock.advance(FREQ / 1000);
        match engine.tick() {
            Step::Ticked { signals, .. } => assert_eq!(signals.cycle_index, Some(1)),
            Step::Idle => panic!("engine should be active"),
        }
    }

    #[test]
    fn editing_parameters_between_ticks() {
        let clock = ManualClock::new(FREQ);
        let binds = SharedBinds::default();
        binds.hold(LogicalBind::Right, true);
        let mut engine = engine(&clock, &binds, &text("10", "0", "100"), true);
        engine.tick();

        let signals = engine.edit("rate", "0");
        assert_eq!(signals.validity, Some(false));
        assert_eq!(engine.tick(), Step::Idle);

        assert_eq!(engine.edit("rate", "10").validity, Some(true));
        clock.advance(FREQ / 10);
        engine.tick();
        // Reactivated from scratch: the elapsed 100ms is not replayed.
        assert!(engine.mouse().moves.is_empty());
        clock.advance(FREQ / 10);
        engine.tick();
        assert_eq!(engine.mouse().moves, vec![(10, 0)]);
    }

    #[test]
    fn speed_bind_through_engine() {
        let clock = ManualClock::new(FREQ);
        let binds = SharedBinds::default();
        binds.hold(LogicalBind::Left, true);
        binds.hold(LogicalBind::Speed, true);
        let mut engine = engine(&clock, &binds, &text("10", "0", "100"), true);
        engine.tick();
        clock.advance(FREQ / 10);
        engine.tick();
        assert_eq!(engine.mouse().moves, vec![(-20, 0)]);
    }

    #[test]
    fn unknown_edit_changes_nothing() {
        let clock = ManualClock::new(FREQ);
        let binds = SharedBinds::default();
        let mut engine = engine(&clock, &binds, &text("10", "0", "100 200"), true);
        assert!(engine.edit("pitch", "5").is_empty());
        assert!(engine.params().is_valid());
        assert_eq!(engine.params().var_text(Var::Rate), "10");
    }

    #[test]
    fn queued_edits_repair_an_invalid_start() {
        let clock = ManualClock::new(FREQ);
        let binds = SharedBinds::default();
        binds.hold(LogicalBind::Right, true);
        let mut engine = engine(&clock, &binds, &text("0", "10000", "100 200 300"), true);
        engine.params.advance_cycle();
        let scheduler = ClockScheduler {
            clock: &clock,
            sleeps: RefCell::new(Vec::new()),
        };
        let controls = ScriptedControls::default();
        controls.edits.replace(vec![
            Edit {
                name: "rate".into(),
                value: "1000".into(),
            },
            Edit {
                name: "yawspeed".into(),
                value: "100 200".into(),
            },
        ]);
        controls.quit_after_checks.set(Some(101));

        engine.run(&scheduler, &controls);

        assert!(engine.params().is_valid());
        // The count changed from 3 to 2, so the position went back to 0.
        assert_eq!(engine.params().current(), 0);
        assert_eq!(engine.params().describe_cycle(CycleVar::Yawspeed), "[100] 200");
        assert_eq!(controls.waits.get(), 0);
        let total = engine.mouse().total_dx();
        assert!((9..=11).contains(&total), "total {}", total);
    }
}
