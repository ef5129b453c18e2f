mod accumulator;
mod binds;
mod clock;
mod config;
mod control;
mod engine;
mod error;
mod input;
mod params;
mod scheduler;
mod signals;
mod virtual_mouse;

use binds::LogicalBind;
use clap::Parser;
use clock::MonotonicClock;
use config::Config;
use control::Command;
use engine::Engine;
use error::SetupError;
use input::{find_bind_devices, parse_key, BindKeys, EvdevBindSource};
use params::{CycleVar, Param, Parameters, Var};
use scheduler::{PrecisionScheduler, Scheduler};
use signals::SignalControls;
use virtual_mouse::VirtualMouse;

/// Nice value requested at startup.
const PRIORITY: i32 = -10;

fn main() {
    // Remote commands for a running instance are handled before clap.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(command) = Command::from_args(&args) {
        std::process::exit(send_to_running(command));
    }

    let config = Config::parse();

    let default_filter = if config.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    let params = Parameters::load(&config.parameter_text(), config.current);
    if !params.is_valid() {
        for (name, e) in params.errors() {
            log::warn!("Invalid {}: {}", name, e);
        }
        log::warn!("Idle until fixed with `turnbinds set <param> <value>`");
    }

    if let Err(e) = run(config, params) {
        log::error!("{}", e);
        match e {
            SetupError::NoDevices | SetupError::OpenDevice { .. } => {
                log::error!("Are you in the 'input' group?");
                log::error!("Try: sudo usermod -aG input $USER (then re-login)");
            }
            SetupError::VirtualMouse(_) => {
                log::error!("Do you have /dev/uinput access? Try: sudo modprobe uinput");
            }
            SetupError::UnknownKey(_) => {}
        }
        std::process::exit(1);
    }
}

fn run(config: Config, params: Parameters) -> Result<(), SetupError> {
    let keys = BindKeys::new(
        parse_key(&config.bind_left)?,
        parse_key(&config.bind_right)?,
        parse_key(&config.bind_speed)?,
        parse_key(&config.bind_cycle)?,
    );

    println!("turnbinds - held keys to mouse yaw");
    for bind in LogicalBind::ALL {
        println!("  {:<13}{:?}", format!("{}:", bind.name()), keys.key(bind));
    }
    for var in CycleVar::ALL {
        println!("  {:<13}{}", format!("{}:", var.name()), params.describe_cycle(var));
    }
    println!("  {:<13}{} Hz", "rate:", params.var_text(Var::Rate));
    println!("  {:<13}{} x 100ns", "sleep:", params.var_text(Var::Sleep));
    println!("  {:<13}{} of {}", "position:", params.current(), params.count());
    println!();

    let controls = SignalControls::install(control::edit_queue_path(std::process::id() as i32));

    let paths = if config.device.is_empty() {
        find_bind_devices(&keys)
    } else {
        config.device.clone()
    };
    let source = EvdevBindSource::open(&paths, keys, config.input_mode)?;
    let mouse = VirtualMouse::new()?;

    let mut scheduler = PrecisionScheduler::new(config.sleep_strategy);
    scheduler.request_high_resolution_timing(config.timer_resolution);
    scheduler.raise_priority(PRIORITY);

    println!("Toggle: turnbinds toggle");
    println!("Cycle:  turnbinds cycle");
    println!("Quit:   turnbinds quit");
    println!("Edit:   turnbinds set <param> <value>");
    println!();

    if config.disabled {
        log::info!("Starting disabled");
    }

    let mut engine = Engine::new(MonotonicClock::new(), source, mouse, params, !config.disabled)
        .with_debug(config.debug);
    engine.run(&scheduler, &controls);

    log::info!(
        "Shutting down (cycle position {}, {})",
        engine.params().current(),
        if engine.is_enabled() { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Deliver `command` to the running instance. Returns the exit status.
fn send_to_running(command: Result<Command, String>) -> i32 {
    let command = match command {
        Ok(command) => command,
        Err(usage) => {
            eprintln!("{}", usage);
            return 2;
        }
    };
    if let Command::Set { name, .. } = &command {
        if Param::from_name(name).is_none() {
            eprintln!(
                "Unknown parameter `{}` (expected one of: {})",
                name,
                Param::names().join(", ")
            );
            return 2;
        }
    }
    let Some(pid) = control::find_running_instance() else {
        eprintln!("No running turnbinds instance found");
        return 1;
    };
    match command.send(pid) {
        Ok(action) => {
            eprintln!("{} sent to turnbinds (pid {})", action, pid);
            0
        }
        Err(e) => {
            eprintln!("Failed to reach turnbinds (pid {}): {}", pid, e);
            1
        }
    }
}
