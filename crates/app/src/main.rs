//! Closed-loop racing MPC on a circular track
//!
//! Usage: `racing-mpc-app [config.json]`

use std::path::Path;
use std::sync::Arc;

use log::{error, info, LevelFilter};
use nlp::AlmSolver;
use racing_mpc::RacingMpc;
use simplelog::{ColorChoice, Config, SimpleLogger, TermLogger, TerminalMode};
use vehicle::dynamics::{control, state};
use vehicle::{DoubleTrackModel, FixedStepIntegrator, RungeKutta4};

use racing_mpc_app::{AppConfig, AppError, RacingNode};

fn init_logging() {
    if TermLogger::init(LevelFilter::Info, Config::default(), TerminalMode::Mixed, ColorChoice::Auto).is_err() {
        let _ = SimpleLogger::init(LevelFilter::Info, Config::default());
    }
}

fn load_config() -> Result<AppConfig, AppError> {
    match std::env::args().nth(1) {
        Some(path) => AppConfig::load(Path::new(&path)),
        None => {
            let config = AppConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn run() -> Result<(), AppError> {
    let config = load_config()?;
    let model = Arc::new(DoubleTrackModel::new(config.vehicle.clone())?);
    let solver = AlmSolver::new(config.solver_settings());
    let mpc = RacingMpc::new(config.mpc.clone(), Arc::clone(&model), solver)?;
    let mut node = RacingNode::new(mpc, config.fallback_brake_force);

    let plant = FixedStepIntegrator::new(RungeKutta4, config.mpc.integration_step);
    let track = &config.track;
    let mut x = track.start_state(config.initial_speed);
    let count = config.mpc.horizon + 1;

    info!(
        "closed loop: {} cycles of {} s, radius {} m, horizon {}",
        config.cycles, config.control_period, track.radius, config.mpc.horizon
    );

    for cycle in 0..config.cycles {
        let reference = track.reference(&x, config.mpc.min_speed, count);
        let u = node.step(&x, &reference)?;
        x = plant.integrate(&x, config.control_period, |s| {
            model.forward_dynamics(s, &u).map(|out| out.x_dot)
        })?;

        let offset = (x[state::X] - track.center[0]).hypot(x[state::Y] - track.center[1]) - track.radius;
        info!(
            "cycle {cycle:4} [{:?}] v {:6.2} m/s, offset {:6.2} m, drive {:7.1} N, brake {:7.1} N, steer {:6.3} rad",
            node.state(),
            x[state::SPEED],
            offset,
            u[control::DRIVE],
            u[control::BRAKE],
            u[control::STEER],
        );
    }

    let stats = node.stats();
    info!(
        "closed loop done: {} cycles, {} converged, {} degraded",
        stats.cycles, stats.converged, stats.degraded
    );
    Ok(())
}

fn main() {
    init_logging();
    if let Err(err) = run() {
        error!("{err}");
        std::process::exit(1);
    }
}
