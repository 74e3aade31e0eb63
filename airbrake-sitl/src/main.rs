//! Software-in-the-loop bridge: runs fusion, the flight controller, the
//! telemetry aggregator and the servo decision at the real 50 Hz cadence
//! against a point-mass flight model, emitting Visualizer lines on
//! stdout and accepting `!cmd:` lines on stdin.

use std::io::BufRead;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use airbrake_core::config::Params;
use airbrake_core::monitor::{
    parse_command, visualizer_line, Command, LineBuffer, EVT_HARD_RESET, EVT_SOFT_RESET,
    MAX_LINE_LEN,
};
use airbrake_core::servo::{should_open, ServoRange, ServoStatus, StallWatchdog};
use airbrake_core::{FcContext, FcInputs, FcState, FcStatus, FusionEngine, SystemInputs, TelemetryRecord};

mod sim;
use sim::{FlightSim, SimConfig};

struct Options {
    params: Params,
    duration_s: f32,
    realtime: bool,
    /// Emit a Visualizer line every n-th tick.
    emit_every: u32,
}

fn parse_args() -> Options {
    let mut opts = Options {
        params: Params::FLIGHT,
        duration_s: 60.0,
        realtime: false,
        emit_every: 5,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bench" => opts.params = Params::BENCH,
            "--crc" => opts.params.telem_crc = true,
            "--realtime" => opts.realtime = true,
            "--every-tick" => opts.emit_every = 1,
            "--duration" => {
                let v = args.next().and_then(|s| s.parse().ok());
                match v {
                    Some(s) => opts.duration_s = s,
                    None => die("--duration needs a value in seconds"),
                }
            }
            other => die(&format!("unknown argument: {other}")),
        }
    }
    opts
}

fn die(msg: &str) -> ! {
    eprintln!("airbrake-sitl: {msg}");
    eprintln!("usage: airbrake-sitl [--bench] [--crc] [--realtime] [--every-tick] [--duration S]");
    std::process::exit(2);
}

/// Forward stdin lines to the main loop without blocking it.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

fn main() {
    env_logger::init();
    let opts = parse_args();
    let tick_ms = opts.params.telem_period_ms;

    let mut sim = FlightSim::new(SimConfig::default());
    let mut engine = FusionEngine::new(opts.params.fusion);
    let mut fc = FcContext::new(opts.params.fc);
    let servo_range = ServoRange::new(&opts.params.servo);
    let mut watchdog = StallWatchdog::new();
    let mut servo = ServoStatus {
        min_us: servo_range.min_us,
        max_us: servo_range.max_us,
        cmd_us: servo_range.closed_us(),
        open: false,
    };

    let commands = spawn_stdin_reader();

    let mut record = TelemetryRecord::new();
    let mut seq = 0u32;
    let mut now_ms = 0u32;
    let mut last_state = FcState::Preflight;
    let mut max_agl = 0.0f32;

    log::info!("SITL active: {} s of flight at {} ms per tick", opts.duration_s, tick_ms);

    let ticks = (opts.duration_s * 1000.0 / tick_ms as f32) as u32;
    for tick in 0..ticks {
        now_ms = now_ms.wrapping_add(tick_ms);
        let t_s = now_ms as f32 / 1000.0;

        for line in commands.try_iter() {
            match parse_command(line.trim()) {
                Some(Command::SoftReset) => {
                    engine.reset();
                    fc.reset();
                    println!("{EVT_SOFT_RESET}");
                }
                Some(Command::HardReset) => {
                    // Platform-defined restart: for the SITL, just exit.
                    println!("{EVT_HARD_RESET}");
                    return;
                }
                None => {}
            }
        }

        let readings = sim.step(t_s, tick_ms as f32 / 1000.0);
        let fused = engine.step(now_ms, &readings.baro, &readings.imu_a);

        // Like the firmware, the FC consumes the previously published
        // record; its debounce windows dwarf the one-tick lag.
        let prev = &record;
        let input = FcInputs {
            dt_ms: tick_ms,
            now_ms,
            tilt_deg: fused.tilt_deg,
            agl_fused_m: fused.agl_fused_m,
            vz_fused_mps: fused.vz_fused_mps,
            vz_baro_mps: fused.vz_baro_mps,
            az_earth_mps2: fused.az_earth_mps2,
            t_apogee_s: fused.t_apogee_s,
            apogee_agl_m: fused.apogee_agl_m,
            agl_ready: fused.agl_ready,
            baro_alt_m: prev.baro.altitude_m,
            imu_alt_m: prev.imu_a.altitude_m,
            imu_a_valid: readings.imu_a.valid,
            baro_valid: readings.baro.valid,
            imu_b_valid: readings.imu_b.valid,
        };
        let out = fc.step(&input);
        let status = FcStatus {
            stamp_ms: now_ms,
            state: out.state,
            flags: out.flags,
            mach_cons: out.mach_cons,
            tilt_deg: out.tilt_deg,
            t_since_launch_s: out.t_since_launch_s,
            t_to_apogee_s: out.t_to_apogee_s,
            airbrake_cmd_deg: out.airbrake_cmd_deg,
        };

        record = TelemetryRecord::compose(
            seq,
            now_ms,
            &readings.baro,
            &readings.imu_a,
            &readings.imu_b,
            &status,
            &fused,
            &SystemInputs {
                vbat_mv: 4_100,
                i2c_errs: 0,
                spi_errs: 0,
            },
            opts.params.telem_crc,
        );
        seq = seq.wrapping_add(1);

        // Servo controller, watchdog included (never fires here since the
        // aggregator runs in the same loop, but the path is identical).
        if watchdog.stalled(record.timestamp_ms) {
            servo.open = false;
            servo.cmd_us = servo_range.closed_us();
        } else {
            let want_open = should_open(&record);
            if want_open != servo.open {
                servo.open = want_open;
                servo.cmd_us = if want_open {
                    servo_range.open_us()
                } else {
                    servo_range.closed_us()
                };
                log::info!("servo: {}", if want_open { "open" } else { "retract" });
            }
        }

        if out.state != last_state {
            log::info!(
                "fc: {} -> {} at t = {:.2} s",
                last_state.name(),
                out.state.name(),
                t_s
            );
            last_state = out.state;
        }
        max_agl = max_agl.max(sim.altitude_agl_m());

        if tick % opts.emit_every == 0 {
            let mut line = LineBuffer::<MAX_LINE_LEN>::new();
            if visualizer_line(&mut line, &record, Some(&servo)).is_ok() {
                println!("{}", line.as_str());
            }
        }

        if opts.realtime {
            thread::sleep(Duration::from_millis(tick_ms as u64));
        }
    }

    log::info!(
        "SITL done: final state {}, max altitude {:.1} m AGL",
        last_state.name(),
        max_agl
    );
}
