use embassy_rp::peripherals::{PIN_11, PWM_SLICE5};
use embassy_rp::pwm::{Config as PwmConfig, Pwm};
use embassy_rp::Peri;
use embassy_time::{Duration, Ticker};
use fixed::traits::ToFixed;

use airbrake_core::blackboard::{FLIGHT_DATA, TELEMETRY};
use airbrake_core::info;
use airbrake_core::servo::{should_open, ServoRange, ServoStatus, StallWatchdog};

use crate::PARAMS;

/// 1 us per PWM count at 125 MHz / 125, 20 ms frame.
const PWM_DIVIDER: u8 = 125;
const PWM_TOP: u16 = 19_999;

struct ServoPwm<'d> {
    pwm: Pwm<'d>,
    config: PwmConfig,
    range: ServoRange,
    cmd_us: u16,
}

impl<'d> ServoPwm<'d> {
    fn new(slice: Peri<'d, PWM_SLICE5>, pin: Peri<'d, PIN_11>, range: ServoRange) -> Self {
        let mut config = PwmConfig::default();
        config.divider = PWM_DIVIDER.to_fixed();
        config.top = PWM_TOP;
        config.compare_b = range.closed_us();
        let pwm = Pwm::new_output_b(slice, pin, config.clone());
        Self {
            pwm,
            config,
            range,
            cmd_us: range.closed_us(),
        }
    }

    fn write_us(&mut self, us: u16) {
        let us = self.range.clamp_us(us);
        self.cmd_us = us;
        self.config.compare_b = us;
        self.pwm.set_config(&self.config);
    }

    fn publish(&self, open: bool) {
        FLIGHT_DATA.servo.update(ServoStatus {
            min_us: self.range.min_us,
            max_us: self.range.max_us,
            cmd_us: self.cmd_us,
            open,
        });
    }
}

/// Servo control tick: watchdog the telemetry feed, evaluate the deploy
/// decision, move only on the boolean edge.
#[embassy_executor::task]
pub async fn servo_task(slice: Peri<'static, PWM_SLICE5>, pin: Peri<'static, PIN_11>) {
    let range = ServoRange::new(&PARAMS.servo);
    let mut servo = ServoPwm::new(slice, pin, range);
    let mut ticker = Ticker::every(Duration::from_millis(PARAMS.servo.period_ms as u64));
    let mut watchdog = StallWatchdog::new();
    let mut open = false;

    servo.write_us(range.closed_us());
    servo.publish(open);

    loop {
        let rec = TELEMETRY.read();

        // Stalled telemetry: retract and skip the decision entirely.
        if watchdog.stalled(rec.timestamp_ms) {
            if open {
                info!("servo: telemetry stalled, retracting");
                open = false;
            }
            servo.write_us(range.closed_us());
            servo.publish(open);
            ticker.next().await;
            continue;
        }

        let want_open = should_open(&rec);
        if want_open != open {
            open = want_open;
            info!("servo: {}", if open { "open" } else { "retract" });
            servo.write_us(if open { range.open_us() } else { range.closed_us() });
        }
        servo.publish(open);

        ticker.next().await;
    }
}
