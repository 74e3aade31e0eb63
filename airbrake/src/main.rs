#![no_std]
#![no_main]

#[cfg(not(feature = "bench"))]
compile_error!(
    "No sensor sources selected!\n\
    - For the synthetic desk sources: cargo build --features bench\n\
    - For flight hardware: spawn tasks here wrapping your drivers' \
    sensors::BaroSource / ImuASource / ImuBSource impls"
);

use defmt::unwrap;
use defmt_rtt as _;
use embassy_executor::{Executor, InterruptExecutor};
use embassy_rp::bind_interrupts;
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::USB;
use static_cell::StaticCell;

use airbrake_core::config::Params;
use airbrake_core::info;

mod panic;
mod sensors;
mod tasks;
mod usb;

/// Active configuration profile for this image.
#[cfg(feature = "bench")]
pub const PARAMS: Params = Params::BENCH;
#[cfg(not(feature = "bench"))]
pub const PARAMS: Params = Params::FLIGHT;

bind_interrupts!(pub struct Irqs {
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

// Flight-critical tasks run on the interrupt executor so they preempt
// the USB/monitor plumbing below them.
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_LOW: StaticCell<Executor> = StaticCell::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_HIGH.on_interrupt();
}

#[cortex_m_rt::entry]
fn main() -> ! {
    let p = embassy_rp::init(Default::default());

    info!("airbrake controller starting, bench = {}", cfg!(feature = "bench"));

    // High-priority executor: fusion, FC, telemetry aggregation, servo.
    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let high = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    unwrap!(high.spawn(tasks::fusion::fusion_task()));
    unwrap!(high.spawn(tasks::fc::fc_task()));
    unwrap!(high.spawn(tasks::telemetry::telemetry_task()));
    unwrap!(high.spawn(tasks::servo::servo_task(p.PWM_SLICE5, p.PIN_11)));

    // Everything else cooperates on the thread executor.
    let low = EXECUTOR_LOW.init(Executor::new());
    low.run(|spawner| {
        // Sensor producers. Each task wraps the generic driver loop
        // around the source this build selects; hardware drivers slot
        // in by implementing the `sensors::*Source` traits.
        #[cfg(feature = "bench")]
        {
            unwrap!(spawner.spawn(bench_baro_task()));
            unwrap!(spawner.spawn(bench_imu_a_task()));
            unwrap!(spawner.spawn(bench_imu_b_task()));
        }
        unwrap!(spawner.spawn(tasks::monitor::monitor_task(p.USB)));
    });
}

#[cfg(feature = "bench")]
#[embassy_executor::task]
async fn bench_baro_task() -> ! {
    sensors::baro_task_driver(sensors::bench::BenchBaro::new()).await
}

#[cfg(feature = "bench")]
#[embassy_executor::task]
async fn bench_imu_a_task() -> ! {
    sensors::imu_a_task_driver(sensors::bench::BenchImuA::new()).await
}

#[cfg(feature = "bench")]
#[embassy_executor::task]
async fn bench_imu_b_task() -> ! {
    sensors::imu_b_task_driver(sensors::bench::BenchImuB::new()).await
}
