use embassy_futures::join::join;
use embassy_futures::select::{select, Either};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_rp::Peri;
use embassy_time::{Duration, Ticker, Timer};
use embassy_usb::class::cdc_acm::CdcAcmClass;
use heapless::Vec;

use airbrake_core::blackboard::{FC_RESET, FLIGHT_DATA, FUSION_RESET, TELEMETRY};
use airbrake_core::info;
use airbrake_core::monitor::{
    parse_command, visualizer_line, Command, LineBuffer, EVT_HARD_RESET, EVT_SOFT_RESET,
    MAX_LINE_LEN,
};

use crate::usb::{setup_usb, Disconnected};

/// Visualizer emission period.
const MONITOR_PERIOD: Duration = Duration::from_millis(50);

const COMMAND_BUF_SIZE: usize = 96;
const BACKSPACE: u8 = 0x08;

#[embassy_executor::task]
pub async fn monitor_task(usb: Peri<'static, USB>) {
    let (mut class, mut device) = setup_usb(usb);

    let monitor = async {
        loop {
            class.wait_connection().await;
            info!("monitor link connected");
            let _ = run_link(&mut class).await;
            info!("monitor link disconnected");
        }
    };

    join(device.run(), monitor).await;
}

/// Runs the monitoring link until the connection drops: periodic
/// Visualizer lines out, newline-terminated commands in.
async fn run_link(
    class: &mut CdcAcmClass<'static, Driver<'static, USB>>,
) -> Result<(), Disconnected> {
    let mut ticker = Ticker::every(MONITOR_PERIOD);
    let mut rx_buf = [0u8; 64];
    let mut command_buf = Vec::<u8, COMMAND_BUF_SIZE>::new();
    loop {
        match select(ticker.next(), class.read_packet(&mut rx_buf)).await {
            Either::First(()) => {
                let rec = TELEMETRY.read();
                let servo = FLIGHT_DATA.servo.read();
                let mut line = LineBuffer::<MAX_LINE_LEN>::new();
                if visualizer_line(&mut line, &rec, Some(&servo)).is_ok() {
                    write_all(class, line.as_bytes()).await?;
                    write_all(class, b"\r\n").await?;
                }
            }
            Either::Second(n) => {
                let n = n?;
                for &b in &rx_buf[..n] {
                    if b == b'\n' || b == b'\r' {
                        if !command_buf.is_empty() {
                            if let Ok(s) = core::str::from_utf8(command_buf.as_slice()) {
                                handle_command(class, s).await?;
                            }
                            command_buf.clear();
                        }
                    } else if b == BACKSPACE {
                        command_buf.pop();
                    } else if command_buf.push(b).is_err() {
                        command_buf.clear();
                    }
                }
            }
        }
    }
}

async fn handle_command(
    class: &mut CdcAcmClass<'static, Driver<'static, USB>>,
    line: &str,
) -> Result<(), Disconnected> {
    match parse_command(line) {
        Some(Command::SoftReset) => {
            FUSION_RESET.request();
            FC_RESET.request();
            write_all(class, EVT_SOFT_RESET.as_bytes()).await?;
            write_all(class, b"\r\n").await?;
        }
        Some(Command::HardReset) => {
            write_all(class, EVT_HARD_RESET.as_bytes()).await?;
            write_all(class, b"\r\n").await?;
            // Give the host a moment to drain the reply.
            Timer::after_millis(50).await;
            cortex_m::peripheral::SCB::sys_reset();
        }
        None => {}
    }
    Ok(())
}

async fn write_all(
    class: &mut CdcAcmClass<'static, Driver<'static, USB>>,
    data: &[u8],
) -> Result<(), Disconnected> {
    for chunk in data.chunks(64) {
        class.write_packet(chunk).await?;
    }
    Ok(())
}
