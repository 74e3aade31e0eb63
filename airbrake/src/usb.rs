use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_rp::Peri;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, Config, UsbDevice};
use static_cell::StaticCell;

use crate::Irqs;

pub struct Disconnected {}

impl From<EndpointError> for Disconnected {
    fn from(val: EndpointError) -> Self {
        match val {
            EndpointError::BufferOverflow => defmt::panic!("USB buffer overflow"),
            EndpointError::Disabled => Disconnected {},
        }
    }
}

const CONFIG_DESCRIPTOR_BUF_SIZE: usize = 256;
const BOS_DESCRIPTOR_BUF_SIZE: usize = 256;
const CONTROL_BUF_SIZE: usize = 64;

/// Initializes the USB peripheral with a single CDC ACM class for the
/// monitoring link. Returns the serial class and the device to run.
pub fn setup_usb(
    usb: Peri<'static, USB>,
) -> (
    CdcAcmClass<'static, Driver<'static, USB>>,
    UsbDevice<'static, Driver<'static, USB>>,
) {
    let driver = Driver::new(usb, Irqs);

    let mut config = Config::new(0xc0de, 0xcafe);
    config.manufacturer = Some("airbrake");
    config.product = Some("airbrake monitor");
    config.serial_number = Some("00000001");
    config.max_power = 100;
    config.max_packet_size_0 = 64;

    static CONFIG_DESCRIPTOR: StaticCell<[u8; CONFIG_DESCRIPTOR_BUF_SIZE]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; BOS_DESCRIPTOR_BUF_SIZE]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; CONTROL_BUF_SIZE]> = StaticCell::new();
    static CDC_STATE: StaticCell<State> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        config,
        CONFIG_DESCRIPTOR.init([0; CONFIG_DESCRIPTOR_BUF_SIZE]),
        BOS_DESCRIPTOR.init([0; BOS_DESCRIPTOR_BUF_SIZE]),
        &mut [], // no msos descriptors
        CONTROL_BUF.init([0; CONTROL_BUF_SIZE]),
    );

    let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), 64);
    let device = builder.build();
    (class, device)
}
