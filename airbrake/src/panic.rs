use core::panic::PanicInfo;

use defmt::error;
use portable_atomic::{AtomicBool, Ordering};

static PANICKED: AtomicBool = AtomicBool::new(false);

/// Log the fault over RTT once, then reset. The servo line idles low
/// through the reset, which the brake mechanism treats as retract.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // A panic inside the panic handler would recurse; report only once.
    if !PANICKED.swap(true, Ordering::SeqCst) {
        if let Some(location) = info.location() {
            error!("PANIC at {}:{}", location.file(), location.line());
        } else {
            error!("PANIC at unknown location");
        }
    }
    cortex_m::peripheral::SCB::sys_reset();
}
