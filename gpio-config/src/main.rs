//! Configure the pull resistors of a Raspberry Pi GPIO pin.
//!
//! The communication processor's reset and interrupt lines need well-defined idle levels, so
//! the host sets up its GPIO pulls once at boot.  The BCM2835 exposes no way to read the pull
//! configuration back; this tool only writes it, through the GPPUD/GPPUDCLK handshake
//! described in the SoC peripheral manual.

use gumdrop::Options;

use std::io;
use std::time::Duration;

const GPIO_BASE: libc::off_t = 0x2020_0000;
const GPIO_SIZE: usize = 4096;
const NR_GPIOS: u32 = 54;

/// Register offsets in 32-bit words.
const GPPUD: usize = 0x94 / 4;
const GPPUDCLK0: usize = 0x98 / 4;
const GPPUDCLK1: usize = 0x9C / 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PullMode {
    #[default]
    Off = 0,
    Down = 1,
    Up = 2,
}

impl std::str::FromStr for PullMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(PullMode::Up),
            "down" => Ok(PullMode::Down),
            "off" => Ok(PullMode::Off),
            _ => Err(format!("invalid mode {s:?}, expected up, down or off")),
        }
    }
}

#[derive(Debug, Options)]
struct GpioConfigOptions {
    help: bool,

    /// GPIO number (BCM numbering).
    #[options(free, required)]
    gpio: u32,

    /// Pull resistor mode: up, down or off.
    #[options(free, required)]
    mode: PullMode,
}

struct GpioMap {
    registers: *mut u32,
}

impl GpioMap {
    fn open() -> io::Result<GpioMap> {
        let path = std::ffi::CString::new("/dev/mem").unwrap();
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_SYNC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                GPIO_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                GPIO_BASE,
            )
        };
        unsafe { libc::close(fd) };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(GpioMap {
            registers: ptr as *mut u32,
        })
    }

    fn read_reg(&self, reg: usize) -> u32 {
        unsafe { std::ptr::read_volatile(self.registers.add(reg)) }
    }

    fn write_reg(&self, reg: usize, value: u32) {
        unsafe { std::ptr::write_volatile(self.registers.add(reg), value) }
    }

    /// Latch the pull mode into one pin via the GPPUD/GPPUDCLK handshake.
    fn set_pull(&self, gpio: u32, mode: PullMode) {
        let clkreg = if gpio < 32 { GPPUDCLK0 } else { GPPUDCLK1 };
        let clkbit = gpio % 32;

        self.write_reg(GPPUD, mode as u32);
        std::thread::sleep(Duration::from_millis(1));
        self.write_reg(clkreg, self.read_reg(clkreg) | 1 << clkbit);
        std::thread::sleep(Duration::from_millis(1));
        self.write_reg(GPPUD, PullMode::Off as u32);
        self.write_reg(clkreg, 0);
    }
}

impl Drop for GpioMap {
    fn drop(&mut self) {
        let res = unsafe { libc::munmap(self.registers as *mut libc::c_void, GPIO_SIZE) };
        if res != 0 {
            eprintln!(
                "Failed to unmap GPIO area: {}",
                io::Error::last_os_error()
            );
        }
    }
}

/// Check /proc/iomem for the BCM2835 GPIO block before poking physical memory.
fn have_gpio_mapping() -> bool {
    match std::fs::read_to_string("/proc/iomem") {
        Ok(iomem) => iomem.contains("20200000-20200fff : bcm2708_gpio"),
        Err(e) => {
            eprintln!("Failed to read /proc/iomem: {e}");
            false
        }
    }
}

fn main() {
    let args = GpioConfigOptions::parse_args_default_or_exit();

    if args.gpio >= NR_GPIOS {
        eprintln!("Invalid GPIO number {} (0..{} supported).", args.gpio, NR_GPIOS - 1);
        std::process::exit(1);
    }

    if !have_gpio_mapping() {
        eprintln!("Did not find the GPIO mapping. Not running on a Raspberry Pi?");
        std::process::exit(1);
    }

    let map = match GpioMap::open() {
        Ok(map) => map,
        Err(e) => {
            eprintln!("Failed to map the GPIO area: {e}");
            std::process::exit(1);
        }
    };

    map.set_pull(args.gpio, args.mode);
}
