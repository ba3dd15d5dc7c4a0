//! UartTelemetryBridge - Main entry point
//!
//! 1. Install the ring logger and its drain thread
//! 2. Bring up the peripheral and the link-event source
//! 3. Spawn resolver, sender and framer tasks
//! 4. Blink the status LEDs (device) and report pipeline counters forever

use std::thread;
use std::time::Duration;

use log::info;
use uart_telemetry_bridge::bridge::{BridgeHandles, TASK_STACK_SIZE};
use uart_telemetry_bridge::logging;

/// Interval of the status report in the main loop.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

fn report_status(handles: &BridgeHandles) {
    let link = handles.link.snapshot();
    let sent = handles.stats.snapshot();
    info!(
        "link={} resolved={} queued={} ({} bytes) sent={} dropped={} failed={}",
        if link.connected { "up" } else { "down" },
        link.address.map(|a| a.to_string()).unwrap_or_else(|| "-".into()),
        handles.queue.len(),
        handles.queue.used_bytes(),
        sent.sent,
        sent.dropped_unresolved,
        sent.failed
    );
}

#[cfg(target_os = "espidf")]
fn main() {
    use esp_idf_svc::sys as esp_idf_sys;
    use log::error;

    esp_idf_sys::link_patches();

    match logging::init(log::LevelFilter::Info) {
        Ok(stream) => {
            if let Err(e) = logging::spawn_drain(stream, std::io::stdout(), TASK_STACK_SIZE) {
                println!("log drain not started: {}", e);
            }
        }
        Err(e) => println!("logger not installed: {}", e),
    }

    match device::run() {
        Ok((handles, leds)) => device::blink_forever(handles, leds),
        Err(e) => {
            error!("bring-up failed: {}", e);
            // Give the drain thread time to print, then start over
            thread::sleep(Duration::from_secs(5));
            esp_idf_svc::hal::reset::restart();
        }
    }
}

#[cfg(target_os = "espidf")]
mod device {
    use std::thread;
    use std::time::Instant;

    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::gpio::IOPin;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use log::error;

    use uart_telemetry_bridge::bridge::{Bridge, BridgeHandles};
    use uart_telemetry_bridge::config::{BridgeConfig, UartConfig, WifiConfig};
    use uart_telemetry_bridge::platform::esp::{self, StatusLeds};
    use uart_telemetry_bridge::status::{self, StatusIndicator};
    use uart_telemetry_bridge::{Result, SystemResolver};

    use super::{report_status, STATUS_INTERVAL};

    pub fn run() -> Result<(BridgeHandles, StatusIndicator<StatusLeds>)> {
        let peripherals = Peripherals::take()?;
        let sys_loop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;

        let leds = StatusIndicator::new(StatusLeds::new(
            peripherals.pins.gpio16.downgrade(),
            peripherals.pins.gpio17.downgrade(),
            peripherals.pins.gpio18.downgrade(),
        )?)?;

        let bridge = Bridge::new(BridgeConfig::default())?;

        // Leaked: Wi-Fi and its event subscriptions live until power-off
        let network = esp::start_network(
            peripherals.modem,
            sys_loop,
            nvs,
            &WifiConfig::default(),
            bridge.link(),
        )?;
        Box::leak(Box::new(network));

        let source = esp::UartSource::new(
            peripherals.uart1,
            peripherals.pins.gpio33,
            peripherals.pins.gpio32,
            &UartConfig::default(),
        )?;

        Ok((bridge.start(source, SystemResolver)?, leds))
    }

    /// Main loop: blink at the link-dependent rate, report periodically.
    pub fn blink_forever(handles: BridgeHandles, mut leds: StatusIndicator<StatusLeds>) -> ! {
        let mut last_report = Instant::now();
        loop {
            let connected = handles.link.is_connected();
            let delay = leds.tick(connected).unwrap_or_else(|e| {
                error!("status LED: {}", e);
                status::blink_period(connected)
            });
            thread::sleep(delay);

            if last_report.elapsed() >= STATUS_INTERVAL {
                report_status(&handles);
                last_report = Instant::now();
            }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    use clap::Parser;

    let args = host::Args::parse();

    match logging::init(args.log_level) {
        Ok(stream) => {
            if let Err(e) = logging::spawn_drain(stream, std::io::stdout(), TASK_STACK_SIZE) {
                eprintln!("log drain not started: {}", e);
            }
        }
        Err(e) => eprintln!("logger not installed: {}", e),
    }

    match host::run(&args) {
        Ok(handles) => loop {
            thread::sleep(STATUS_INTERVAL);
            report_status(&handles);
        },
        Err(e) => {
            eprintln!("bridge failed to start: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
mod host {
    use std::time::Duration;

    use clap::Parser;

    use uart_telemetry_bridge::bridge::{Bridge, BridgeHandles};
    use uart_telemetry_bridge::config::{self, BridgeConfig, UnknownAddressPolicy};
    use uart_telemetry_bridge::platform::host::SerialSource;
    use uart_telemetry_bridge::{Result, SystemResolver};

    /// Forward serial frames to an HTTP collector
    #[derive(Parser, Debug)]
    #[command(author, version, about, long_about = None)]
    pub struct Args {
        /// Serial port path (e.g., "/dev/ttyUSB0")
        #[arg(short, long)]
        pub port: String,

        /// Baud rate
        #[arg(short, long, default_value_t = 9600)]
        pub baud: u32,

        /// Collector host name
        #[arg(long, default_value = config::COLLECTOR_HOST)]
        pub collector_host: String,

        /// Collector TCP port
        #[arg(long)]
        pub collector_port: Option<u16>,

        /// Record queue capacity in bytes
        #[arg(long, default_value_t = config::DEFAULT_QUEUE_CAPACITY)]
        pub queue_capacity: usize,

        /// Keep records up to this many milliseconds while the collector
        /// address is unknown instead of dropping them
        #[arg(long)]
        pub hold_ms: Option<u64>,

        /// Log level (error, warn, info, debug, trace)
        #[arg(long, default_value = "info")]
        pub log_level: log::LevelFilter,
    }

    pub fn run(args: &Args) -> Result<BridgeHandles> {
        let mut config = BridgeConfig::default();
        config.collector.host = args.collector_host.clone();
        if let Some(port) = args.collector_port {
            config.collector.port = port;
        }
        config.queue_capacity = args.queue_capacity;
        config.framer = config::FramerConfig::for_queue_capacity(args.queue_capacity);
        if let Some(ms) = args.hold_ms {
            config.unknown_address = UnknownAddressPolicy::Hold {
                max_wait: Duration::from_millis(ms),
            };
        }

        let bridge = Bridge::new(config)?;
        let source = SerialSource::open(&args.port, args.baud)?;

        // The host network is assumed to be up
        bridge.link().link_up();
        bridge.start(source, SystemResolver)
    }
}
