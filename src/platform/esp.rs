//! ESP-IDF collaborators: UART byte source and Wi-Fi station link events.
//!
//! Thin wrappers around esp-idf-svc. Business logic stays in the core
//! modules; this is just I/O.
//!
//! # Hardware Setup
//!
//! ```text
//! Device TX ──────▶ GPIO32 (UART1 RX, inverted)
//! Device RX ◀────── GPIO33 (UART1 TX, inverted)
//!
//! GPIO16 red, GPIO17 green, GPIO18 blue status LEDs (open drain)
//! ```

use std::sync::Arc;
use std::time::Duration;

use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::hal::delay::TickType;
use esp_idf_svc::hal::gpio::{self, AnyIOPin, Level, Output, PinDriver};
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::{self, UartDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::{self, esp};
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent};
use log::{error, info, warn};

use crate::config::{UartConfig, WifiConfig};
use crate::error::{BridgeError, Result};
use crate::framer::ByteSource;
use crate::link::LinkState;
use crate::status::IndicatorOutput;

/// UART1 byte source.
pub struct UartSource {
    driver: UartDriver<'static>,
}

impl UartSource {
    /// Install the UART1 driver.
    pub fn new(
        uart: impl Peripheral<P = uart::UART1> + 'static,
        tx_pin: impl Peripheral<P = impl gpio::OutputPin> + 'static,
        rx_pin: impl Peripheral<P = impl gpio::InputPin> + 'static,
        config: &UartConfig,
    ) -> Result<Self> {
        let uart_config = uart::config::Config::default()
            .baudrate(Hertz(config.baud_rate))
            .rx_fifo_size(config.rx_buffer_size);

        let driver = UartDriver::new(
            uart,
            tx_pin,
            rx_pin,
            Option::<gpio::AnyIOPin>::None, // CTS
            Option::<gpio::AnyIOPin>::None, // RTS
            &uart_config,
        )?;

        if config.invert_lines {
            let mask = sys::uart_signal_inv_t_UART_SIGNAL_RXD_INV
                | sys::uart_signal_inv_t_UART_SIGNAL_TXD_INV;
            // SAFETY: the driver for this port was installed above
            esp!(unsafe { sys::uart_set_line_inverse(driver.port(), mask) })?;
        }

        info!("UART1 ready at {} baud", config.baud_rate);
        Ok(Self { driver })
    }
}

impl ByteSource for UartSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let ticks = TickType::new_millis(timeout.as_millis() as u64).ticks();
        self.driver
            .read(buf, ticks)
            .map_err(|e| BridgeError::Peripheral(e.to_string()))
    }
}

/// Red, green and blue status LEDs.
pub struct StatusLeds {
    red: PinDriver<'static, AnyIOPin, Output>,
    green: PinDriver<'static, AnyIOPin, Output>,
    blue: PinDriver<'static, AnyIOPin, Output>,
}

impl StatusLeds {
    /// Configure the three pins as open-drain outputs.
    pub fn new(red: AnyIOPin, green: AnyIOPin, blue: AnyIOPin) -> Result<Self> {
        Ok(Self {
            red: PinDriver::output_od(red)?,
            green: PinDriver::output_od(green)?,
            blue: PinDriver::output_od(blue)?,
        })
    }
}

impl IndicatorOutput for StatusLeds {
    fn set_power(&mut self, on: bool) -> Result<()> {
        self.green.set_level(Level::from(on))?;
        Ok(())
    }

    fn set_blink(&mut self, on: bool) -> Result<()> {
        self.blue.set_level(Level::from(on))?;
        self.red.set_level(Level::from(on))?;
        Ok(())
    }
}

/// Wi-Fi driver and event subscriptions. Keep alive for the process lifetime.
pub struct Network {
    _wifi: EspWifi<'static>,
    _wifi_events: EspSubscription<'static, System>,
    _ip_events: EspSubscription<'static, System>,
}

/// Start the Wi-Fi station and wire its events to `link`.
///
/// IP assigned → link up. Station disconnected → link down, reconnect.
pub fn start_network(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    config: &WifiConfig,
    link: Arc<LinkState>,
) -> Result<Network> {
    if config.ssid.is_empty() {
        return Err(BridgeError::Config("BRIDGE_WIFI_SSID not set at build time".into()));
    }

    let mut wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs))?;

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: config
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| BridgeError::Config("SSID too long".into()))?,
        password: config
            .password
            .as_str()
            .try_into()
            .map_err(|_| BridgeError::Config("password too long".into()))?,
        auth_method: if config.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    }))?;

    if let Err(e) = wifi.sta_netif_mut().set_hostname(&config.hostname) {
        error!("failed to set hostname to \"{}\": {}", config.hostname, e);
    }

    let wifi_link = Arc::clone(&link);
    let wifi_events = sys_loop.subscribe::<WifiEvent, _>(move |event| {
        if let WifiEvent::StaDisconnected { .. } = event {
            warn!("station disconnected");
            wifi_link.link_down();
            // SAFETY: Wi-Fi driver is started; reconnect is a plain request
            if let Err(e) = esp!(unsafe { sys::esp_wifi_connect() }) {
                error!("reconnect failed: {}", e);
            }
        }
    })?;

    let ip_link = link;
    let ip_events = sys_loop.subscribe::<IpEvent, _>(move |event| {
        if let IpEvent::DhcpIpAssigned { .. } = event {
            info!("got IP address");
            ip_link.link_up();
        }
    })?;

    wifi.start()?;
    // Minimum modem power saving
    esp!(unsafe { sys::esp_wifi_set_ps(sys::wifi_ps_type_t_WIFI_PS_MIN_MODEM) })?;
    wifi.connect()?;
    info!("connecting to \"{}\"", config.ssid);

    Ok(Network {
        _wifi: wifi,
        _wifi_events: wifi_events,
        _ip_events: ip_events,
    })
}
