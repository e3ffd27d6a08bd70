use core::convert::TryInto;
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use chrono::Utc;
use ds18b20::{Ds18b20, Resolution};
use embedded_svc::{
    http::Method,
    io::Write,
    wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyIOPin, IOPin, InputOutput, PinDriver, Pull},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
    sntp::EspSntp,
    sys::{self, esp, EspError},
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};
use one_wire_bus::{Address, OneWire};
use serde::Serialize;

use tempmon_common::{
    clock, reading::DEVICE_DISCONNECTED_C, LinkAction, LinkWatch, NetworkConfig, NetworkInfo,
    ProvisioningRequest, Reading, RecordOutcome, RuntimeConfig, SensorReader, SettingsUpdate,
    TemperatureDriver, TemperatureMonitor, Uptime, WifiSecurity,
};

use crate::web::{
    parse_query, provisioning_ack, render_index, settings_ack, CONTENT_TYPE_HTML,
    CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT, DASHBOARD_HTML,
};

const NVS_NAMESPACE: &str = "tempmon";
const NVS_RUNTIME_KEY: &str = "runtime_json";

const DS18B20_PIN: i32 = 4;

const SETUP_AP_SSID: &str = "TempMonitor-Setup";
const SETUP_AP_PASSWORD: &str = "TempMonitor";
const SETUP_AP_CHANNEL: u8 = 6;

const WATCHDOG_TIMEOUT_MS: u32 = 60_000;
const WIFI_JOIN_ATTEMPTS: u32 = 5;
const WIFI_JOIN_BACKOFF: Duration = Duration::from_secs(3);
const HTTP_STACK_SIZE: usize = 16 * 1024;

type SharedMonitor = Arc<Mutex<TemperatureMonitor>>;
type EspRequest<'r, 'c> =
    esp_idf_svc::http::server::Request<&'r mut esp_idf_svc::http::server::EspHttpConnection<'c>>;

/// First DS18B20 found on the bus. A failed conversion reports the
/// disconnect sentinel and forces a fresh search on the next sample.
struct Ds18b20Driver {
    bus: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    delay: Ets,
    address: Option<Address>,
    last_celsius: f32,
}

impl Ds18b20Driver {
    fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut line = PinDriver::input_output_od(pin)?;
        line.set_pull(Pull::Up)?;
        line.set_high()?;

        let bus = OneWire::new(line).map_err(|err| anyhow!("one-wire bus setup: {err:?}"))?;
        Ok(Self {
            bus,
            delay: Ets,
            address: None,
            last_celsius: DEVICE_DISCONNECTED_C,
        })
    }

    fn locate(&mut self) -> Option<Address> {
        let found = self
            .bus
            .devices(false, &mut self.delay)
            .map_while(Result::ok)
            .find(|address| address.family_code() == ds18b20::FAMILY_CODE);

        match found {
            Some(address) => info!("DS18B20 {address:?} on GPIO{DS18B20_PIN}"),
            None => warn!("no DS18B20 answering on GPIO{DS18B20_PIN}"),
        }
        found
    }

    fn convert(&mut self) -> Option<f32> {
        if self.address.is_none() {
            self.address = self.locate();
        }
        let sensor = Ds18b20::new::<core::convert::Infallible>(self.address?).ok()?;

        let result = ds18b20::start_simultaneous_temp_measurement(&mut self.bus, &mut self.delay)
            .and_then(|()| {
                Resolution::Bits12.delay_for_measurement_time(&mut self.delay);
                sensor.read_data(&mut self.bus, &mut self.delay)
            });

        match result {
            Ok(data) => Some(data.temperature),
            Err(err) => {
                warn!("DS18B20 conversion failed: {err:?}");
                self.address = None;
                None
            }
        }
    }
}

impl TemperatureDriver for Ds18b20Driver {
    fn request_temperatures(&mut self) {
        self.last_celsius = self.convert().unwrap_or(DEVICE_DISCONNECTED_C);
    }

    fn raw_celsius(&mut self) -> f32 {
        self.last_celsius
    }
}

/// `RuntimeConfig` as one JSON string in NVS.
struct ConfigStore {
    nvs: Mutex<EspNvs<NvsDefault>>,
}

impl ConfigStore {
    fn open(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)
            .with_context(|| format!("failed to open NVS namespace `{NVS_NAMESPACE}`"))?;
        Ok(Self {
            nvs: Mutex::new(nvs),
        })
    }

    fn load(&self) -> anyhow::Result<RuntimeConfig> {
        let nvs = self.nvs.lock().unwrap_or_else(PoisonError::into_inner);
        Self::read(&nvs)
    }

    fn save_network(&self, network: &NetworkConfig) -> anyhow::Result<()> {
        let mut nvs = self.nvs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut runtime = Self::read(&nvs)?;
        runtime.network = network.clone();
        nvs.set_str(NVS_RUNTIME_KEY, &serde_json::to_string(&runtime)?)?;
        Ok(())
    }

    fn read(nvs: &EspNvs<NvsDefault>) -> anyhow::Result<RuntimeConfig> {
        let Some(len) = nvs.str_len(NVS_RUNTIME_KEY)? else {
            return Ok(RuntimeConfig::default());
        };
        let mut buf = vec![0_u8; len];
        match nvs.get_str(NVS_RUNTIME_KEY, &mut buf)? {
            Some(raw) => Ok(serde_json::from_str(raw)?),
            None => Ok(RuntimeConfig::default()),
        }
    }
}

fn watch_link(link: &mut LinkWatch, wifi: &mut EspWifi<'static>) {
    let connected = wifi.is_connected().unwrap_or(false);
    let was_down = link.is_down();

    match link.observe(connected, Instant::now()) {
        LinkAction::Idle => {}
        LinkAction::Reconnect => {
            if !was_down {
                warn!("wifi link lost; sampling continues offline");
            }
            if let Err(err) = wifi.connect() {
                warn!("wifi reconnect request failed: {err}");
            }
        }
        LinkAction::Restored(after) => info!("wifi link restored after {}s", after.as_secs()),
    }
}

pub fn run() -> anyhow::Result<()> {
    let uptime = Uptime::start();
    sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let partition = EspDefaultNvsPartition::take()?;
    let store = Arc::new(ConfigStore::open(partition.clone())?);

    let mut runtime = store.load().unwrap_or_else(|err| {
        warn!("stored runtime config unreadable, using defaults: {err:#}");
        RuntimeConfig::default()
    });
    apply_build_credentials(&mut runtime.network);
    runtime.sanitize();

    let monitor: SharedMonitor = Arc::new(Mutex::new(
        TemperatureMonitor::new(&runtime.monitor, runtime.defaults)
            .context("failed to create temperature monitor")?,
    ));

    let Peripherals { modem, pins, .. } = Peripherals::take()?;
    let mut sensor = SensorReader::new(
        Ds18b20Driver::new(pins.gpio4.downgrade()).context("failed to initialize DS18B20")?,
    );

    let (mut wifi, joined) = start_wifi(modem, sys_loop, partition, &runtime.network)?;
    if !joined {
        let _server = create_setup_server(monitor, store)?;
        info!("setup AP `{SETUP_AP_SSID}` up; open http://192.168.71.1/");
        loop {
            thread::sleep(Duration::from_secs(60));
        }
    }

    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;

    let network = Arc::new(NetworkInfo {
        ssid: runtime.network.ssid.clone(),
        ip: wifi
            .sta_netif()
            .get_ip_info()
            .map(|ip_info| ip_info.ip.to_string())
            .unwrap_or_default(),
    });
    let _server = create_http_server(monitor.clone(), network.clone(), uptime, store)?;
    info!(
        "monitor ready at http://{}/ after {}s",
        network.ip,
        uptime.elapsed_secs()
    );

    arm_watchdog()?;
    let mut link = LinkWatch::new();

    loop {
        let _ = unsafe { sys::esp_task_wdt_reset() };
        watch_link(&mut link, &mut wifi);

        let now_ms = uptime.elapsed_ms();
        if lock_monitor(&monitor).poll_due(now_ms) {
            let reading = sensor.sample(reading_timestamp(&runtime.timezone, &uptime));
            log_reading(&reading);

            let (outcome, next_ms) = {
                let mut monitor = lock_monitor(&monitor);
                (monitor.record(reading), monitor.next_poll_in_ms(now_ms))
            };
            log_outcome(outcome);
            debug!("next sample in {} s", next_ms / 1000);
        }

        thread::sleep(Duration::from_secs(1));
    }
}

fn reading_timestamp(timezone: &str, uptime: &Uptime) -> String {
    let wall = clock::is_time_synced(Utc::now())
        .then(|| clock::now_in_timezone(timezone))
        .flatten();
    clock::reading_timestamp(wall, uptime.elapsed_secs())
}

fn log_reading(reading: &Reading) {
    if reading.is_fault() {
        warn!("DS18B20 fault at {}", reading.timestamp);
    } else {
        info!(
            "{} C / {} F at {}",
            reading.celsius_text(),
            reading.fahrenheit_text(),
            reading.timestamp
        );
    }
}

fn log_outcome(outcome: RecordOutcome) {
    if !outcome.stored {
        debug!("history frozen at capacity; reading dropped");
    } else if outcome.alert_changed() && outcome.alert.is_alarm() {
        warn!(
            "temperature alert {} (was {})",
            outcome.alert.as_str(),
            outcome.previous_alert.as_str()
        );
    } else if outcome.alert_changed() {
        info!(
            "alert state {} (was {})",
            outcome.alert.as_str(),
            outcome.previous_alert.as_str()
        );
    }
}

fn lock_monitor(monitor: &SharedMonitor) -> MutexGuard<'_, TemperatureMonitor> {
    monitor.lock().unwrap_or_else(PoisonError::into_inner)
}

fn new_server() -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: HTTP_STACK_SIZE,
        ..Default::default()
    };
    EspHttpServer::new(&conf).context("failed to start HTTP server")
}

fn create_http_server(
    monitor: SharedMonitor,
    network: Arc<NetworkInfo>,
    uptime: Uptime,
    store: Arc<ConfigStore>,
) -> anyhow::Result<EspHttpServer<'static>> {
    let mut server = new_server()?;

    let m = monitor.clone();
    server.fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
        let page = render_index(&lock_monitor(&m));
        write_body(req, 200, CONTENT_TYPE_HTML, page.as_bytes())
    })?;

    server.fn_handler::<anyhow::Error, _>("/dashboard", Method::Get, |req| {
        write_body(req, 200, CONTENT_TYPE_HTML, DASHBOARD_HTML.as_bytes())
    })?;

    let m = monitor.clone();
    server.fn_handler::<anyhow::Error, _>("/data", Method::Get, move |req| {
        let rows = lock_monitor(&m).data_table();
        write_json(req, &rows)
    })?;

    let m = monitor.clone();
    server.fn_handler::<anyhow::Error, _>("/info", Method::Get, move |req| {
        let status = lock_monitor(&m).status(&network, uptime.elapsed_secs());
        write_json(req, &status)
    })?;

    server.fn_handler::<anyhow::Error, _>("/updateSettings", Method::Get, move |req| {
        let params = parse_query(req.uri());
        let result = SettingsUpdate::from_query(&params)
            .and_then(|update| lock_monitor(&monitor).update_settings(update));

        match result {
            Ok(settings) => {
                info!(
                    "settings updated: min {} C, max {} C, every {} min",
                    settings.min_threshold_c, settings.max_threshold_c, settings.poll_interval
                );
                write_text(req, 200, &settings_ack(&settings))
            }
            Err(err) => {
                warn!("rejected settings update: {err}");
                write_text(req, 400, &err.to_string())
            }
        }
    })?;

    add_provisioning_route(&mut server, store)?;
    Ok(server)
}

/// Served while the device runs its own access point. Common captive-portal
/// probe paths land on the index so phones open the form.
fn create_setup_server(
    monitor: SharedMonitor,
    store: Arc<ConfigStore>,
) -> anyhow::Result<EspHttpServer<'static>> {
    let mut server = new_server()?;

    for path in ["/", "/generate_204", "/hotspot-detect.html", "/ncsi.txt"] {
        let m = monitor.clone();
        server.fn_handler::<anyhow::Error, _>(path, Method::Get, move |req| {
            let page = render_index(&lock_monitor(&m));
            write_body(req, 200, CONTENT_TYPE_HTML, page.as_bytes())
        })?;
    }

    add_provisioning_route(&mut server, store)?;
    Ok(server)
}

fn add_provisioning_route(
    server: &mut EspHttpServer<'static>,
    store: Arc<ConfigStore>,
) -> anyhow::Result<()> {
    server.fn_handler::<anyhow::Error, _>("/get", Method::Get, move |req| {
        let params = parse_query(req.uri());
        let network = match ProvisioningRequest::from_query(&params) {
            Ok(request) => request.network,
            Err(err) => return write_text(req, 400, &err.to_string()),
        };

        if let Err(err) = store.save_network(&network) {
            warn!("could not store credentials: {err:#}");
            return write_text(req, 500, "Failed to persist network credentials");
        }

        info!("credentials stored for `{}`; restarting", network.ssid);
        thread::Builder::new()
            .name("restart".into())
            .spawn(|| {
                thread::sleep(Duration::from_millis(1_500));
                unsafe { sys::esp_restart() };
            })
            .context("failed to spawn restart thread")?;
        write_text(req, 200, &provisioning_ack(&network))
    })?;
    Ok(())
}

fn write_body(
    req: EspRequest<'_, '_>,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> anyhow::Result<()> {
    let mut response = req.into_response(status, None, &[("Content-Type", content_type)])?;
    response.write_all(body)?;
    Ok(())
}

fn write_json<T: Serialize>(req: EspRequest<'_, '_>, payload: &T) -> anyhow::Result<()> {
    write_body(req, 200, CONTENT_TYPE_JSON, &serde_json::to_vec(payload)?)
}

fn write_text(req: EspRequest<'_, '_>, status: u16, message: &str) -> anyhow::Result<()> {
    write_body(req, status, CONTENT_TYPE_TEXT, message.as_bytes())
}

/// Fills credentials baked in at build time when NVS has none.
fn apply_build_credentials(network: &mut NetworkConfig) {
    if network.ssid.is_empty() {
        network.ssid = option_env!("WIFI_SSID").unwrap_or_default().to_string();
    }
    if network.password.is_empty() {
        network.password = option_env!("WIFI_PASS").unwrap_or_default().to_string();
    }
}

/// Starts Wi-Fi and returns whether the station joined. On `false` the radio
/// has been switched to the setup access point.
fn start_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<(EspWifi<'static>, bool)> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let joined = network.has_station_credentials() && join_station(&mut wifi, network)?;
    if !joined {
        let _ = wifi.stop();
        start_setup_ap(&mut wifi)?;
    }

    drop(wifi);
    Ok((esp_wifi, joined))
}

fn join_station(
    wifi: &mut BlockingWifi<&mut EspWifi<'static>>,
    network: &NetworkConfig,
) -> anyhow::Result<bool> {
    let auth_method = match network.security {
        WifiSecurity::Wpa2Enterprise => AuthMethod::WPA2Enterprise,
        WifiSecurity::Wpa2Personal if network.password.is_empty() => AuthMethod::None,
        WifiSecurity::Wpa2Personal => AuthMethod::WPAWPA2Personal,
    };

    let client = ClientConfiguration {
        ssid: network
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("ssid `{}` too long", network.ssid))?,
        password: network
            .password
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    };
    wifi.set_configuration(&Configuration::Client(client))?;
    if network.security == WifiSecurity::Wpa2Enterprise {
        configure_enterprise(network)?;
    }
    wifi.start()?;

    for attempt in 1..=WIFI_JOIN_ATTEMPTS {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("joined `{}` on attempt {attempt}", network.ssid);
                return Ok(true);
            }
            Err(err) => {
                warn!("join attempt {attempt}/{WIFI_JOIN_ATTEMPTS} failed: {err}");
                let _ = wifi.disconnect();
                thread::sleep(WIFI_JOIN_BACKOFF);
            }
        }
    }
    Ok(false)
}

/// Hands the EAP identity and credentials to the supplicant.
fn configure_enterprise(network: &NetworkConfig) -> Result<(), EspError> {
    let identity = network.username.as_bytes();
    let secret = if network.passcode.is_empty() {
        network.password.as_bytes()
    } else {
        network.passcode.as_bytes()
    };

    unsafe {
        esp!(sys::esp_eap_client_set_identity(
            identity.as_ptr(),
            identity.len() as i32
        ))?;
        esp!(sys::esp_eap_client_set_username(
            identity.as_ptr(),
            identity.len() as i32
        ))?;
        esp!(sys::esp_eap_client_set_password(
            secret.as_ptr(),
            secret.len() as i32
        ))?;
        esp!(sys::esp_wifi_sta_enterprise_enable())
    }
}

fn start_setup_ap(wifi: &mut BlockingWifi<&mut EspWifi<'static>>) -> anyhow::Result<()> {
    let ap = AccessPointConfiguration {
        ssid: SETUP_AP_SSID
            .try_into()
            .map_err(|_| anyhow!("setup AP ssid too long"))?,
        password: SETUP_AP_PASSWORD
            .try_into()
            .map_err(|_| anyhow!("setup AP password too long"))?,
        auth_method: AuthMethod::WPA2Personal,
        channel: SETUP_AP_CHANNEL,
        ..Default::default()
    };
    wifi.set_configuration(&Configuration::AccessPoint(ap))?;
    wifi.start()?;
    Ok(())
}

/// Resets the device if the sampling loop stalls, e.g. on a wedged one-wire
/// transaction. An already-initialised watchdog is fine.
fn arm_watchdog() -> anyhow::Result<()> {
    let config = sys::esp_task_wdt_config_t {
        timeout_ms: WATCHDOG_TIMEOUT_MS,
        idle_core_mask: 0,
        trigger_panic: true,
    };
    allow_invalid_state(esp!(unsafe { sys::esp_task_wdt_init(&config) }))
        .context("esp_task_wdt_init")?;
    allow_invalid_state(esp!(unsafe { sys::esp_task_wdt_add(core::ptr::null_mut()) }))
        .context("esp_task_wdt_add")?;
    Ok(())
}

fn allow_invalid_state(result: Result<(), EspError>) -> Result<(), EspError> {
    match result {
        Err(err) if err.code() == sys::ESP_ERR_INVALID_STATE as sys::esp_err_t => Ok(()),
        other => other,
    }
}
