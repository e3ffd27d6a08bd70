use std::{
    collections::HashMap,
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::{
    net::{TcpListener, UdpSocket},
    sync::Mutex,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use tempmon_common::{
    clock, NetworkInfo, ProvisioningRequest, Reading, RecordOutcome, RuntimeConfig, SensorReader,
    SettingsUpdate, TemperatureDriver, TemperatureMonitor, Uptime,
};

use crate::web::{
    provisioning_ack, render_index, settings_ack, CONTENT_TYPE_TEXT, DASHBOARD_HTML,
};

#[derive(Clone)]
struct AppState {
    monitor: Arc<Mutex<TemperatureMonitor>>,
    network: Arc<Mutex<NetworkInfo>>,
    timezone: Arc<String>,
    uptime: Uptime,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

/// Stand-in for the one-wire probe: a slow drift around 23 C, with an
/// optional injected disconnect every `fault_every` conversions.
struct SimulatedDriver {
    conversions: u64,
    fault_every: Option<u64>,
    last_celsius: f32,
}

impl SimulatedDriver {
    fn new(fault_every: Option<u64>) -> Self {
        Self {
            conversions: 0,
            fault_every: fault_every.filter(|every| *every > 0),
            last_celsius: tempmon_common::reading::DEVICE_DISCONNECTED_C,
        }
    }
}

impl TemperatureDriver for SimulatedDriver {
    fn request_temperatures(&mut self) {
        self.conversions = self.conversions.saturating_add(1);

        let faulted = self
            .fault_every
            .map(|every| self.conversions % every == 0)
            .unwrap_or(false);

        self.last_celsius = if faulted {
            tempmon_common::reading::DEVICE_DISCONNECTED_C
        } else {
            // Ten conversion cycle; each sample reads twice (C then F).
            let step = (self.conversions / 2) % 10;
            21.0 + step as f32 * 0.5
        };
    }

    fn raw_celsius(&mut self) -> f32 {
        self.last_celsius
    }
}

pub async fn run() -> anyhow::Result<()> {
    let uptime = Uptime::start();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let monitor = TemperatureMonitor::new(&runtime.monitor, runtime.defaults)
        .context("failed to create temperature monitor")?;

    let port = std::env::var("TEMPMON_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind monitor server at {addr}"))?;

    let network = NetworkInfo {
        ssid: if runtime.network.ssid.is_empty() {
            "host-simulation".to_string()
        } else {
            runtime.network.ssid.clone()
        },
        ip: advertised_ip(listener.local_addr()?.ip()).await.to_string(),
    };

    let app_state = AppState {
        monitor: Arc::new(Mutex::new(monitor)),
        network: Arc::new(Mutex::new(network)),
        timezone: Arc::new(runtime.timezone.clone()),
        uptime,
        store,
    };

    let fault_every = std::env::var("TEMPMON_SIM_FAULT_EVERY")
        .ok()
        .and_then(|value| value.parse::<u64>().ok());
    spawn_poll_loop(
        app_state.clone(),
        SensorReader::new(SimulatedDriver::new(fault_every)),
    );

    let (capacity, retention) = {
        let monitor = app_state.monitor.lock().await;
        (monitor.history().capacity(), monitor.history().retention())
    };
    let app = build_router(app_state);

    info!(
        "monitor listening on http://{addr} (history capacity {capacity}, {retention:?} retention)"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/dashboard", get(handle_dashboard))
        .route("/data", get(handle_get_data))
        .route("/info", get(handle_get_info))
        .route("/updateSettings", get(handle_update_settings))
        .route("/get", get(handle_provision))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn spawn_poll_loop<D>(app_state: AppState, mut sensor: SensorReader<D>)
where
    D: TemperatureDriver + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));

        loop {
            interval.tick().await;
            let now_ms = app_state.uptime.elapsed_ms();

            let due = { app_state.monitor.lock().await.poll_due(now_ms) };
            if !due {
                continue;
            }

            let wall = clock::now_in_timezone(&app_state.timezone);
            let reading = sensor.sample(clock::reading_timestamp(wall, now_ms / 1000));
            log_reading(&reading);

            let (outcome, next_ms) = {
                let mut monitor = app_state.monitor.lock().await;
                (monitor.record(reading), monitor.next_poll_in_ms(now_ms))
            };
            log_outcome(outcome);
            debug!("next sample in {} s", next_ms / 1000);
        }
    });
}

fn log_reading(reading: &Reading) {
    if reading.is_fault() {
        warn!("temperature sensor fault at {}", reading.timestamp);
    } else {
        info!(
            "sampled {} C / {} F at {}",
            reading.celsius_text(),
            reading.fahrenheit_text(),
            reading.timestamp
        );
    }
}

fn log_outcome(outcome: RecordOutcome) {
    if !outcome.stored {
        debug!("history is frozen at capacity; reading dropped");
        return;
    }
    if !outcome.alert_changed() {
        return;
    }
    if outcome.alert.is_alarm() {
        warn!(
            "temperature alert {} (was {})",
            outcome.alert.as_str(),
            outcome.previous_alert.as_str()
        );
    } else {
        info!(
            "alert state {} (was {})",
            outcome.alert.as_str(),
            outcome.previous_alert.as_str()
        );
    }
}

async fn handle_index(State(state): State<AppState>) -> Html<String> {
    let monitor = state.monitor.lock().await;
    Html(render_index(&monitor))
}

async fn handle_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn handle_get_data(State(state): State<AppState>) -> impl IntoResponse {
    let rows = state.monitor.lock().await.data_table();
    Json(rows)
}

async fn handle_get_info(State(state): State<AppState>) -> impl IntoResponse {
    let network = state.network.lock().await.clone();
    let status = {
        let monitor = state.monitor.lock().await;
        monitor.status(&network, state.uptime.elapsed_secs())
    };
    Json(status)
}

async fn handle_update_settings(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let update = match SettingsUpdate::from_query(&params) {
        Ok(update) => update,
        Err(err) => return text_response(StatusCode::BAD_REQUEST, err.to_string()),
    };

    let result = {
        let mut monitor = state.monitor.lock().await;
        monitor.update_settings(update)
    };

    match result {
        Ok(settings) => {
            info!(
                "settings updated: min {} C, max {} C, every {} min",
                settings.min_threshold_c, settings.max_threshold_c, settings.poll_interval
            );
            text_response(StatusCode::OK, settings_ack(&settings))
        }
        Err(err) => {
            warn!("rejected settings update: {err}");
            text_response(StatusCode::BAD_REQUEST, err.to_string())
        }
    }
}

async fn handle_provision(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request = match ProvisioningRequest::from_query(&params) {
        Ok(request) => request,
        Err(err) => return text_response(StatusCode::BAD_REQUEST, err.to_string()),
    };

    let network = request.network;
    if let Err(err) = state.store.save_network(&network).await {
        warn!("failed to persist network credentials: {err:#}");
        return text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist network credentials".to_string(),
        );
    }

    info!(
        "stored credentials for `{}`; a restart is required to apply them",
        network.ssid
    );
    state.network.lock().await.ssid = network.ssid.clone();
    text_response(StatusCode::OK, provisioning_ack(&network))
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("TEMPMON_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.tempmon"));
        Self::at(data_dir)
    }

    fn at(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        self.read_runtime().await
    }

    async fn save_network(&self, network: &tempmon_common::NetworkConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut runtime = self.read_runtime().await?;
        runtime.network = network.clone();

        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(&runtime)?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    async fn read_runtime(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn text_response(status: StatusCode, message: String) -> Response {
    (status, [(header::CONTENT_TYPE, CONTENT_TYPE_TEXT)], message).into_response()
}

/// Address reported in `/info`. A wildcard bind is resolved to the interface
/// that carries the default route, without sending any packet.
async fn advertised_ip(bound: IpAddr) -> IpAddr {
    if !bound.is_unspecified() {
        return bound;
    }

    let routed = async {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).await?;
        socket.local_addr().map(|addr| addr.ip())
    };

    match routed.await {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(err) => {
            debug!("no default route for advertised address: {err}");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}
