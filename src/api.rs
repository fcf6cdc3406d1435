//! Local HTTP control surface.
//!
//! A second presentation layer next to the console: it forwards start/stop
//! requests to the controller queue and serves the last status the
//! controller reported.

use std::io::Read;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info, warn};

use crate::alarm::controller::ControllerEvent;
use crate::alarm::model::AlarmStatus;
use crate::presenter::Presenter;

const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LastError {
    pub title: String,
    pub detail: String,
    pub at_unix_ms: i64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct StatusSnapshot {
    pub status: String,
    pub fire_at: Option<String>,
    pub last_error: Option<LastError>,
    pub updated_unix_ms: i64,
}

#[derive(Debug, Default)]
pub struct ApiSharedState {
    pub snapshot: StatusSnapshot,
    total_requests: u64,
}

impl ApiSharedState {
    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    fn record_status(&mut self, status: AlarmStatus, now_ms: i64) {
        self.snapshot.status = status.label().to_string();
        if status == AlarmStatus::Idle {
            self.snapshot.fire_at = None;
        }
        self.snapshot.updated_unix_ms = now_ms;
    }

    fn record_armed(&mut self, fire_at: DateTime<Local>, now_ms: i64) {
        self.snapshot.fire_at = Some(fire_at.to_rfc3339());
        self.snapshot.updated_unix_ms = now_ms;
    }

    fn record_error(&mut self, title: &str, detail: &str, now_ms: i64) {
        self.snapshot.last_error = Some(LastError {
            title: title.to_string(),
            detail: detail.to_string(),
            at_unix_ms: now_ms,
        });
        self.snapshot.updated_unix_ms = now_ms;
    }
}

/// Mirrors controller notifications into the state served by the API.
#[derive(Debug, Clone)]
pub struct ApiPresenter {
    state: Arc<Mutex<ApiSharedState>>,
}

impl ApiPresenter {
    pub fn new(state: Arc<Mutex<ApiSharedState>>) -> Self {
        Self { state }
    }
}

impl Presenter for ApiPresenter {
    fn status_changed(&self, status: AlarmStatus) {
        if let Ok(mut guard) = self.state.lock() {
            guard.record_status(status, Local::now().timestamp_millis());
        }
    }

    fn error(&self, title: &str, detail: &str) {
        if let Ok(mut guard) = self.state.lock() {
            guard.record_error(title, detail, Local::now().timestamp_millis());
        }
    }

    fn armed(&self, fire_at: DateTime<Local>) {
        if let Ok(mut guard) = self.state.lock() {
            guard.record_armed(fire_at, Local::now().timestamp_millis());
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

pub struct ApiServer {
    state: Arc<Mutex<ApiSharedState>>,
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(
        config: ApiServerConfig,
        state: Arc<Mutex<ApiSharedState>>,
        events: Sender<ControllerEvent>,
    ) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow::anyhow!("failed to start API server on {bind}: {err}"))?;
        info!(%bind, "control API listening");
        let stop = Arc::new(AtomicBool::new(false));
        let state_for_thread = Arc::clone(&state);
        let stop_for_thread = Arc::clone(&stop);
        let http_join = thread::Builder::new()
            .name("control-api".to_string())
            .spawn(move || run_server_loop(server, state_for_thread, events, stop_for_thread))?;

        Ok(Self {
            state,
            stop,
            http_join: Some(http_join),
        })
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
        if let Ok(guard) = self.state.lock() {
            info!(requests = guard.total_requests(), "control API stopped");
        }
    }
}

fn run_server_loop(
    server: Server,
    state: Arc<Mutex<ApiSharedState>>,
    events: Sender<ControllerEvent>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => handle_request(request, &state, &events),
            Ok(None) => continue,
            Err(err) => debug!("API receive failed: {err}"),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
struct StartRequest {
    time: String,
    command: String,
}

#[derive(Debug, Serialize)]
struct Accepted {
    accepted: &'static str,
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Status,
    Start(StartRequest),
    Stop,
    Shutdown,
}

#[derive(Debug, PartialEq, Eq)]
struct Rejection {
    status: u16,
    message: String,
}

fn handle_request(
    mut request: tiny_http::Request,
    state: &Arc<Mutex<ApiSharedState>>,
    events: &Sender<ControllerEvent>,
) {
    let Some(remote_addr) = request.remote_addr().copied() else {
        let _ = send_text(request, StatusCode(400), "missing remote address");
        return;
    };
    if !is_local_network_ip(remote_addr.ip()) {
        let _ = send_text(request, StatusCode(403), "forbidden: local network only");
        return;
    }

    let mut body = String::new();
    if request.method() == &Method::Post {
        let read = request
            .as_reader()
            .take(MAX_BODY_BYTES)
            .read_to_string(&mut body);
        if let Err(err) = read {
            let _ = send_text(request, StatusCode(400), &format!("unreadable body: {err}"));
            return;
        }
    }

    let url = request.url().to_string();
    let path = url.split_once('?').map_or(url.as_str(), |(path, _)| path);
    let route = route_request(request.method(), path, &body);

    if let Ok(mut guard) = state.lock() {
        guard.total_requests += 1;
    }

    let result = match route {
        Ok(Route::Status) => {
            let snapshot = match state.lock() {
                Ok(guard) => guard.snapshot.clone(),
                Err(_) => {
                    let _ = send_text(request, StatusCode(500), "internal state lock error");
                    return;
                }
            };
            send_json(request, StatusCode(200), &snapshot)
        }
        Ok(Route::Start(start)) => {
            info!(time = %start.time, "start requested over API");
            forward(
                request,
                events,
                ControllerEvent::Start {
                    time: start.time,
                    command: start.command,
                },
                "start",
            )
        }
        Ok(Route::Stop) => {
            info!("stop requested over API");
            forward(request, events, ControllerEvent::Stop, "stop")
        }
        Ok(Route::Shutdown) => {
            info!("shutdown requested over API");
            forward(request, events, ControllerEvent::Shutdown, "shutdown")
        }
        Err(rejection) => send_text(request, StatusCode(rejection.status), &rejection.message),
    };
    if let Err(err) = result {
        warn!("failed to answer API request: {err:#}");
    }
}

fn forward(
    request: tiny_http::Request,
    events: &Sender<ControllerEvent>,
    event: ControllerEvent,
    accepted: &'static str,
) -> Result<()> {
    if events.send(event).is_err() {
        return send_text(request, StatusCode(503), "alarm controller is not running");
    }
    send_json(request, StatusCode(202), &Accepted { accepted })
}

fn route_request(method: &Method, path: &str, body: &str) -> Result<Route, Rejection> {
    match (method, path) {
        (Method::Get, "/v1/status") => Ok(Route::Status),
        (Method::Post, "/v1/start") => parse_start_body(body).map(Route::Start),
        (Method::Post, "/v1/stop") => Ok(Route::Stop),
        (Method::Post, "/v1/shutdown") => Ok(Route::Shutdown),
        (_, "/v1/status" | "/v1/start" | "/v1/stop" | "/v1/shutdown") => Err(Rejection {
            status: 405,
            message: "method not allowed".to_string(),
        }),
        _ => Err(Rejection {
            status: 404,
            message: "not found".to_string(),
        }),
    }
}

/// Only the body shape is checked here. The time text goes to the controller
/// as typed, so a bad time still retires the current alarm and lands in
/// `last_error` like any other start failure.
fn parse_start_body(body: &str) -> Result<StartRequest, Rejection> {
    serde_json::from_str::<StartRequest>(body).map_err(|err| Rejection {
        status: 400,
        message: format!("invalid start request: {err}"),
    })
}

fn send_json<T: Serialize>(
    request: tiny_http::Request,
    status: StatusCode,
    body: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_data(payload)
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || is_ipv4_mapped_local(v6)
        }
    }
}

fn is_ipv4_mapped_local(v6: Ipv6Addr) -> bool {
    match v6.to_ipv4_mapped() {
        Some(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        None => false,
    }
}
