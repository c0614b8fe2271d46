use std::io::Read;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use anyhow::{anyhow, Result};
use studio_engine::boundary::{
    handle_health, handle_process_image, resolve_route, BoundaryResponse, Route, MAX_BODY_BYTES,
};
use studio_engine::Orchestrator;
use tiny_http::{Header, Request, Response, Server};

const HTTP_WORKER_FACTOR: usize = 2;
const HTTP_WORKER_MIN: usize = 4;
const HTTP_QUEUE_FACTOR: usize = 4;
const HTTP_QUEUE_MIN: usize = 16;

pub fn http_worker_count() -> usize {
    let cpus = thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(4);
    (cpus * HTTP_WORKER_FACTOR).max(HTTP_WORKER_MIN)
}

fn http_queue_size(worker_count: usize) -> usize {
    worker_count.saturating_mul(HTTP_QUEUE_FACTOR).max(HTTP_QUEUE_MIN)
}

pub fn bind(addr: &str) -> Result<Server> {
    Server::http(addr).map_err(|err| anyhow!("failed to bind {addr}: {err}"))
}

/// Serves until the listener closes. Each request runs on one worker from a
/// fixed pool; a full queue blocks the accept loop.
pub fn serve(server: Server, orchestrator: Arc<Orchestrator>, worker_count: usize) {
    let worker_count = worker_count.max(1);
    let (tx, rx) = mpsc::sync_channel::<Request>(http_queue_size(worker_count));
    spawn_request_workers(worker_count, rx, orchestrator);

    for request in server.incoming_requests() {
        if tx.send(request).is_err() {
            break;
        }
    }
}

fn spawn_request_workers(
    worker_count: usize,
    rx: mpsc::Receiver<Request>,
    orchestrator: Arc<Orchestrator>,
) {
    let shared_rx = Arc::new(Mutex::new(rx));
    for _ in 0..worker_count {
        let worker_rx = Arc::clone(&shared_rx);
        let orchestrator = Arc::clone(&orchestrator);
        let _ = thread::spawn(move || loop {
            let request = {
                let Ok(guard) = worker_rx.lock() else {
                    break;
                };
                match guard.recv() {
                    Ok(request) => request,
                    Err(_) => break,
                }
            };
            route_request(request, &orchestrator);
        });
    }
}

fn route_request(mut request: Request, orchestrator: &Orchestrator) {
    let route = resolve_route(request.method().as_str(), request.url());
    let response = match route {
        Route::Health => handle_health(orchestrator),
        Route::NotFound => BoundaryResponse::error(404, "Not found"),
        Route::MethodNotAllowed => BoundaryResponse::error(405, "Method not allowed"),
        Route::ProcessImage => match read_body(&mut request) {
            Ok(body) => handle_process_image(&body, orchestrator),
            Err(response) => response,
        },
    };
    log::info!(
        "{} {} -> {}",
        request.method().as_str(),
        request.url(),
        response.status
    );
    respond_json(request, response);
}

fn read_body(request: &mut Request) -> Result<Vec<u8>, BoundaryResponse> {
    if request.body_length().unwrap_or(0) > MAX_BODY_BYTES {
        return Err(too_large());
    }
    let mut body = Vec::new();
    let limit = (MAX_BODY_BYTES + 1) as u64;
    if let Err(err) = request.as_reader().take(limit).read_to_end(&mut body) {
        log::warn!("request body read failed: {err}");
        return Err(BoundaryResponse::error(400, "Failed to read request body"));
    }
    if body.len() > MAX_BODY_BYTES {
        return Err(too_large());
    }
    Ok(body)
}

fn too_large() -> BoundaryResponse {
    BoundaryResponse::error(413, "Image is too large")
}

fn respond_json(request: Request, response: BoundaryResponse) {
    let body = serde_json::to_string(&response.body).unwrap_or_else(|_| "{}".to_string());
    let mut http_response = Response::from_string(body).with_status_code(response.status);
    if let Ok(content_type) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        http_response = http_response.with_header(content_type);
    }
    if let Err(err) = request.respond(http_response) {
        log::warn!("response write failed: {err}");
    }
}
