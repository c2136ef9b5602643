//! Service discovery: periodic synthesis of a full candidate routing table
//! from labeled Docker containers.
//!
//! Each cycle polls `GET /containers/json` over the Docker Unix socket,
//! builds one forward route per eligible container and hands the complete
//! candidate to the store. Poll failures keep the last table.

use crate::config::settings::DiscoverySettings;
use crate::models::route::{Route, Target};
use crate::services::routing_table::RoutingTableStore;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

const LABEL_HOSTNAME: &str = "maegashira.public.hostname";
const LABEL_PATH: &str = "maegashira.public.path";
const LABEL_PORT: &str = "maegashira.private.port";

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Labels", default)]
    labels: HashMap<String, String>,
}

/// Starts the discovery loop for the configured strategy, if any.
pub fn spawn(strategy: DiscoverySettings, store: Arc<RoutingTableStore>) -> Option<JoinHandle<()>> {
    match strategy {
        DiscoverySettings::None => None,
        DiscoverySettings::Docker {
            refresh_interval_ms,
            socket_path,
        } => {
            info!("docker discovery enabled, polling every {refresh_interval_ms}ms");
            Some(tokio::spawn(poll_loop(
                socket_path,
                Duration::from_millis(refresh_interval_ms.max(1000)),
                store,
            )))
        }
    }
}

async fn poll_loop(socket_path: String, interval: Duration, store: Arc<RoutingTableStore>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match poll_docker(&socket_path).await {
            Ok(candidate) => {
                if let Err(e) = store.set(candidate) {
                    error!("discovery produced an invalid routing table, keeping last: {e}");
                }
            }
            Err(e) => warn!("docker discovery poll failed, keeping last table: {e}"),
        }
    }
}

/// One poll cycle: list containers and synthesize the candidate table.
async fn poll_docker(socket_path: &str) -> std::io::Result<Vec<Route>> {
    let body = docker_get(socket_path, "/containers/json").await?;
    let containers: Vec<ContainerSummary> = serde_json::from_slice(&body)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut routes = Vec::new();
    for container in containers {
        let hostname = container.labels.get(LABEL_HOSTNAME);
        let port = container.labels.get(LABEL_PORT);
        let (hostname, port) = match (hostname, port) {
            (Some(hostname), Some(port)) => (hostname, port),
            _ => continue,
        };

        // The container's name is the service identity; unnamed containers
        // cannot be registered.
        let service = match container.names.first() {
            Some(name) => name.trim_start_matches('/').to_string(),
            None => {
                warn!("container {} has routing labels but no name, skipping", container.id);
                continue;
            }
        };

        let path = container
            .labels
            .get(LABEL_PATH)
            .cloned()
            .unwrap_or_default();

        debug!("discovered service '{service}' at {hostname}{path} -> port {port}");
        routes.push(Route {
            hostname: hostname.clone(),
            path,
            timeout_ms: None,
            middlewares: None,
            load_balancing: None,
            authentication: None,
            cache: None,
            targets: vec![Target::Forward {
                url: format!("http://localhost:{port}"),
            }],
        });
    }

    Ok(routes)
}

/// Minimal HTTP/1.0 GET over the Docker Unix socket.
///
/// HTTP/1.0 keeps the response unchunked so the body is everything after
/// the header block.
async fn docker_get(socket_path: &str, path: &str) -> std::io::Result<Vec<u8>> {
    let mut stream = UnixStream::connect(socket_path).await?;
    let request = format!("GET {path} HTTP/1.0\r\nHost: localhost\r\nAccept: application/json\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;

    let header_end = find_header_end(&response).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed docker response")
    })?;

    let status_line = response
        .split(|&b| b == b'\r')
        .next()
        .map(|line| String::from_utf8_lossy(line).to_string())
        .unwrap_or_default();
    if !status_line.contains(" 200 ") {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("docker api returned: {status_line}"),
        ));
    }

    Ok(response[header_end..].to_vec())
}

fn find_header_end(response: &[u8]) -> Option<usize> {
    response
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}
