//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC 2.0 calls to the command handlers. A
//! `subscribe_events` call turns its connection into an event stream.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tally_oracle::OracleError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::events::EventFilter;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Server-pushed notification carrying one event.
#[derive(Debug, Serialize)]
struct RpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: &'a crate::events::Event,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            -32601,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({"method": method})),
        )
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(
            -32602,
            "INVALID_PARAMS",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(
            -32603,
            "INTERNAL_ERROR",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Stable code and name for an oracle rejection.
    fn oracle_code(err: &OracleError) -> (i32, &'static str) {
        match err {
            OracleError::Paused => (-32001, "PAUSED"),
            OracleError::NotAdmin(_) => (-32010, "NOT_ADMIN"),
            OracleError::NotValidator(_) => (-32011, "NOT_VALIDATOR"),
            OracleError::ValidatorSuspended { .. } => (-32012, "VALIDATOR_SUSPENDED"),
            OracleError::ZeroAddress => (-32020, "ZERO_ADDRESS"),
            OracleError::InvalidPrice(_) => (-32021, "INVALID_PRICE"),
            OracleError::AssetNotRegistered(_) => (-32022, "ASSET_NOT_REGISTERED"),
            OracleError::NotRegistered(_) => (-32023, "NOT_REGISTERED"),
            OracleError::RegistryFull { .. } => (-32024, "REGISTRY_FULL"),
            OracleError::OffsetOutOfBounds { .. } => (-32025, "OFFSET_OUT_OF_BOUNDS"),
            OracleError::ArrayLengthMismatch { .. } => (-32026, "ARRAY_LENGTH_MISMATCH"),
            OracleError::AlreadySubmitted { .. } => (-32030, "ALREADY_SUBMITTED"),
            OracleError::CircuitBreakerTriggered { .. } => (-32031, "CIRCUIT_BREAKER_TRIGGERED"),
            OracleError::CumulativeDeviationExceeded { .. } => {
                (-32032, "CUMULATIVE_DEVIATION_EXCEEDED")
            }
            OracleError::ReferenceDeviationExceeded { .. } => {
                (-32033, "REFERENCE_DEVIATION_EXCEEDED")
            }
            OracleError::ParameterOutOfBounds { .. } => (-32040, "PARAMETER_OUT_OF_BOUNDS"),
            OracleError::NoReferenceFeed(_) => (-32041, "NO_REFERENCE_FEED"),
            OracleError::InvalidFeedConfig(_) => (-32042, "INVALID_FEED_CONFIG"),
            OracleError::NoUpgradeScheduled => (-32050, "NO_UPGRADE_SCHEDULED"),
            OracleError::UpgradeAlreadyScheduled { .. } => (-32051, "UPGRADE_ALREADY_SCHEDULED"),
            OracleError::TimelockNotElapsed { .. } => (-32052, "TIMELOCK_NOT_ELAPSED"),
            OracleError::NotExecutable(_) => (-32053, "NOT_EXECUTABLE"),
        }
    }

    /// Extra fields worth exposing for some rejections.
    fn oracle_data(err: &OracleError) -> serde_json::Value {
        let mut data = serde_json::json!({"detail": err.to_string()});
        let extra = match err {
            OracleError::CircuitBreakerTriggered {
                previous,
                attempted,
            } => serde_json::json!({
                "previous": previous.to_string(),
                "attempted": attempted.to_string(),
            }),
            OracleError::CumulativeDeviationExceeded {
                anchor,
                attempted,
                deviation_bps,
            } => serde_json::json!({
                "anchor": anchor.to_string(),
                "attempted": attempted.to_string(),
                "deviation_bps": deviation_bps.to_string(),
            }),
            OracleError::ReferenceDeviationExceeded {
                reference,
                attempted,
                deviation_bps,
            } => serde_json::json!({
                "reference": reference.to_string(),
                "attempted": attempted.to_string(),
                "deviation_bps": deviation_bps.to_string(),
            }),
            OracleError::AlreadySubmitted { round, .. } => serde_json::json!({"round": round}),
            OracleError::ValidatorSuspended { violations, .. } => {
                serde_json::json!({"violations": violations})
            }
            OracleError::TimelockNotElapsed { eta, now } => {
                serde_json::json!({"eta": eta, "now": now})
            }
            OracleError::ParameterOutOfBounds { name, value } => {
                serde_json::json!({"name": name, "value": value})
            }
            _ => serde_json::Value::Null,
        };
        if let (Some(data), serde_json::Value::Object(extra)) = (data.as_object_mut(), extra) {
            data.extend(extra);
        }
        data
    }
}

impl From<OracleError> for RpcError {
    fn from(err: OracleError) -> Self {
        let (code, message) = Self::oracle_code(&err);
        Self::new(code, message, Some(Self::oracle_data(&err)))
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn write_json<T: Serialize>(writer: &mut OwnedWriteHalf, value: &T) -> anyhow::Result<()> {
    let mut json = serde_json::to_string(value)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let request = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => request,
            Err(_) => {
                let response = RpcResponse::error(serde_json::Value::Null, RpcError::parse_error());
                write_json(&mut writer, &response).await?;
                continue;
            }
        };

        if request.method == "subscribe_events" {
            let filter = if request.params.is_null() {
                EventFilter::default()
            } else {
                match serde_json::from_value::<EventFilter>(request.params.clone()) {
                    Ok(filter) => filter,
                    Err(e) => {
                        let err = RpcError::invalid_params(&e.to_string());
                        write_json(&mut writer, &RpcResponse::error(request.id, err)).await?;
                        continue;
                    }
                }
            };
            let response = RpcResponse::success(
                request.id,
                serde_json::json!({"sequence": state.event_bus.sequence()}),
            );
            write_json(&mut writer, &response).await?;
            return stream_events(&state, filter, reader, writer).await;
        }

        let response = dispatch_request(state.clone(), request).await;
        write_json(&mut writer, &response).await?;
    }

    Ok(())
}

/// Forward matching events until the client disconnects.
async fn stream_events(
    state: &DaemonState,
    filter: EventFilter,
    mut reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
) -> anyhow::Result<()> {
    let mut events = state.event_bus.subscribe();
    let mut sink = String::new();

    loop {
        tokio::select! {
            read = reader.read_line(&mut sink) => {
                if read? == 0 {
                    return Ok(());
                }
                sink.clear();
            }
            received = events.recv() => match received {
                Ok(event) => {
                    if filter.matches(&event) {
                        let notification = RpcNotification {
                            jsonrpc: "2.0",
                            method: "event",
                            params: &event,
                        };
                        write_json(&mut writer, &notification).await?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagging");
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub(crate) async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();
    let params = &request.params;

    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Registry
        "register_asset" => commands::admin::register_asset(&state, params).await,
        "deregister_asset" => commands::admin::deregister_asset(&state, params).await,
        "list_assets" => commands::query::list_assets(&state, params).await,

        // Submissions
        "submit_price" => commands::submit::submit_price(&state, params).await,
        "submit_price_batch" => commands::submit::submit_price_batch(&state, params).await,

        // Parameters
        "update_parameters" => commands::admin::update_parameters(&state, params).await,
        "set_reference_deviation_threshold" => {
            commands::admin::set_reference_deviation_threshold(&state, params).await
        }
        "set_twap_window" => commands::admin::set_twap_window(&state, params).await,
        "set_outlier_threshold" => commands::admin::set_outlier_threshold(&state, params).await,
        "set_suspension_threshold" => {
            commands::admin::set_suspension_threshold(&state, params).await
        }
        "get_parameters" => commands::query::get_parameters(&state).await,

        // Reference feeds
        "set_reference_feed" => commands::admin::set_reference_feed(&state, params).await,
        "clear_reference_feed" => commands::admin::clear_reference_feed(&state, params).await,
        "set_feed_reading" => commands::admin::set_feed_reading(&state, params).await,

        // Roles
        "add_validator" => commands::admin::add_validator(&state, params).await,
        "remove_validator" => commands::admin::remove_validator(&state, params).await,

        // Pause & upgrades
        "pause" => commands::admin::pause(&state, params).await,
        "unpause" => commands::admin::unpause(&state, params).await,
        "is_paused" => commands::query::is_paused(&state).await,
        "schedule_upgrade" => commands::admin::schedule_upgrade(&state, params).await,
        "cancel_upgrade" => commands::admin::cancel_upgrade(&state, params).await,
        "apply_upgrade" => commands::admin::apply_upgrade(&state, params).await,
        "get_pending_upgrade" => commands::query::get_pending_upgrade(&state).await,
        "get_implementation" => commands::query::get_implementation(&state).await,

        // Queries
        "get_consensus" => commands::query::get_consensus(&state, params).await,
        "is_stale" => commands::query::is_stale(&state, params).await,
        "get_twap" => commands::query::get_twap(&state, params).await,
        "verify_price" => commands::query::verify_price(&state, params).await,
        "get_round" => commands::query::get_round(&state, params).await,
        "violation_count" => commands::query::violation_count(&state, params).await,
        "get_daemon_status" => commands::query::get_daemon_status(&state).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}
