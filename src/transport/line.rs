//! Line RPC for the service resource.
//!
//! One JSON object per line in each direction:
//!
//! ```text
//! -> {"id":1,"method":"GetService","params":{"id":"..."}}
//! <- {"id":1,"success":true,"data":{...}}
//! <- {"id":1,"success":false,"error":{"code":"NOT_FOUND","message":"..."}}
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use application::{CreateServiceRequest, ServiceApp, UpdateServiceRequest};
use common::{Error, ErrorBody, RequestContext};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::accept_loop;

pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";

// ── Envelope ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    /// Echoed back verbatim; any JSON value.
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl RpcResponse {
    fn ok(id: Value, data: Value) -> Self {
        Self {
            id,
            success: true,
            data: (!data.is_null()).then_some(data),
            error: None,
        }
    }

    fn err(id: Value, error: ErrorBody) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Debug, Deserialize)]
struct NameParams {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    id: String,
    #[serde(default)]
    data: UpdateServiceRequest,
}

// ── Dispatch ──────────────────────────────────────────────────────────

/// Missing params decode as an empty object.
fn parse_params<T: DeserializeOwned>(raw: Value) -> Result<T, ErrorBody> {
    let raw = if raw.is_null() {
        Value::Object(Default::default())
    } else {
        raw
    };
    serde_json::from_value(raw)
        .map_err(|e| ErrorBody::new(INVALID_PARAMS, format!("invalid params: {e}")))
}

fn reply<T: Serialize>(result: common::Result<T>) -> Result<Value, ErrorBody> {
    let value = result.map_err(|e| e.to_body())?;
    serde_json::to_value(value).map_err(|e| Error::from(e).to_body())
}

async fn handle(
    app: &ServiceApp,
    ctx: &RequestContext,
    method: &str,
    raw: Value,
) -> Result<Value, ErrorBody> {
    match method {
        "GetService" => {
            let p: IdParams = parse_params(raw)?;
            reply(app.get_service(ctx, &p.id).await)
        }
        "GetAllServices" => reply(app.get_all_services(ctx).await),
        "GetServiceByName" => {
            let p: NameParams = parse_params(raw)?;
            reply(app.get_service_by_name(ctx, &p.name).await)
        }
        "CreateService" => {
            let p: CreateServiceRequest = parse_params(raw)?;
            reply(app.create_service(ctx, p).await)
        }
        "UpdateService" => {
            let p: UpdateParams = parse_params(raw)?;
            reply(app.update_service(ctx, &p.id, p.data).await)
        }
        "DeleteService" => {
            let p: IdParams = parse_params(raw)?;
            reply(app.delete_service(ctx, &p.id).await)
        }
        other => Err(ErrorBody::new(
            UNKNOWN_METHOD,
            format!("unknown method: {other}"),
        )),
    }
}

/// Errors the client caused are logged at debug only.
fn is_caller_fault(error: &ErrorBody) -> bool {
    error.is_client_error() || error.code == INVALID_PARAMS || error.code == UNKNOWN_METHOD
}

pub async fn dispatch(app: &ServiceApp, ctx: &RequestContext, req: RpcRequest) -> RpcResponse {
    let RpcRequest { id, method, params } = req;

    match handle(app, ctx, &method, params).await {
        Ok(data) => RpcResponse::ok(id, data),
        Err(error) => {
            if is_caller_fault(&error) {
                debug!("{} rejected: {} ({})", method, error.message, error.code);
            } else {
                warn!("{} failed: {} ({})", method, error.message, error.code);
            }
            RpcResponse::err(id, error)
        }
    }
}

fn encode(resp: &RpcResponse) -> String {
    serde_json::to_string(resp).unwrap_or_else(|e| {
        warn!("Failed to encode response: {}", e);
        r#"{"id":null,"success":false,"error":{"code":"INTERNAL","message":"failed to encode response"}}"#
            .to_string()
    })
}

// ── Connection handling ───────────────────────────────────────────────

/// Serve requests on one connection until EOF, an I/O error or shutdown.
pub async fn serve_connection<S>(
    stream: S,
    app: ServiceApp,
    request_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<(), LinesCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = framed.next() => next,
        };

        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                let body = ErrorBody::new(INVALID_PARAMS, "request line too long");
                framed.send(encode(&RpcResponse::err(Value::Null, body))).await?;
                continue;
            }
            Some(Err(e)) => return Err(e),
            None => break,
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(req) => {
                debug!("line-rpc {}", req.method);
                let ctx = RequestContext::with_timeout(request_timeout).with_token(&shutdown);
                dispatch(&app, &ctx, req).await
            }
            Err(e) => RpcResponse::err(
                Value::Null,
                ErrorBody::new(INVALID_PARAMS, format!("malformed request: {e}")),
            ),
        };

        framed.send(encode(&response)).await?;
    }

    Ok(())
}

pub async fn serve(
    listener: TcpListener,
    app: ServiceApp,
    request_timeout: Duration,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    accept_loop(
        listener,
        "line-rpc",
        shutdown.clone(),
        move |stream, peer: SocketAddr| {
            let app = app.clone();
            let shutdown = shutdown.clone();
            async move {
                if let Err(e) = serve_connection(stream, app, request_timeout, shutdown).await {
                    warn!("line-rpc connection {} ended with error: {}", peer, e);
                }
                debug!("line-rpc connection {} closed", peer);
            }
        },
    )
    .await
}
