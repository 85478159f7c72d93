//! Binary RPC for weather queries.
//!
//! Each frame is a big-endian `u32` length followed by a bitcode payload: a
//! [`WeatherRequest`] from the client, a [`WeatherResponse`] back. Requests
//! on one connection are answered in order.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use application::{CurrentWeatherRequest, ForecastRequest, WeatherApp};
use bytes::Bytes;
use common::{CurrentWeather, ErrorBody, RequestContext, WeatherForecast};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::accept_loop;
use super::line::INVALID_PARAMS;

pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WeatherRequest {
    GetCurrentWeather {
        city: String,
        lat: f64,
        lon: f64,
    },
    GetForecast {
        city: String,
        lat: f64,
        lon: f64,
        /// Zero or negative selects the default.
        days: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WeatherResponse {
    Current(CurrentWeather),
    Forecast(WeatherForecast),
    Error(ErrorBody),
}

pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

pub async fn dispatch(app: &WeatherApp, ctx: &RequestContext, req: WeatherRequest) -> WeatherResponse {
    let result = match req {
        WeatherRequest::GetCurrentWeather { city, lat, lon } => app
            .get_current_weather(ctx, CurrentWeatherRequest { city, lat, lon })
            .await
            .map(WeatherResponse::Current),
        WeatherRequest::GetForecast {
            city,
            lat,
            lon,
            days,
        } => app
            .get_forecast(
                ctx,
                ForecastRequest {
                    city,
                    lat,
                    lon,
                    days,
                },
            )
            .await
            .map(WeatherResponse::Forecast),
    };

    result.unwrap_or_else(|e| {
        if e.is_client_error() {
            debug!("Weather request rejected: {}", e);
        } else {
            warn!("Weather request failed: {}", e);
        }
        WeatherResponse::Error(e.to_body())
    })
}

fn encode(resp: &WeatherResponse) -> io::Result<Bytes> {
    bitcode::serialize(resp)
        .map(Bytes::from)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Serve frames on one connection until EOF, an I/O error or shutdown.
pub async fn serve_connection<S>(
    stream: S,
    app: WeatherApp,
    request_timeout: Duration,
    shutdown: CancellationToken,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, codec());

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = framed.next() => next,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e),
            None => break,
        };

        let response = match bitcode::deserialize::<WeatherRequest>(&frame) {
            Ok(req) => {
                debug!("binary-rpc {:?}", req);
                let ctx = RequestContext::with_timeout(request_timeout).with_token(&shutdown);
                dispatch(&app, &ctx, req).await
            }
            Err(e) => WeatherResponse::Error(ErrorBody::new(
                INVALID_PARAMS,
                format!("undecodable request frame: {e}"),
            )),
        };

        framed.send(encode(&response)?).await?;
    }

    Ok(())
}

pub async fn serve(
    listener: TcpListener,
    app: WeatherApp,
    request_timeout: Duration,
    shutdown: CancellationToken,
) -> io::Result<()> {
    accept_loop(
        listener,
        "binary-rpc",
        shutdown.clone(),
        move |stream, peer: SocketAddr| {
            let app = app.clone();
            let shutdown = shutdown.clone();
            async move {
                if let Err(e) = serve_connection(stream, app, request_timeout, shutdown).await {
                    warn!("binary-rpc connection {} ended with error: {}", peer, e);
                }
                debug!("binary-rpc connection {} closed", peer);
            }
        },
    )
    .await
}
