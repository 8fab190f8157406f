use crate::{
    QueryError,
    QueryService,
    metrics,
};

use core::convert::Infallible;
use std::{
    collections::HashMap,
    net::SocketAddr,
    time::{
        Duration,
        Instant,
    },
};

use http_body_util::Full;
use hyper::{
    Method,
    Request,
    Response,
    StatusCode,
    body::Bytes,
    header::{
        CONTENT_TYPE,
        HeaderValue,
    },
};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::{
    TcpListener,
    TcpStream,
};
use tokio_util::sync::CancellationToken;

const READINESS_TIMEOUT: Duration = Duration::from_secs(1);

/// Paths answered by the server.
pub const ROUTES: &[&str] = &[
    "/",
    "/health",
    "/ready",
    "/v1/blocks",
    "/v1/events",
    "/v1/block",
    "/v1/tx",
];

/// Accept connections on `listener` until `cancel_token` fires.
///
/// Every connection is served on its own task. Connections already accepted
/// are not interrupted by cancellation.
pub async fn serve(
    listener: TcpListener,
    service: QueryService,
    cancel_token: CancellationToken,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "query API listening");
    }

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                tracing::info!("Api received cancellation signal, shutting down...");
                break;
            }
            res = listener.accept() => {
                match res {
                    Ok((stream, socketaddr)) => {
                        serve_connection(socketaddr, service.clone(), stream);
                    }
                    Err(err) => {
                        tracing::error!(?err, "Error accepting connection");
                    }
                }
            }
        }
    }

    Ok(())
}

fn serve_connection(socketaddr: SocketAddr, service: QueryService, stream: TcpStream) {
    tracing::debug!(%socketaddr, "accepted connection");
    let io = TokioIo::new(stream);

    tokio::task::spawn(async move {
        if let Err(err) = hyper::server::conn::http1::Builder::new()
            .serve_connection(
                io,
                hyper::service::service_fn(move |req| {
                    let service = service.clone();
                    async move { accept_request(req, &service).await }
                }),
            )
            .await
        {
            tracing::debug!(?err, %socketaddr, "Error serving connection");
        }
    });
}

/// Route one request and record its outcome.
#[tracing::instrument(level = "debug", skip_all, fields(path = %req.uri().path()))]
pub(crate) async fn accept_request<B>(
    req: Request<B>,
    service: &QueryService,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let path = req.uri().path().to_owned();
    let method = req.method().clone();
    let params = query_params(&req);
    let endpoint = ROUTES
        .iter()
        .copied()
        .find(|route| *route == path)
        .unwrap_or("unknown");

    let response = if endpoint == "unknown" {
        error_response(StatusCode::NOT_FOUND, format!("no route for {path}"))
    } else if method != Method::GET {
        error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{method} is not allowed on {endpoint}"),
        )
    } else {
        route(endpoint, &params, service).await
    };

    metrics::record_request(endpoint, response.status().as_u16(), started.elapsed());
    Ok(response)
}

async fn route(
    endpoint: &'static str,
    params: &HashMap<String, String>,
    service: &QueryService,
) -> Response<Full<Bytes>> {
    match endpoint {
        "/" => json_response(StatusCode::OK, &serde_json::json!({ "routes": ROUTES })),
        "/health" => text_response(StatusCode::OK, "ok"),
        "/ready" => {
            let ready = matches!(
                tokio::time::timeout(READINESS_TIMEOUT, service.ping()).await,
                Ok(Ok(()))
            );
            if ready {
                text_response(StatusCode::OK, "ready")
            } else {
                text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready")
            }
        }
        "/v1/blocks" => respond(service.list_blocks().await),
        "/v1/events" => respond(service.events_by_address(param(params, "address")).await),
        "/v1/block" => respond(service.block_by_number(param(params, "block_number")).await),
        "/v1/tx" => respond(service.transaction_by_hash(param(params, "tx_hash")).await),
        other => error_response(StatusCode::NOT_FOUND, format!("no route for {other}")),
    }
}

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str)
}

fn query_params<B>(req: &Request<B>) -> HashMap<String, String> {
    req.uri()
        .query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

fn respond<T: Serialize>(result: Result<T, QueryError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => json_response(StatusCode::OK, &value),
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                tracing::error!(error = ?err, "query failed");
            } else {
                tracing::debug!(error = %err, "rejected query");
            }
            error_response(status, err.public_message())
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => build(status, "application/json", body),
        Err(err) => {
            tracing::error!(?err, "failed to serialize response");
            build(
                StatusCode::INTERNAL_SERVER_ERROR,
                "application/json",
                br#"{"error":"failed to serialize response"}"#.to_vec(),
            )
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    build(status, "text/plain", body.as_bytes().to_vec())
}

fn build(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::network::TransactionResponse;
    use serde_json::Value;
    use std::sync::Arc;
    use window_core::{
        test_utils::{
            log,
            record,
            transaction,
        },
        types::{
            Address,
            B256,
        },
    };
    use window_store::{
        IndexedStore,
        MemoryStore,
    };

    struct TestServer {
        url: String,
        tx_hash: B256,
        cancel_token: CancellationToken,
        handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    }

    async fn start() -> TestServer {
        let store = IndexedStore::new(Arc::new(MemoryStore::new()));
        let tx = transaction(1);
        let tx_hash = tx.tx_hash();
        store
            .put_record(
                &record(
                    7,
                    vec![(tx, vec![log(Address::repeat_byte(0xab), 7, tx_hash, 0)])],
                ),
                Duration::from_secs(650),
            )
            .await
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(serve(
            listener,
            QueryService::new(store),
            cancel_token.clone(),
        ));

        TestServer {
            url: format!("http://{addr}"),
            tx_hash,
            cancel_token,
            handle,
        }
    }

    async fn get(url: &str) -> (u16, String) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }

    #[tokio::test]
    async fn health_and_readiness_answer() {
        let server = start().await;
        assert_eq!(get(&format!("{}/health", server.url)).await, (200, "ok".to_owned()));
        assert_eq!(get(&format!("{}/ready", server.url)).await, (200, "ready".to_owned()));

        let (status, body) = get(&format!("{}/", server.url)).await;
        assert_eq!(status, 200);
        let routes: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(routes["routes"].as_array().unwrap().len(), ROUTES.len());
    }

    #[tokio::test]
    async fn lookups_resolve_indexed_entities() {
        let server = start().await;

        let (status, body) = get(&format!("{}/v1/blocks", server.url)).await;
        assert_eq!(status, 200);
        assert_eq!(serde_json::from_str::<Vec<u64>>(&body).unwrap(), vec![7]);

        let (status, body) = get(&format!("{}/v1/block?block_number=7", server.url)).await;
        assert_eq!(status, 200);
        let block: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(block["body"][0], format!("{:#x}", server.tx_hash));

        let (status, body) = get(&format!(
            "{}/v1/events?address={}",
            server.url,
            "0xABABABABABABABABABABABABABABABABABABABAB"
        ))
        .await;
        assert_eq!(status, 200);
        assert_eq!(serde_json::from_str::<Vec<Value>>(&body).unwrap().len(), 1);

        let (status, _) = get(&format!("{}/v1/tx?tx_hash={:#x}", server.url, server.tx_hash)).await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn errors_carry_status_and_message() {
        let server = start().await;

        let (status, body) = get(&format!("{}/v1/events", server.url)).await;
        assert_eq!(status, 400);
        let error: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(error["error"], "missing required parameter 'address'");

        let (status, _) = get(&format!(
            "{}/v1/tx?tx_hash={:#x}",
            server.url,
            B256::repeat_byte(0x77)
        ))
        .await;
        assert_eq!(status, 404);

        let (status, _) = get(&format!("{}/v1/block?block_number=-1", server.url)).await;
        assert_eq!(status, 400);

        let (status, _) = get(&format!("{}/v2/blocks", server.url)).await;
        assert_eq!(status, 404);

        let response = reqwest::Client::new()
            .post(format!("{}/v1/blocks", server.url))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 405);
    }

    #[tokio::test]
    async fn cancellation_stops_the_accept_loop() {
        let server = start().await;
        server.cancel_token.cancel();
        server.handle.await.unwrap().unwrap();
    }
}
