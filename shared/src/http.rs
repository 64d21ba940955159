use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::error::Error as StdError;
use std::sync::Arc;
use tokio::net::TcpListener;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Accepts connections on `host:port` and serves each one with a clone of `service`.
///
/// Only returns if binding or accepting fails.
pub async fn run_http_service<S, B>(host: &str, port: u16, service: S) -> std::io::Result<()>
where
    S: Service<Request<Incoming>, Response = Response<B>> + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(host, port, "Listening");
    let service_arc = Arc::new(service);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket
        tokio::spawn(async move {
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                tracing::debug!(%peer_addr, error = %e, "Connection closed with error");
            }
        });
    }
}

/// Builds an empty-bodied response carrying only the canonical reason for `status`.
pub fn make_boxed_error_response<E>(status: StatusCode) -> Response<BoxBody<Bytes, E>>
where
    E: 'static,
{
    let reason = status.canonical_reason().unwrap_or("error");
    let mut response = Response::new(
        Full::new(Bytes::from(format!("{reason}\n")))
            .map_err(|e| match e {})
            .boxed(),
    );
    *response.status_mut() = status;
    response
}
