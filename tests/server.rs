//! Serving over a real socket.

use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use weir::middleware::{boxed, require};
use weir::{App, Error, Method, Request, Route, Server, Service, ServiceError};

fn echo(req: &Request) -> Result<(u16, Bytes), ServiceError> {
    Ok((201, Bytes::copy_from_slice(req.body())))
}

async fn start(max_body_bytes: usize) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<Result<(), Error>>) {
    let service = Service::builder("echo")
        .route(Route::new("/echo").on_with(Method::Post, echo, vec![boxed(require().body())]))
        .build()
        .unwrap();
    let app = App::new().service(service);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        Server::from_listener(listener)
            .max_body_bytes(max_body_bytes)
            .serve_with_shutdown(app, async move {
                let _ = stopped.await;
            })
            .await
    });
    (addr, stop, server)
}

// No idle pooling, so connections close once a response is read and the
// server can finish draining.
fn client() -> Client<HttpConnector, Full<Bytes>> {
    Client::builder(TokioExecutor::new()).pool_max_idle_per_host(0).build_http()
}

fn post(addr: SocketAddr, body: &'static [u8]) -> http::Request<Full<Bytes>> {
    http::Request::post(format!("http://{addr}/echo"))
        .body(Full::new(Bytes::from_static(body)))
        .unwrap()
}

#[tokio::test]
async fn serves_until_shutdown() {
    let (addr, stop, server) = start(1024).await;
    let client = client();

    let res = client.request(post(addr, b"hello")).await.unwrap();
    assert_eq!(res.status(), 201);
    assert_eq!(res.into_body().collect().await.unwrap().to_bytes(), "hello");

    let res = client.request(post(addr, b"")).await.unwrap();
    assert_eq!(res.status(), 400);

    let res = client
        .request(http::Request::get(format!("http://{addr}/missing")).body(Full::default()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    drop(client);
    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (addr, stop, server) = start(4).await;

    let res = client().request(post(addr, b"way too long")).await.unwrap();
    assert_eq!(res.status(), 413);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "request body exceeds 4 bytes");

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
