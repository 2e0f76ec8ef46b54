#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;

pub const HELLO_JAR: &[u8] = b"Hello, world!\n";
pub const LIB_JAR_SIZE: usize = 64 * 1024;

/// Descriptor with relative jar locations, resolved against its own URL.
pub const APP_JNLP: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<jnlp spec="1.0+">
  <information>
    <title>Hello World</title>
    <vendor>Example Vendor</vendor>
  </information>
  <resources>
    <jar href="lib.jar"/>
    <jar href="hello.jar" main="true"/>
    <property name="app.mode" value="test"/>
  </resources>
  <application-desc main-class="HelloWorld">
    <argument>--greet</argument>
  </application-desc>
</jnlp>
"#;

pub fn lib_jar() -> Vec<u8> {
    (0..LIB_JAR_SIZE).map(|i| (i % 251) as u8).collect()
}

async fn serve_descriptor() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/x-java-jnlp-file")], APP_JNLP)
}

async fn serve_hello() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/java-archive")],
        HELLO_JAR,
    )
}

async fn serve_lib() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/java-archive")],
        lib_jar(),
    )
}

async fn serve_missing() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

/// Announces the full hello jar but drops the connection after a few bytes.
async fn serve_truncated() -> impl IntoResponse {
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(&HELLO_JAR[..5])),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection dropped",
        )),
    ];
    (
        [(header::CONTENT_LENGTH, HELLO_JAR.len().to_string())],
        Body::from_stream(futures::stream::iter(chunks)),
    )
}

/// Never answers within a test's lifetime.
async fn serve_stalled() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(60)).await;
    StatusCode::OK
}

pub async fn start_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/app.jnlp", get(serve_descriptor))
        .route("/hello.jar", get(serve_hello))
        .route("/lib.jar", get(serve_lib))
        .route("/missing.jar", get(serve_missing))
        .route("/stalled.jar", get(serve_stalled))
        .route("/truncated.jar", get(serve_truncated));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

pub fn resource(addr: SocketAddr, name: &str) -> webstart_launcher::ResourceRef {
    webstart_launcher::ResourceRef {
        name: name.to_string(),
        url: format!("http://{}/{}", addr, name).parse().unwrap(),
        primary: false,
    }
}
