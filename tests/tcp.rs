use postmark::client::transport::tcp::TcpTransportConfig;
use postmark::Client;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpListener;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

async fn serve_one(listener: TcpListener, response: &'static [u8]) -> Result<Vec<u8>, BoxError> {
    let (mut stream, _) = listener.accept().await?;

    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
    }

    stream.write_all(response).await?;
    stream.shutdown().await?;
    Ok(request)
}

#[tokio::test]
async fn get_over_tcp() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let server = tokio::spawn(serve_one(
        listener,
        b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"ok\": true}\n",
    ));

    let client = Client::builder()
        .with_tcp_config(TcpTransportConfig::default())
        .build()?;
    let response = client
        .get(format!("http://127.0.0.1:{port}/status").parse()?)
        .await?;

    assert!(response.is_success());
    let body = response.into_body().ok_or("missing body")?;
    assert_eq!(body.content_type().charset(), Some("UTF-8"));
    assert_eq!(body.text().await?, "{\"ok\": true}\n");

    let request = server.await??;
    assert_eq!(
        request,
        format!("GET /status HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n\r\n").into_bytes()
    );

    Ok(())
}

#[tokio::test]
async fn small_packets_over_tcp() -> Result<(), BoxError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let server = tokio::spawn(serve_one(
        listener,
        b"HTTP/1.0 200 OK\r\nX-Padding: aaaaaaaaaaaaaaaaaaaa\r\n\r\nread until the server closes",
    ));

    let client = Client::builder().packet_size(3).build()?;
    let response = client.get(format!("http://127.0.0.1:{port}/").parse()?).await?;

    assert_eq!(response.headers().get("x-padding")?, Some("aaaaaaaaaaaaaaaaaaaa"));
    let body = response.into_body().ok_or("missing body")?;
    assert_eq!(body.content_length(), None);
    assert_eq!(body.bytes().await?, "read until the server closes");

    server.await??;
    Ok(())
}

#[tokio::test]
async fn refused_connection() -> Result<(), BoxError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let client = Client::new()?;
    let result = client.get(format!("http://127.0.0.1:{port}/").parse()?).await;
    assert!(matches!(result, Err(postmark::Error::Connect(_))));

    Ok(())
}
