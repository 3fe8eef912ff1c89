//! HTTP server for the web UI on port 80
//!
//! One connection at a time: read the request, route it through
//! [`WebContext`], write the reply and close. The CSV download is streamed
//! from the SD card in small chunks, taking the log lock per chunk so the
//! sink keeps logging during a long download. Without an SD card the
//! download answers 503 and everything else keeps working.

use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use log::{info, warn};

use co2bar_core::storage::{LogStorage, SharedCsvLog, download_size, read_shared_chunk};
use co2bar_core::web::{INDEX_HTML, Reply, Route, WebContext};

const HTTP_PORT: u16 = 80;
const DOWNLOAD_CHUNK: usize = 512;

#[derive(Debug)]
enum SendError {
    Head,
    Socket(embassy_net::tcp::Error),
}

impl From<embassy_net::tcp::Error> for SendError {
    fn from(e: embassy_net::tcp::Error) -> Self {
        Self::Socket(e)
    }
}

async fn send_head(
    socket: &mut TcpSocket<'_>,
    reply: &Reply,
    content_length: usize,
) -> Result<(), SendError> {
    let head = reply.head(content_length).map_err(|_| SendError::Head)?;
    socket.write_all(head.as_bytes()).await?;
    Ok(())
}

async fn send_csv<S: LogStorage>(
    socket: &mut TcpSocket<'_>,
    log: Option<&SharedCsvLog<S>>,
) -> Result<(), SendError> {
    let (Some(log), Some(size)) = (log, download_size(log).await) else {
        return send_head(socket, &Reply::Unavailable, 0).await;
    };

    send_head(socket, &Reply::Csv, size as usize).await?;

    let mut chunk = [0u8; DOWNLOAD_CHUNK];
    let mut offset = 0u32;
    while offset < size {
        let Some(read) = read_shared_chunk(log, offset, &mut chunk).await else {
            // Head already promised `size` bytes; the client sees a short body.
            break;
        };
        if read == 0 {
            break;
        }
        let take = read.min((size - offset) as usize);
        socket.write_all(&chunk[..take]).await?;
        offset += take as u32;
    }
    Ok(())
}

async fn send_reply<S: LogStorage>(
    socket: &mut TcpSocket<'_>,
    reply: Reply,
    log: Option<&SharedCsvLog<S>>,
) -> Result<(), SendError> {
    match &reply {
        Reply::Page => {
            send_head(socket, &reply, INDEX_HTML.len()).await?;
            socket.write_all(INDEX_HTML.as_bytes()).await?;
        }
        Reply::Json(body) => {
            send_head(socket, &reply, body.len()).await?;
            socket.write_all(body).await?;
        }
        Reply::Csv => send_csv(socket, log).await?,
        Reply::Redirect(_) | Reply::Unavailable => send_head(socket, &reply, 0).await?,
    }
    Ok(())
}

/// Serve the web UI forever.
pub async fn serve<S: LogStorage>(stack: Stack<'static>, log: Option<&SharedCsvLog<S>>) -> ! {
    while !stack.is_config_up() {
        Timer::after(Duration::from_millis(100)).await;
    }
    if let Some(config) = stack.config_v4() {
        info!("Web server listening on {}:{}", config.address.address(), HTTP_PORT);
    }

    let context = WebContext::global();
    let mut rx_buffer = [0u8; 1024];
    let mut tx_buffer = [0u8; 4096];

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(10)));

        if let Err(e) = socket.accept(HTTP_PORT).await {
            warn!("Accept error: {:?}", e);
            continue;
        }

        let mut request = [0u8; 512];
        let n = match socket.read(&mut request).await {
            Ok(0) | Err(_) => continue,
            Ok(n) => n,
        };

        let reply = context.handle(Route::parse(&request[..n])).await;
        if let Err(e) = send_reply(&mut socket, reply, log).await {
            warn!("HTTP reply failed: {:?}", e);
        }

        let _ = socket.flush().await;
        socket.close();
        Timer::after(Duration::from_millis(50)).await;
    }
}
