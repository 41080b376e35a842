use anyhow::{anyhow, Context};
use futures::{FutureExt, TryStreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::transport::Transport;
use crate::hub::{Message, MessageHandler};

/// Prefix of every payload-bearing line in the event stream
pub const FRAME_MARKER: &str = "data:";

/// Why a single stream connection ended
#[derive(Debug)]
pub enum StreamEnd {
    Cancelled,
    /// The backend closed the connection cleanly
    Closed,
    Failed(anyhow::Error),
}

/// Extract and decode the frame carried by one line, if any.
pub fn parse_frame(line: &str) -> Option<Result<Message, serde_json::Error>> {
    let frame = line.strip_prefix(FRAME_MARKER)?.trim();
    if frame.is_empty() {
        return None;
    }
    Some(serde_json::from_str(frame))
}

/// Reads one event-stream connection at a time
#[derive(Debug, Clone)]
pub struct FrameReader {
    transport: Transport,
}

impl FrameReader {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Open the stream. Fails on connect errors and non-success statuses.
    pub async fn open(&self, cancel: &CancellationToken) -> Result<reqwest::Response, StreamEnd> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamEnd::Cancelled),
            result = self.transport.stream_request().send() => result
                .context("Failed to open event stream")
                .map_err(StreamEnd::Failed)?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(StreamEnd::Failed(anyhow!(
                "Event stream responded with {}",
                status
            )));
        }
        Ok(response)
    }

    /// Scan an open stream line by line, handing each decoded frame to
    /// `handler` in wire order until the stream ends or `cancel` fires.
    pub async fn read(
        &self,
        response: reqwest::Response,
        cancel: &CancellationToken,
        handler: &dyn MessageHandler,
    ) -> StreamEnd {
        let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        // Raw segments rather than `lines()`: a stray non-UTF-8 byte must not
        // end the connection.
        let mut segments = StreamReader::new(body).split(b'\n');

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Event stream cancelled");
                    return StreamEnd::Cancelled;
                }
                next = segments.next_segment() => next,
            };

            let raw = match next {
                Ok(Some(raw)) => raw,
                Ok(None) => return StreamEnd::Closed,
                Err(e) => {
                    return StreamEnd::Failed(anyhow::Error::new(e).context("Event stream read failed"))
                }
            };
            let line = String::from_utf8_lossy(raw.strip_suffix(b"\r").unwrap_or(&raw[..]));

            let message = match parse_frame(&line) {
                None => continue,
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    error!("Failed to decode event frame {:?}: {}", line, e);
                    continue;
                }
            };

            if cancel.is_cancelled() {
                return StreamEnd::Cancelled;
            }
            deliver(handler, message).await;
        }
    }

    /// One full connection: open, then read until it ends.
    pub async fn listen_once(
        &self,
        cancel: &CancellationToken,
        handler: &dyn MessageHandler,
    ) -> StreamEnd {
        match self.open(cancel).await {
            Ok(response) => self.read(response, cancel, handler).await,
            Err(end) => end,
        }
    }
}

/// Run the handler behind a panic boundary so one bad message cannot end
/// the stream. A panic counts as "not handled".
async fn deliver(handler: &dyn MessageHandler, message: Message) -> bool {
    match AssertUnwindSafe(handler.handle(&message)).catch_unwind().await {
        Ok(handled) => {
            if !handled {
                debug!("Message {} not handled", message.msg_id);
            }
            handled
        }
        Err(panic) => {
            error!(
                "Handler panicked on message {}: {}",
                message.msg_id,
                panic_message(panic.as_ref())
            );
            false
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Keep a stream connection up until `cancel` fires.
///
/// `alive` is false between attempts and true while a connection is open.
/// Every non-cancelled end is followed by a fixed `retry_delay` wait.
pub async fn supervise(
    reader: &FrameReader,
    alive: &AtomicBool,
    retry_delay: Duration,
    cancel: &CancellationToken,
    handler: &dyn MessageHandler,
) {
    while !cancel.is_cancelled() {
        alive.store(false, Ordering::Relaxed);
        info!("Connecting to event stream");

        let end = match reader.open(cancel).await {
            Ok(response) => {
                alive.store(true, Ordering::Relaxed);
                info!("Event stream connected");
                let end = reader.read(response, cancel, handler).await;
                alive.store(false, Ordering::Relaxed);
                end
            }
            Err(end) => end,
        };

        match end {
            StreamEnd::Cancelled => break,
            StreamEnd::Closed => warn!(
                "Event stream closed by the assistant, reconnecting in {:?}",
                retry_delay
            ),
            StreamEnd::Failed(e) => error!(
                "Event stream failed: {:#}, reconnecting in {:?}",
                e, retry_delay
            ),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(retry_delay) => {}
        }
    }

    alive.store(false, Ordering::Relaxed);
    info!("Event stream listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        cancel_on_stop: Option<CancellationToken>,
        alive: Option<Arc<AtomicBool>>,
        alive_seen: Mutex<Vec<bool>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, message: &Message) -> bool {
            self.seen.lock().unwrap().push(message.content.clone());
            if let Some(alive) = &self.alive {
                self.alive_seen
                    .lock()
                    .unwrap()
                    .push(alive.load(Ordering::Relaxed));
            }
            match message.content.as_str() {
                "boom" => panic!("handler exploded"),
                "stop" => {
                    if let Some(cancel) = &self.cancel_on_stop {
                        cancel.cancel();
                    }
                    true
                }
                _ => true,
            }
        }
    }

    fn reader(server: &mockito::Server) -> FrameReader {
        FrameReader::new(Transport::new(server.url(), None, Duration::from_secs(5)).unwrap())
    }

    fn frame(id: &str, content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"msgID": id, "content": content, "event": ""})
        )
    }

    #[test]
    fn test_parse_frame_ignores_lines_without_marker() {
        assert!(parse_frame("").is_none());
        assert!(parse_frame("event: message").is_none());
        assert!(parse_frame(": keep-alive").is_none());
        assert!(parse_frame("id: 12").is_none());
        assert!(parse_frame(r#"{"msgID":"1","content":"no marker"}"#).is_none());
        assert!(parse_frame("data:").is_none());
        assert!(parse_frame("data:   \r").is_none());
    }

    #[test]
    fn test_parse_frame_decodes_payload() {
        let message = parse_frame(r##"data:{"msgID":"m-1","content":"#echo hi"}"##)
            .unwrap()
            .unwrap();
        assert_eq!(message.msg_id, "m-1");
        assert_eq!(message.content, "#echo hi");

        assert!(parse_frame("data: {broken").unwrap().is_err());
    }

    #[tokio::test]
    async fn test_read_skips_bad_frames_and_survives_panics() {
        let body = [
            "event: message\n".to_string(),
            frame("1", "first"),
            "\n".to_string(),
            "data: {broken json\n".to_string(),
            frame("2", "boom"),
            ": comment\n".to_string(),
            frame("3", "last"),
        ]
        .concat();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sse")
            .match_header("accept", "text/event-stream")
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let recorder = Recorder::default();
        let end = reader(&server)
            .listen_once(&CancellationToken::new(), &recorder)
            .await;

        assert!(matches!(end, StreamEnd::Closed));
        assert_eq!(recorder.seen(), vec!["first", "boom", "last"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_stream() {
        let mut body = frame("1", "first").into_bytes();
        body.extend_from_slice(b": \xff\n");
        body.extend_from_slice(b"data: {\"msgID\":\"2\",\"content\":\"caf\xff\"}\r\n");
        body.extend_from_slice(frame("3", "after").as_bytes());

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sse")
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let recorder = Recorder::default();
        let end = reader(&server)
            .listen_once(&CancellationToken::new(), &recorder)
            .await;

        assert!(matches!(end, StreamEnd::Closed));
        assert_eq!(recorder.seen(), vec!["first", "caf\u{fffd}", "after"]);
    }

    #[tokio::test]
    async fn test_cancellation_stops_delivery() {
        let body = [frame("1", "stop"), frame("2", "after")].concat();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sse")
            .with_body(body)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let recorder = Recorder {
            cancel_on_stop: Some(cancel.clone()),
            ..Default::default()
        };
        let end = reader(&server).listen_once(&cancel, &recorder).await;

        assert!(matches!(end, StreamEnd::Cancelled));
        assert_eq!(recorder.seen(), vec!["stop"]);
    }

    #[tokio::test]
    async fn test_open_failure_skips_read_loop() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sse")
            .with_status(503)
            .with_body(frame("1", "never"))
            .create_async()
            .await;

        let recorder = Recorder::default();
        let end = reader(&server)
            .listen_once(&CancellationToken::new(), &recorder)
            .await;

        match end {
            StreamEnd::Failed(e) => assert!(e.to_string().contains("503")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(recorder.seen().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_open() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sse")
            .expect(0)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let end = reader(&server)
            .listen_once(&cancel, &Recorder::default())
            .await;

        assert!(matches!(end, StreamEnd::Cancelled));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_supervisor_retries_until_cancelled() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sse")
            .with_status(500)
            .expect_at_least(2)
            .create_async()
            .await;

        let reader = reader(&server);
        let alive = AtomicBool::new(true);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            supervise(
                &reader,
                &alive,
                Duration::from_millis(20),
                &cancel,
                &Recorder::default(),
            ),
        )
        .await
        .expect("supervisor did not stop after cancellation");

        assert!(!alive.load(Ordering::Relaxed));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_supervisor_marks_alive_while_connected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sse")
            .with_body(frame("1", "stop"))
            .create_async()
            .await;

        let alive = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let recorder = Recorder {
            cancel_on_stop: Some(cancel.clone()),
            alive: Some(alive.clone()),
            ..Default::default()
        };

        tokio::time::timeout(
            Duration::from_secs(5),
            supervise(
                &reader(&server),
                &alive,
                Duration::from_secs(60),
                &cancel,
                &recorder,
            ),
        )
        .await
        .expect("supervisor did not stop after cancellation");

        assert_eq!(*recorder.alive_seen.lock().unwrap(), vec![true]);
        assert!(!alive.load(Ordering::Relaxed));
    }

    /// Serves one frame over a chunked response, then keeps the socket open
    /// without sending anything else.
    async fn idle_stream_server() -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let chunk = frame("1", "hello");
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
                chunk.len(),
                chunk
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_cancel_while_stream_is_idle() {
        let addr = idle_stream_server().await;
        let reader = FrameReader::new(
            Transport::new(format!("http://{}", addr), None, Duration::from_secs(5)).unwrap(),
        );
        let alive = AtomicBool::new(false);
        let cancel = CancellationToken::new();
        let recorder = Recorder::default();

        let supervisor = supervise(&reader, &alive, Duration::from_secs(60), &cancel, &recorder);
        tokio::pin!(supervisor);

        tokio::time::timeout(Duration::from_secs(5), async {
            while recorder.seen().is_empty() {
                tokio::select! {
                    _ = &mut supervisor => panic!("supervisor stopped before cancellation"),
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                }
            }
        })
        .await
        .expect("first frame was never delivered");
        assert!(alive.load(Ordering::Relaxed));

        // The reader is now parked on a connection with nothing to read
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), supervisor)
            .await
            .expect("supervisor did not stop after cancellation");

        assert_eq!(recorder.seen(), vec!["hello"]);
        assert!(!alive.load(Ordering::Relaxed));
    }
}
