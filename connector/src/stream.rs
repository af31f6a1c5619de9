use std::future::Future;
use std::time::Duration;

use common::Bar;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::datafeed::BarCallback;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Text frames pumped out of one transport connection. An `Err` item is a
/// transport fault; the channel closing means the peer closed.
pub(crate) type FrameReceiver = mpsc::Receiver<Result<String, StreamError>>;

/// Owner handle for one per-key subscription task. Dropping the registry
/// entry without calling [`StreamHandle::stop`] leaves the task running, so
/// the registry always stops the old handle before inserting a new one.
pub(crate) struct StreamHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Spawn the connect/read/throttle/reconnect cycle for one key. The
    /// connect function is injected so offline tests can script the
    /// transport.
    pub(crate) fn spawn<C, Fut>(
        key: String,
        connect: C,
        throttle: Duration,
        reconnect_delay: Duration,
        callback: BarCallback,
    ) -> Self
    where
        C: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FrameReceiver, StreamError>> + Send + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_stream(
            key,
            connect,
            throttle,
            reconnect_delay,
            callback,
            shutdown_rx,
        ));
        Self { shutdown, task }
    }

    /// Signal the task and wait for it to wind down. Every timer the task
    /// holds dies with it, so nothing fires after this returns.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn run_stream<C, Fut>(
    key: String,
    connect: C,
    throttle: Duration,
    reconnect_delay: Duration,
    callback: BarCallback,
    mut shutdown: watch::Receiver<bool>,
) where
    C: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FrameReceiver, StreamError>> + Send + 'static,
{
    loop {
        match connect().await {
            Ok(mut frames) => {
                debug!(key, "kline stream connected");
                if read_frames(&key, &mut frames, throttle, &callback, &mut shutdown).await {
                    return;
                }
            }
            Err(err) => warn!(?err, key, "failed to connect kline stream"),
        }
        // Reconnect-wait state, left early only by unsubscribe/replace.
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            _ = sleep(reconnect_delay) => {}
        }
    }
}

/// Read one connection until it closes. Returns true when shutdown was
/// requested, false when the connection ended and a reconnect should follow.
///
/// Throttle contract: each parsed kline overwrites the single pending bar;
/// the first one in a window arms the flush timer, and the timer delivers
/// whatever is pending when it fires. Bursts collapse to their latest value.
async fn read_frames(
    key: &str,
    frames: &mut FrameReceiver,
    throttle: Duration,
    callback: &BarCallback,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let mut pending: Option<Bar> = None;
    let mut flush_at: Option<Instant> = None;
    loop {
        let deadline = flush_at.unwrap_or_else(Instant::now);
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
            frame = frames.recv() => match frame {
                Some(Ok(payload)) => {
                    if let Some(bar) = parse_stream_bar(&payload) {
                        pending = Some(bar);
                        if flush_at.is_none() {
                            flush_at = Some(Instant::now() + throttle);
                        }
                    }
                }
                Some(Err(err)) => {
                    // Transport faults funnel into the close path so the
                    // reconnect is scheduled in exactly one place.
                    warn!(?err, key, "kline stream error");
                    return false;
                }
                None => {
                    debug!(key, "kline stream closed");
                    return false;
                }
            },
            _ = sleep_until(deadline), if flush_at.is_some() => {
                if let Some(bar) = pending.take() {
                    callback(bar);
                }
                flush_at = None;
            }
        }
    }
}

/// Open a Binance kline websocket and pump its frames into a channel. The
/// pump answers pings and exits when the reader side is dropped, which
/// closes the socket.
pub(crate) async fn connect_binance_stream(url: String) -> Result<FrameReceiver, StreamError> {
    let (ws, _) = connect_async(&url).await?;
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let (mut write, mut read) = ws.split();
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(payload)) => {
                    if tx.send(Ok(payload)).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Binary(bin)) => {
                    if let Ok(payload) = String::from_utf8(bin) {
                        if tx.send(Ok(payload)).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Ping(frame)) => {
                    let _ = write.send(Message::Pong(frame)).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    let _ = tx.send(Err(StreamError::Ws(err))).await;
                    break;
                }
            }
        }
    });
    Ok(rx)
}

#[derive(Debug, Deserialize)]
struct KlineEnvelope {
    #[serde(rename = "e")]
    event: String,
    #[serde(rename = "k")]
    kline: Option<KlineEvent>,
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "q")]
    turnover: Option<String>,
}

fn parse_stream_bar(payload: &str) -> Option<Bar> {
    let envelope: KlineEnvelope = match serde_json::from_str::<KlineEnvelope>(payload) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(?err, "unparseable stream payload");
            return None;
        }
    };
    if envelope.event != "kline" {
        return None;
    }
    let kline = envelope.kline?;
    Some(Bar {
        timestamp: kline.open_time,
        open: kline.open.parse().ok()?,
        high: kline.high.parse().ok()?,
        low: kline.low.parse().ok()?,
        close: kline.close.parse().ok()?,
        volume: kline.volume.parse().ok()?,
        turnover: kline.turnover.and_then(|q| q.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const THROTTLE: Duration = Duration::from_millis(500);
    const RECONNECT: Duration = Duration::from_millis(3_000);

    fn kline_payload(ts: i64, close: f64) -> String {
        format!(
            r#"{{"e":"kline","E":1,"s":"BTCUSDT","k":{{"t":{ts},"o":"{close}","h":"{close}","l":"{close}","c":"{close}","v":"1.0","q":"10.0"}}}}"#
        )
    }

    fn recording_callback() -> (BarCallback, Arc<Mutex<Vec<Bar>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let callback: BarCallback = Arc::new(move |bar| sink.lock().unwrap().push(bar));
        (callback, received)
    }

    /// Connector handing out pre-scripted connections in order; once the
    /// script runs out, further connect attempts hang forever.
    fn scripted_connector(
        connections: Vec<FrameReceiver>,
        attempts: Arc<AtomicUsize>,
    ) -> impl Fn() -> std::pin::Pin<
        Box<dyn Future<Output = Result<FrameReceiver, StreamError>> + Send>,
    > + Send
           + Sync
           + 'static {
        let queue = Arc::new(Mutex::new(VecDeque::from(connections)));
        move || {
            let queue = queue.clone();
            let attempts = attempts.clone();
            Box::pin(async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                let next = queue.lock().unwrap().pop_front();
                match next {
                    Some(rx) => Ok(rx),
                    None => futures_util::future::pending().await,
                }
            })
        }
    }

    #[test]
    fn stream_payload_parses_to_bar() {
        let bar = parse_stream_bar(&kline_payload(1_700_000_000_000, 42_000.5)).unwrap();
        assert_eq!(bar.timestamp, 1_700_000_000_000);
        assert_eq!(bar.close, 42_000.5);
        assert_eq!(bar.turnover, Some(10.0));
        assert!(parse_stream_bar(r#"{"e":"trade"}"#).is_none());
        assert!(parse_stream_bar("not json").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_in_one_window_collapses_to_latest() {
        let (tx, rx) = mpsc::channel(16);
        let attempts = Arc::new(AtomicUsize::new(0));
        let (callback, received) = recording_callback();
        let handle = StreamHandle::spawn(
            "BTCUSDT_1m".into(),
            scripted_connector(vec![rx], attempts),
            THROTTLE,
            RECONNECT,
            callback,
        );

        for close in [1.0, 2.0, 3.0] {
            tx.send(Ok(kline_payload(0, close))).await.unwrap();
        }
        // let the task ingest the burst, then cross the flush deadline
        sleep(Duration::from_millis(1)).await;
        sleep(Duration::from_millis(600)).await;

        {
            let bars = received.lock().unwrap();
            assert_eq!(bars.len(), 1);
            assert_eq!(bars[0].close, 3.0);
        }

        // a later burst opens a fresh window and delivers again
        tx.send(Ok(kline_payload(0, 4.0))).await.unwrap();
        sleep(Duration::from_millis(1)).await;
        sleep(Duration::from_millis(600)).await;
        {
            let bars = received.lock().unwrap();
            assert_eq!(bars.len(), 2);
            assert_eq!(bars[1].close, 4.0);
        }

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_close_schedules_one_reconnect() {
        let (tx1, rx1) = mpsc::channel(16);
        let (tx2, rx2) = mpsc::channel::<Result<String, StreamError>>(16);
        let attempts = Arc::new(AtomicUsize::new(0));
        let (callback, received) = recording_callback();
        let handle = StreamHandle::spawn(
            "BTCUSDT_1m".into(),
            scripted_connector(vec![rx1, rx2], attempts.clone()),
            THROTTLE,
            RECONNECT,
            callback,
        );

        sleep(Duration::from_millis(1)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        drop(tx1); // peer closes unexpectedly
        sleep(Duration::from_millis(1)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1); // still in reconnect wait

        sleep(Duration::from_millis(3_100)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        // second connection is live again
        tx2.send(Ok(kline_payload(0, 5.0))).await.unwrap();
        sleep(Duration::from_millis(1)).await;
        sleep(Duration::from_millis(600)).await;
        assert_eq!(received.lock().unwrap().len(), 1);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_during_reconnect_wait_cancels_reconnect() {
        let (tx1, rx1) = mpsc::channel(16);
        let attempts = Arc::new(AtomicUsize::new(0));
        let (callback, _received) = recording_callback();
        let handle = StreamHandle::spawn(
            "BTCUSDT_1m".into(),
            scripted_connector(vec![rx1], attempts.clone()),
            THROTTLE,
            RECONNECT,
            callback,
        );

        sleep(Duration::from_millis(1)).await;
        drop(tx1);
        sleep(Duration::from_millis(1)).await; // task is now in reconnect wait

        handle.stop().await;
        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_open_stream_ends_task() {
        let (tx, rx) = mpsc::channel(16);
        let attempts = Arc::new(AtomicUsize::new(0));
        let (callback, received) = recording_callback();
        let handle = StreamHandle::spawn(
            "BTCUSDT_1m".into(),
            scripted_connector(vec![rx], attempts),
            THROTTLE,
            RECONNECT,
            callback,
        );

        tx.send(Ok(kline_payload(0, 1.0))).await.unwrap();
        sleep(Duration::from_millis(1)).await;
        handle.stop().await;

        // pending bar and its armed flush timer died with the task
        sleep(Duration::from_millis(2_000)).await;
        assert!(received.lock().unwrap().is_empty());
    }
}
