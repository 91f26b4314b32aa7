//! Test helper modules for narrator-player integration tests
//!
//! Provides reusable test doubles:
//! - ScriptedFetcher: StreamFetcher that replays canned chunks
//! - InstrumentedBuffer: MediaBuffer that records commit order and concurrency
//! - ManualPlayhead / TestBackend: Playhead driven by the test

#![allow(dead_code)]

pub mod fetcher;
pub mod media;

pub use fetcher::ScriptedFetcher;
pub use media::{BufferLog, InstrumentedBuffer, PlayheadControl, SessionRecord, TestBackend};

use bytes::Bytes;
use narrator_common::events::EventBus;
use narrator_player::playback::{ControllerSettings, PlaybackController, PlayerView};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound for any single wait in a test
pub const WAIT_LIMIT: Duration = Duration::from_secs(3);

/// Controller settings with a fast media clock
pub fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        position_tick: Duration::from_millis(10),
        ..ControllerSettings::default()
    }
}

/// Spawn a controller wired to test doubles
pub fn spawn_controller(
    fetcher: &ScriptedFetcher,
    backend: &Arc<TestBackend>,
) -> (PlaybackController, Arc<EventBus>) {
    let events = Arc::new(EventBus::new(1024));
    let controller = PlaybackController::spawn(
        fast_settings(),
        Arc::new(fetcher.clone()),
        Arc::clone(backend) as Arc<dyn narrator_player::audio::MediaBackend>,
        Arc::clone(&events),
    );
    (controller, events)
}

/// Chunk of `len` bytes filled with `fill`
pub fn chunk(len: usize, fill: u8) -> Bytes {
    Bytes::from(vec![fill; len])
}

/// `count` chunks of `len` bytes, each filled with its 1-based index
pub fn chunks(count: usize, len: usize) -> Vec<Bytes> {
    (1..=count).map(|i| chunk(len, i as u8)).collect()
}

/// Narration text of exactly `chars` characters
pub fn text_of(chars: usize) -> String {
    "a".repeat(chars)
}

/// Wait until the published view satisfies `pred`
pub async fn wait_for_view<F>(controller: &PlaybackController, pred: F) -> PlayerView
where
    F: Fn(&PlayerView) -> bool,
{
    let mut rx = controller.subscribe();
    let deadline = Instant::now() + WAIT_LIMIT;

    loop {
        {
            let view = rx.borrow_and_update();
            if pred(&view) {
                return view.clone();
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, rx.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => panic!("Controller stopped; last view: {:?}", controller.view()),
            Err(_) => panic!("Timed out waiting for view; last view: {:?}", controller.view()),
        }
    }
}

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("test server address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

/// Wait until `check` holds, polling every few milliseconds
pub async fn wait_until<F>(what: &str, check: F)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + WAIT_LIMIT;
    while !check() {
        if Instant::now() >= deadline {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
