//! Player base: wires the playlist loader to per-rendition download
//! sessions, feeds the video and audio render drivers from a shared
//! presentation clock and performs stall-driven resolution downshifts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lanterna_hls::{
    DownloadSession, MasterPlaylist, MediaType, Playlist, PlaylistLoader, SegmentReady,
    SessionOptions,
};
use lanterna_net::{BandwidthMeter, HttpClient, Net};
use lanterna_render::{
    DriverOptions, MediaKind, MediaTime, PresentationClock, RenderDriver, RenderQueue,
    RenderStatus, SampleSink,
};
use lanterna_storage::BlobStore;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    asset::AssetOpener,
    error::PlayerError,
    events::{PlayerEvent, PlayerStatus},
    options::PlayerOptions,
    resolution::ResolutionLadder,
};

struct PlayerState {
    master: Option<MasterPlaylist>,
    ladder: Option<Arc<ResolutionLadder>>,
    current_resolution: Option<String>,
    abr_enabled: bool,
    supports_ranges: bool,
    epoch: CancellationToken,
    video_session: Option<Arc<DownloadSession>>,
    audio_session: Option<Arc<DownloadSession>>,
    video_driver: Option<RenderDriver>,
    audio_driver: Option<RenderDriver>,
}

pub struct Player {
    options: PlayerOptions,
    net: Arc<dyn Net>,
    meter: Arc<BandwidthMeter>,
    store: BlobStore,
    opener: Arc<dyn AssetOpener>,
    video_sink: Arc<dyn SampleSink>,
    audio_sink: Arc<dyn SampleSink>,
    clock: Arc<PresentationClock>,
    events: broadcast::Sender<PlayerEvent>,
    buffered_end: Arc<parking_lot::Mutex<f64>>,
    state: Mutex<PlayerState>,
}

impl Player {
    pub fn new(
        options: PlayerOptions,
        opener: Arc<dyn AssetOpener>,
        video_sink: Arc<dyn SampleSink>,
        audio_sink: Arc<dyn SampleSink>,
        clock: Arc<PresentationClock>,
    ) -> Arc<Self> {
        Self::with_transport(
            options,
            opener,
            video_sink,
            audio_sink,
            clock,
            Arc::new(HttpClient::default()),
            BlobStore::new(),
        )
    }

    pub fn with_transport(
        options: PlayerOptions,
        opener: Arc<dyn AssetOpener>,
        video_sink: Arc<dyn SampleSink>,
        audio_sink: Arc<dyn SampleSink>,
        clock: Arc<PresentationClock>,
        net: Arc<dyn Net>,
        store: BlobStore,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            options,
            net,
            meter: Arc::new(BandwidthMeter::new()),
            store,
            opener,
            video_sink,
            audio_sink,
            clock,
            events,
            buffered_end: Arc::new(parking_lot::Mutex::new(0.0)),
            state: Mutex::new(PlayerState {
                master: None,
                ladder: None,
                current_resolution: None,
                abr_enabled: true,
                supports_ranges: false,
                epoch: CancellationToken::new(),
                video_session: None,
                audio_session: None,
                video_driver: None,
                audio_driver: None,
            }),
        })
    }

    pub fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    /// Load the master manifest and start playback at its start point.
    ///
    /// A top-level media playlist is unsupported by design.
    pub async fn play(self: &Arc<Self>) -> Result<(), PlayerError> {
        let mut loader = PlaylistLoader::new(Arc::clone(&self.net), self.options.master_url.clone());
        let playlist = loader.load().await?;
        let master = match playlist {
            Playlist::Master(master) => master,
            Playlist::Media(_) => return Err(PlayerError::UnsupportedPlaylistShape),
        };

        let ladder = ResolutionLadder::from_master(&master, self.options.preferred_height);
        if ladder.is_empty() {
            return Err(PlayerError::MediaLoadFailed(
                "master playlist has no renditions with a resolution".to_string(),
            ));
        }

        let start = master
            .start
            .map(|s| s.time_offset.max(0.0))
            .unwrap_or(0.0);

        {
            let mut state = self.state.lock().await;
            state.supports_ranges = loader.supports_ranges();
            if state.current_resolution.is_none() {
                state.current_resolution = ladder.default_resolution().map(String::from);
            }
            state.master = Some(master);
            state.ladder = Some(Arc::new(ladder));
        }

        self.play_from(start).await
    }

    pub async fn seek(self: &Arc<Self>, time: f64) -> Result<(), PlayerError> {
        self.play_from(time).await
    }

    pub fn pause(&self) {
        self.clock.pause();
    }

    pub fn resume(&self) {
        self.clock.resume();
    }

    /// Tear everything down without dropping the loaded manifest.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        Self::teardown(&mut state);
        self.clock.pause();
    }

    /// Drop every cached blob; the next playback refetches from the network.
    pub async fn purge(&self) {
        self.store.purge().await;
    }

    pub fn set_rate(&self, rate: f64) {
        self.clock.set_rate(rate);
    }

    pub fn rate(&self) -> f64 {
        self.clock.rate()
    }

    pub fn set_volume(&self, volume: f32) {
        self.audio_sink.set_volume(volume);
    }

    /// Current presentation-clock time in seconds.
    pub fn current_time(&self) -> f64 {
        self.clock.now().seconds()
    }

    /// Presentation time up to which segments have been assembled.
    pub fn buffered_end(&self) -> f64 {
        *self.buffered_end.lock()
    }

    /// Seconds of assembled content ahead of the clock.
    pub fn buffered_time(&self) -> f64 {
        (self.buffered_end() - self.clock.now().seconds()).max(0.0)
    }

    pub fn bandwidth_estimate(&self) -> Option<u64> {
        self.meter.estimate_bps()
    }

    pub async fn available_resolutions(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.ladder.as_ref().map_or(Vec::new(), |l| l.available())
    }

    pub async fn current_resolution(&self) -> Option<String> {
        self.state.lock().await.current_resolution.clone()
    }

    pub async fn is_automatic_resolution(&self) -> bool {
        self.state.lock().await.abr_enabled
    }

    /// Manual rendition selection. Disables ABR and restarts playback at the
    /// current clock time.
    pub async fn set_resolution(self: &Arc<Self>, resolution: &str) -> Result<(), PlayerError> {
        {
            let mut state = self.state.lock().await;
            state.abr_enabled = false;
            let ladder = state
                .ladder
                .as_ref()
                .ok_or_else(|| PlayerError::MediaLoadFailed("no master loaded".to_string()))?;
            if ladder.stream_index(resolution).is_none() {
                return Err(PlayerError::MediaLoadFailed(format!(
                    "unknown resolution {resolution}"
                )));
            }
            state.current_resolution = Some(resolution.to_string());
        }
        self.emit(PlayerEvent::ResolutionChanged {
            resolution: resolution.to_string(),
        });
        let at = self.clock.now().seconds();
        self.play_from(at).await
    }

    /// Re-enable automatic downshifts.
    pub async fn set_automatic_resolution(&self) {
        self.state.lock().await.abr_enabled = true;
    }

    /// Spawns the stall-driven downshift handler on its own task. Kept as a
    /// plain (non-async) function so the task's future is a distinct,
    /// separately-typed item rather than an async block nested inside
    /// `play_from` — nesting it inline makes `play_from`'s own future type
    /// refer to itself (it spawns a task that awaits `handle_video_stall`,
    /// which awaits `play_from`), which `rustc` cannot prove `Send` for.
    fn spawn_stall_handler(player: Arc<Self>, duration: Duration) {
        tokio::spawn(async move {
            player.handle_video_stall(duration).await;
        });
    }

    /// ABR entry point, driven by the video driver's waiting-interval
    /// reports: a stall at or above the threshold drops to the next-lower
    /// resolution (no-op at the bottom or in manual mode).
    pub async fn handle_video_stall(self: &Arc<Self>, duration: Duration) {
        if duration < self.options.stall_downshift_threshold {
            return;
        }

        let lower = {
            let state = self.state.lock().await;
            if !state.abr_enabled {
                return;
            }
            let (Some(ladder), Some(current)) =
                (state.ladder.as_ref(), state.current_resolution.as_ref())
            else {
                return;
            };
            ladder.next_lower(current).map(String::from)
        };

        let Some(lower) = lower else {
            return;
        };

        debug!(stalled_for = ?duration, to = %lower, "player: downshifting resolution");
        {
            let mut state = self.state.lock().await;
            state.current_resolution = Some(lower.clone());
        }
        self.emit(PlayerEvent::ResolutionChanged {
            resolution: lower,
        });

        let at = self.clock.now().seconds();
        if let Err(e) = self.play_from(at).await {
            self.emit(PlayerEvent::Error {
                message: e.to_string(),
            });
        }
    }

    fn teardown(state: &mut PlayerState) {
        state.epoch.cancel();
        state.epoch = CancellationToken::new();
        if let Some(session) = state.video_session.take() {
            session.stop();
        }
        if let Some(session) = state.audio_session.take() {
            session.stop();
        }
        if let Some(driver) = state.video_driver.take() {
            driver.stop();
        }
        if let Some(driver) = state.audio_driver.take() {
            driver.stop();
        }
    }

    /// Stop whatever is active and start playing the current rendition from
    /// `seek` seconds.
    async fn play_from(self: &Arc<Self>, seek: f64) -> Result<(), PlayerError> {
        let mut state = self.state.lock().await;
        Self::teardown(&mut state);
        *self.buffered_end.lock() = seek;

        let master = state
            .master
            .clone()
            .ok_or_else(|| PlayerError::MediaLoadFailed("no master loaded".to_string()))?;
        let ladder = Arc::clone(
            state
                .ladder
                .as_ref()
                .ok_or_else(|| PlayerError::MediaLoadFailed("no master loaded".to_string()))?,
        );
        let resolution = state
            .current_resolution
            .clone()
            .ok_or_else(|| PlayerError::MediaLoadFailed("no rendition selected".to_string()))?;
        let stream = ladder
            .stream_for(&master, &resolution)
            .cloned()
            .ok_or_else(|| {
                PlayerError::MediaLoadFailed(format!("unknown resolution {resolution}"))
            })?;
        let supports_ranges = state.supports_ranges;
        let epoch = state.epoch.clone();

        let loader = PlaylistLoader::new(Arc::clone(&self.net), self.options.master_url.clone());
        let stream_uri = stream.uri.clone().ok_or_else(|| {
            PlayerError::MediaLoadFailed("rendition carries no URI".to_string())
        })?;
        let (video_media, video_url) = loader.load_media(&stream_uri).await?;

        // A separate audio rendition exists when the stream's AUDIO group
        // matches a media tag with a URI.
        let audio_tag = stream.audio.as_ref().and_then(|group| {
            master
                .media
                .iter()
                .find(|m| {
                    m.media_type == MediaType::Audio
                        && m.group_id.as_deref() == Some(group.as_str())
                        && m.uri.is_some()
                })
                .cloned()
        });

        let session_options = SessionOptions {
            use_ranged_streaming: supports_ranges,
            session_id: None,
        };

        let video_session = Arc::new(
            DownloadSession::new(
                &video_media,
                &video_url,
                seek,
                Arc::clone(&self.net),
                Arc::clone(&self.meter),
                self.store.clone(),
                session_options.clone(),
            )
            .map_err(|e| PlayerError::MediaLoadFailed(e.to_string()))?,
        );

        // A failed audio-rendition load aborts that rendition only; playback
        // falls back to the muxed audio track.
        let audio = match &audio_tag {
            Some(tag) => {
                let uri = tag.uri.as_deref().unwrap_or_default();
                match loader.load_media(uri).await {
                    Ok((audio_media, audio_url)) => {
                        let session = DownloadSession::new(
                            &audio_media,
                            &audio_url,
                            seek,
                            Arc::clone(&self.net),
                            Arc::clone(&self.meter),
                            self.store.clone(),
                            session_options,
                        )
                        .map_err(|e| PlayerError::MediaLoadFailed(e.to_string()))?;
                        Some((Arc::new(session), audio_media.segments.len()))
                    }
                    Err(e) => {
                        warn!(uri, error = %e, "player: audio rendition failed to load");
                        self.emit(PlayerEvent::Error {
                            message: format!("audio rendition failed: {e}"),
                        });
                        None
                    }
                }
            }
            None => None,
        };

        let driver_options = DriverOptions {
            poll_interval: self.options.poll_interval,
            stall_threshold: self.options.stall_downshift_threshold,
        };
        let video_driver = RenderDriver::new(
            MediaKind::Video,
            Arc::clone(&self.video_sink),
            driver_options.clone(),
        );
        let audio_driver = RenderDriver::new(
            MediaKind::Audio,
            Arc::clone(&self.audio_sink),
            driver_options,
        );

        // The video session's files also feed the audio queue iff there is
        // no separate audio rendition.
        let mut video_fed_queues = vec![video_driver.queue()];
        if audio.is_none() {
            video_fed_queues.push(audio_driver.queue());
        }
        self.spawn_dispatch(
            Arc::clone(&video_session),
            video_fed_queues,
            seek,
            video_media.segments.len(),
            epoch.clone(),
        );
        if let Some((audio_session, audio_total)) = &audio {
            self.spawn_dispatch(
                Arc::clone(audio_session),
                vec![audio_driver.queue()],
                seek,
                *audio_total,
                epoch.clone(),
            );
        }

        let status_events = self.events.clone();
        let stall_events = self.events.clone();
        let this = Arc::downgrade(self);
        video_driver.start(
            Some(Box::new(move |status| {
                let mapped = match status {
                    RenderStatus::Playing => PlayerStatus::Playing,
                    RenderStatus::Finished => PlayerStatus::Finished,
                    RenderStatus::Waiting => PlayerStatus::Buffering,
                };
                let _ = status_events.send(PlayerEvent::Status(mapped));
            })),
            Some(Box::new(move |duration| {
                let _ = stall_events.send(PlayerEvent::Stalled { duration });
                if let Some(player) = this.upgrade() {
                    Self::spawn_stall_handler(player, duration);
                }
            })),
        );
        audio_driver.start(None, None);

        self.clock.set_time(MediaTime::with_seconds(seek, 600));
        self.clock.resume();

        video_session.start();
        if let Some((audio_session, _)) = &audio {
            audio_session.start();
        }

        debug!(
            seek,
            resolution = %resolution,
            separate_audio = audio.is_some(),
            "player: playback started"
        );

        state.video_session = Some(video_session);
        state.audio_session = audio.map(|(session, _)| session);
        state.video_driver = Some(video_driver);
        state.audio_driver = Some(audio_driver);
        Ok(())
    }

    /// Consume a session's completions, release them in contiguous index
    /// order and append a producer per segment file to each target queue.
    fn spawn_dispatch(
        self: &Arc<Self>,
        session: Arc<DownloadSession>,
        queues: Vec<Arc<RenderQueue>>,
        seek: f64,
        total_segments: usize,
        epoch: CancellationToken,
    ) {
        let Some(mut rx) = session.take_completions() else {
            return;
        };
        let skip = session.skip_count();
        let opener = Arc::clone(&self.opener);
        let events = self.events.clone();
        let buffered_end = Arc::clone(&self.buffered_end);

        tokio::spawn(async move {
            let mut next = skip;
            let mut pending: BTreeMap<usize, SegmentReady> = BTreeMap::new();

            loop {
                let ready = tokio::select! {
                    _ = epoch.cancelled() => return,
                    ready = rx.recv() => match ready {
                        Some(r) => r,
                        None => break,
                    },
                };
                pending.insert(ready.index, ready);

                while let Some(ready) = pending.remove(&next) {
                    match opener.open(&ready.file_url) {
                        Ok(asset) => {
                            // Only the first kept segment starts mid-asset.
                            let into_asset = if ready.index == skip {
                                (seek - ready.presentation_offset).max(0.0)
                            } else {
                                0.0
                            };
                            let offset = MediaTime::with_seconds(into_asset, 600);
                            for queue in &queues {
                                queue.enqueue(Arc::clone(&asset), offset);
                            }
                            let mut end = buffered_end.lock();
                            *end = end.max(ready.presentation_offset + ready.duration);
                        }
                        Err(e) => {
                            warn!(index = ready.index, error = %e, "player: segment asset unopenable");
                            let _ = events.send(PlayerEvent::Error {
                                message: format!("asset open failed: {e}"),
                            });
                        }
                    }
                    next += 1;
                }

                if next >= total_segments {
                    break;
                }
            }

            if next >= total_segments {
                for queue in &queues {
                    queue.complete();
                }
            }
        });
    }
}
