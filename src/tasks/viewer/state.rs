use std::sync::Arc;
use std::time::Duration;

use frame_model::{Frame, PlaybackRate, ViewMode, dedupe_by_filename};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::timers::{LivePoller, PlaybackScheduler};
use crate::error::FetchError;
use crate::events::{FetchOutcome, ViewerCommand};

/// Work the state machine asks its owner to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    FetchFrames,
    FetchLatest,
}

/// Cheap copy of everything a renderer needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSnapshot {
    pub mode: ViewMode,
    pub frames: Arc<Vec<Frame>>,
    pub cursor: usize,
    pub playing: bool,
    pub rate: PlaybackRate,
    pub live_frame: Option<Frame>,
    pub loading: bool,
    pub load_error: Option<String>,
    pub live_poll_interval: Duration,
}

impl ViewSnapshot {
    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.get(self.cursor)
    }
}

/// Single owner of the viewer's mutable state.
///
/// Every mutation goes through a named transition; each transition re-derives
/// which timers should run and arms or disarms them before returning.
pub struct ViewerSM {
    frames: Arc<Vec<Frame>>,
    cursor: usize,
    mode: ViewMode,
    playing: bool,
    rate: PlaybackRate,
    live_frame: Option<Frame>,
    loading: bool,
    load_error: Option<String>,
    scheduler: PlaybackScheduler,
    poller: LivePoller,
}

impl ViewerSM {
    pub fn new(mode: ViewMode, rate: PlaybackRate, live_poll_interval: Duration) -> Self {
        Self {
            frames: Arc::new(Vec::new()),
            cursor: 0,
            mode,
            playing: false,
            rate,
            live_frame: None,
            loading: false,
            load_error: None,
            scheduler: PlaybackScheduler::new(),
            poller: LivePoller::new(live_poll_interval),
        }
    }

    /// Initial frame load plus whatever the starting mode needs.
    pub fn start(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = self.load_frames();
        effects.extend(self.reconcile(now));
        effects
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn rate(&self) -> PlaybackRate {
        self.rate
    }

    pub fn live_frame(&self) -> Option<&Frame> {
        self.live_frame.as_ref()
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_ticking(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            mode: self.mode,
            frames: Arc::clone(&self.frames),
            cursor: self.cursor,
            playing: self.playing,
            rate: self.rate,
            live_frame: self.live_frame.clone(),
            loading: self.loading,
            load_error: self.load_error.clone(),
            live_poll_interval: self.poller.interval(),
        }
    }

    /// Earliest instant at which [`ViewerSM::on_timer`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.scheduler.deadline(), self.poller.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn on_command(&mut self, cmd: ViewerCommand, now: Instant) -> Vec<Effect> {
        match cmd {
            ViewerCommand::SetMode(mode) => self.set_mode(mode, now),
            ViewerCommand::Play => self.set_playing(true, now),
            ViewerCommand::Pause => self.set_playing(false, now),
            ViewerCommand::TogglePlay => self.set_playing(!self.playing, now),
            ViewerCommand::SetRate(rate) => self.set_rate(rate, now),
            ViewerCommand::Faster => self.set_rate(self.rate.faster(), now),
            ViewerCommand::Slower => self.set_rate(self.rate.slower(), now),
            ViewerCommand::First => {
                self.jump_to_first();
                Vec::new()
            }
            ViewerCommand::Previous => {
                self.step_back();
                Vec::new()
            }
            ViewerCommand::Next => {
                self.step_forward();
                Vec::new()
            }
            ViewerCommand::Last => {
                self.jump_to_last();
                Vec::new()
            }
            ViewerCommand::Seek(index) => {
                self.seek(index);
                Vec::new()
            }
            ViewerCommand::SelectFrame(index) => self.select_frame(index, now),
            ViewerCommand::ReloadFrames => self.load_frames(),
            ViewerCommand::CreateVideo => {
                info!(frames = self.frames.len(), "video export requested; not available");
                Vec::new()
            }
        }
    }

    pub fn on_fetch(&mut self, outcome: FetchOutcome, now: Instant) -> Vec<Effect> {
        match outcome {
            FetchOutcome::Frames(result) => self.apply_frames(result, now),
            FetchOutcome::Latest(result) => {
                self.apply_latest(result);
                Vec::new()
            }
        }
    }

    /// Fire every timer whose deadline has passed.
    pub fn on_timer(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();

        let ticks = self.scheduler.take_due(now);
        if ticks > 0 && !self.frames.is_empty() {
            let len = self.frames.len();
            self.cursor = (self.cursor + ticks as usize) % len;
            trace!(ticks, cursor = self.cursor, len, "playback tick");
        }

        if self.poller.take_due(now) {
            trace!("live poll due");
            effects.push(Effect::FetchLatest);
        }

        effects
    }

    pub fn load_frames(&mut self) -> Vec<Effect> {
        self.loading = true;
        vec![Effect::FetchFrames]
    }

    pub fn apply_frames(&mut self, result: Result<Vec<Frame>, FetchError>, now: Instant) -> Vec<Effect> {
        self.loading = false;
        match result {
            Ok(frames) => {
                let previous_len = self.frames.len();
                let (unique, dropped) = dedupe_by_filename(frames);
                for frame in &dropped {
                    warn!(filename = %frame.filename, "duplicate frame in listing; keeping first");
                }
                self.frames = Arc::new(unique);
                self.cursor = 0;
                self.load_error = None;
                info!(frames = self.frames.len(), "frame store reloaded");

                if self.scheduler.is_running()
                    && self.frames.len() != previous_len
                    && !self.frames.is_empty()
                {
                    self.scheduler.arm(self.rate.tick_interval(), now);
                    debug!(len = self.frames.len(), "playback retimed after reload");
                }
                self.reconcile(now)
            }
            Err(err) => {
                // Previously loaded frames stay on screen; the message becomes
                // a banner over them, or the full view when there are none.
                warn!(error = %err, kept = self.frames.len(), "frame listing failed");
                self.load_error = Some(format!("Failed to load frames: {err}"));
                Vec::new()
            }
        }
    }

    pub fn apply_latest(&mut self, result: Result<Option<Frame>, FetchError>) {
        match result {
            Ok(frame) => {
                debug!(
                    filename = frame.as_ref().map(|f| f.filename.as_str()),
                    "live frame refreshed"
                );
                self.live_frame = frame;
            }
            Err(err) => {
                warn!(error = %err, "live frame refresh failed; keeping last image");
            }
        }
    }

    pub fn set_mode(&mut self, next: ViewMode, now: Instant) -> Vec<Effect> {
        if self.mode != next {
            info!(from = %self.mode, to = %next, "view mode changed");
        }
        self.mode = next;
        self.reconcile(now)
    }

    pub fn set_playing(&mut self, playing: bool, now: Instant) -> Vec<Effect> {
        if self.playing != playing {
            debug!(playing, "playback toggled");
        }
        self.playing = playing;
        self.reconcile(now)
    }

    pub fn set_rate(&mut self, rate: PlaybackRate, now: Instant) -> Vec<Effect> {
        if rate == self.rate {
            return Vec::new();
        }
        self.rate = rate;
        debug!(%rate, "playback rate changed");
        if self.scheduler.is_running() {
            self.scheduler.arm(rate.tick_interval(), now);
        }
        Vec::new()
    }

    pub fn jump_to_first(&mut self) {
        if !self.frames.is_empty() {
            self.cursor = 0;
        }
    }

    pub fn step_back(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn step_forward(&mut self) {
        if let Some(last) = self.last_index() {
            self.cursor = (self.cursor + 1).min(last);
        }
    }

    pub fn jump_to_last(&mut self) {
        if let Some(last) = self.last_index() {
            self.cursor = last;
        }
    }

    pub fn seek(&mut self, index: usize) {
        if let Some(last) = self.last_index() {
            self.cursor = index.min(last);
        }
    }

    /// Gallery click: cursor and mode change together.
    pub fn select_frame(&mut self, index: usize, now: Instant) -> Vec<Effect> {
        let Some(last) = self.last_index() else {
            debug!(index, "ignoring selection on empty frame store");
            return Vec::new();
        };
        self.cursor = index.min(last);
        self.set_mode(ViewMode::Timeline, now)
    }

    fn last_index(&self) -> Option<usize> {
        self.frames.len().checked_sub(1)
    }

    fn reconcile(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();

        let want_playback =
            self.mode == ViewMode::Timeline && self.playing && !self.frames.is_empty();
        if want_playback && !self.scheduler.is_running() {
            self.scheduler.arm(self.rate.tick_interval(), now);
            debug!(rate = %self.rate, "playback scheduler armed");
        } else if !want_playback && self.scheduler.is_running() {
            self.scheduler.disarm();
            debug!("playback scheduler stopped");
        }

        let want_live = self.mode == ViewMode::Live;
        if want_live && !self.poller.is_active() {
            self.poller.activate(now);
            debug!(interval = ?self.poller.interval(), "live poller active");
            effects.push(Effect::FetchLatest);
        } else if !want_live && self.poller.is_active() {
            self.poller.deactivate();
            debug!("live poller idle");
        }

        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    const POLL: Duration = Duration::from_secs(5);

    fn frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|i| {
                Frame::new(
                    format!("f{i}.jpg"),
                    format!("/images/f{i}.jpg"),
                    Some(1_700_000_000_000 + i as i64 * 1000),
                )
            })
            .collect()
    }

    fn server_error() -> FetchError {
        FetchError::Server {
            url: "http://cam/timelapse/images".into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn loaded(n: usize, t0: Instant) -> ViewerSM {
        let mut sm = ViewerSM::new(ViewMode::Gallery, PlaybackRate::DEFAULT, POLL);
        sm.start(t0);
        sm.apply_frames(Ok(frames(n)), t0);
        sm
    }

    #[test]
    fn start_requests_frames_and_marks_loading() {
        let mut sm = ViewerSM::new(ViewMode::Gallery, PlaybackRate::DEFAULT, POLL);
        assert_eq!(sm.start(Instant::now()), vec![Effect::FetchFrames]);
        assert!(sm.is_loading());
        assert!(!sm.is_polling());
    }

    #[test]
    fn start_in_live_mode_also_polls() {
        let mut sm = ViewerSM::new(ViewMode::Live, PlaybackRate::DEFAULT, POLL);
        let effects = sm.start(Instant::now());
        assert_eq!(effects, vec![Effect::FetchFrames, Effect::FetchLatest]);
        assert!(sm.is_polling());
    }

    #[test]
    fn reload_resets_cursor_to_zero() {
        let t0 = Instant::now();
        let mut sm = loaded(5, t0);
        sm.seek(3);
        assert_eq!(sm.cursor(), 3);
        sm.load_frames();
        sm.apply_frames(Ok(frames(4)), t0);
        assert_eq!(sm.cursor(), 0);
        assert_eq!(sm.frames().len(), 4);
        assert!(!sm.is_loading());
    }

    #[test]
    fn duplicate_filenames_are_dropped() {
        let t0 = Instant::now();
        let mut listing = frames(3);
        listing.push(Frame::new("f1.jpg", "/images/other.jpg", None));
        let mut sm = loaded(0, t0);
        sm.apply_frames(Ok(listing), t0);
        assert_eq!(sm.frames().len(), 3);
        assert_eq!(sm.frames()[1].path, "/images/f1.jpg");
    }

    #[test]
    fn navigation_stays_in_bounds() {
        let t0 = Instant::now();
        let mut sm = loaded(3, t0);

        sm.step_back();
        assert_eq!(sm.cursor(), 0);
        sm.step_forward();
        sm.step_forward();
        assert_eq!(sm.cursor(), 2);
        sm.step_forward();
        assert_eq!(sm.cursor(), 2);
        sm.jump_to_first();
        assert_eq!(sm.cursor(), 0);
        sm.jump_to_last();
        assert_eq!(sm.cursor(), 2);
        sm.seek(99);
        assert_eq!(sm.cursor(), 2);
        sm.seek(1);
        assert_eq!(sm.cursor(), 1);
    }

    #[test]
    fn navigation_on_empty_store_is_noop() {
        let t0 = Instant::now();
        let mut sm = loaded(0, t0);
        sm.step_forward();
        sm.jump_to_last();
        sm.seek(4);
        sm.step_back();
        assert_eq!(sm.cursor(), 0);
        assert!(sm.select_frame(2, t0).is_empty());
        assert_eq!(sm.mode(), ViewMode::Gallery);
    }

    #[test]
    fn playback_advances_and_wraps_at_rate() {
        let t0 = Instant::now();
        let mut sm = loaded(3, t0);
        sm.set_rate(PlaybackRate::new(2.0).unwrap(), t0);
        sm.set_mode(ViewMode::Timeline, t0);
        sm.set_playing(true, t0);
        assert!(sm.is_ticking());

        sm.on_timer(t0 + Duration::from_millis(499));
        assert_eq!(sm.cursor(), 0);
        sm.on_timer(t0 + Duration::from_millis(500));
        assert_eq!(sm.cursor(), 1);
        sm.on_timer(t0 + Duration::from_millis(1000));
        assert_eq!(sm.cursor(), 2);
        sm.on_timer(t0 + Duration::from_millis(1500));
        assert_eq!(sm.cursor(), 0);
    }

    #[test]
    fn tick_from_last_index_wraps_to_zero() {
        let t0 = Instant::now();
        let mut sm = loaded(5, t0);
        sm.set_mode(ViewMode::Timeline, t0);
        sm.jump_to_last();
        sm.set_playing(true, t0);
        sm.on_timer(t0 + PlaybackRate::DEFAULT.tick_interval());
        assert_eq!(sm.cursor(), 0);
    }

    #[test]
    fn leaving_timeline_stops_ticks() {
        let t0 = Instant::now();
        let mut sm = loaded(4, t0);
        sm.set_mode(ViewMode::Timeline, t0);
        sm.set_playing(true, t0);
        sm.on_timer(t0 + Duration::from_millis(500));
        assert_eq!(sm.cursor(), 1);

        sm.set_mode(ViewMode::Gallery, t0 + Duration::from_millis(600));
        assert!(!sm.is_ticking());
        assert!(sm.playing(), "playing flag survives leaving the timeline");
        sm.on_timer(t0 + Duration::from_secs(30));
        assert_eq!(sm.cursor(), 1);
    }

    #[test]
    fn pausing_stops_ticks() {
        let t0 = Instant::now();
        let mut sm = loaded(4, t0);
        sm.set_mode(ViewMode::Timeline, t0);
        sm.set_playing(true, t0);
        sm.set_playing(false, t0 + Duration::from_millis(100));
        assert!(sm.next_deadline().is_none());
        sm.on_timer(t0 + Duration::from_secs(10));
        assert_eq!(sm.cursor(), 0);
    }

    #[test]
    fn playback_is_not_armed_on_empty_store() {
        let t0 = Instant::now();
        let mut sm = loaded(0, t0);
        sm.set_mode(ViewMode::Timeline, t0);
        sm.set_playing(true, t0);
        assert!(!sm.is_ticking());

        sm.apply_frames(Ok(frames(2)), t0 + Duration::from_millis(10));
        assert!(sm.is_ticking(), "playback starts once frames arrive");
    }

    #[test]
    fn rate_change_retimes_with_fresh_phase() {
        let t0 = Instant::now();
        let mut sm = loaded(10, t0);
        sm.set_mode(ViewMode::Timeline, t0);
        sm.set_playing(true, t0);

        let changed_at = t0 + Duration::from_millis(400);
        sm.set_rate(PlaybackRate::new(1.0).unwrap(), changed_at);
        assert!(sm.playing());
        sm.on_timer(t0 + Duration::from_millis(500));
        assert_eq!(sm.cursor(), 0, "old period no longer fires");
        sm.on_timer(changed_at + Duration::from_millis(1000));
        assert_eq!(sm.cursor(), 1);
    }

    #[test]
    fn reload_while_playing_retimes_when_length_changes() {
        let t0 = Instant::now();
        let mut sm = loaded(3, t0);
        sm.set_mode(ViewMode::Timeline, t0);
        sm.set_playing(true, t0);

        let reload_at = t0 + Duration::from_millis(300);
        sm.apply_frames(Ok(frames(6)), reload_at);
        assert_eq!(
            sm.next_deadline(),
            Some(reload_at + PlaybackRate::DEFAULT.tick_interval())
        );

        sm.apply_frames(Ok(Vec::new()), reload_at + Duration::from_millis(10));
        assert!(!sm.is_ticking());
    }

    #[test]
    fn entering_live_fetches_now_then_every_interval() {
        let t0 = Instant::now();
        let mut sm = loaded(1, t0);
        assert_eq!(sm.set_mode(ViewMode::Live, t0), vec![Effect::FetchLatest]);
        assert!(sm.on_timer(t0 + Duration::from_millis(4999)).is_empty());
        assert_eq!(sm.on_timer(t0 + POLL), vec![Effect::FetchLatest]);
        assert_eq!(sm.on_timer(t0 + POLL * 2), vec![Effect::FetchLatest]);

        assert!(sm.set_mode(ViewMode::Live, t0 + POLL * 2).is_empty());

        assert!(sm.set_mode(ViewMode::Gallery, t0 + POLL * 2).is_empty());
        assert!(!sm.is_polling());
        assert!(sm.on_timer(t0 + POLL * 10).is_empty());

        let back = t0 + POLL * 11;
        assert_eq!(sm.set_mode(ViewMode::Live, back), vec![Effect::FetchLatest]);
    }

    #[test]
    fn live_failure_keeps_last_frame() {
        let t0 = Instant::now();
        let mut sm = loaded(0, t0);
        let latest = Frame::new("live.jpg", "/images/live.jpg", Some(1_700_000_000_000));
        sm.apply_latest(Ok(Some(latest.clone())));
        sm.apply_latest(Err(server_error()));
        assert_eq!(sm.live_frame(), Some(&latest));
    }

    #[test]
    fn failed_first_load_then_successful_retry() {
        let t0 = Instant::now();
        let mut sm = ViewerSM::new(ViewMode::Gallery, PlaybackRate::DEFAULT, POLL);
        sm.start(t0);
        sm.apply_frames(Err(server_error()), t0);
        assert!(sm.frames().is_empty());
        let message = sm.load_error().expect("error recorded");
        assert!(message.contains("500"));
        assert!(!sm.is_loading());

        assert_eq!(sm.load_frames(), vec![Effect::FetchFrames]);
        sm.apply_frames(Ok(frames(2)), t0);
        assert!(sm.load_error().is_none());
        assert_eq!(sm.frames().len(), 2);
    }

    #[test]
    fn failed_reload_keeps_stale_frames() {
        let t0 = Instant::now();
        let mut sm = loaded(3, t0);
        sm.seek(2);
        sm.apply_frames(Err(server_error()), t0);
        assert_eq!(sm.frames().len(), 3);
        assert_eq!(sm.cursor(), 2);
        assert!(sm.load_error().is_some());
    }

    #[test]
    fn gallery_selection_sets_cursor_and_mode_together() {
        let t0 = Instant::now();
        let mut sm = loaded(5, t0);
        sm.set_mode(ViewMode::Live, t0);
        sm.seek(4);

        let effects = sm.on_command(ViewerCommand::SelectFrame(2), t0);
        assert!(effects.is_empty());
        assert_eq!(sm.cursor(), 2);
        assert_eq!(sm.mode(), ViewMode::Timeline);
        assert!(!sm.is_polling());
    }

    #[test]
    fn create_video_is_inert() {
        let t0 = Instant::now();
        let mut sm = loaded(2, t0);
        let before = sm.snapshot();
        assert!(sm.on_command(ViewerCommand::CreateVideo, t0).is_empty());
        assert_eq!(sm.snapshot(), before);
    }
}
