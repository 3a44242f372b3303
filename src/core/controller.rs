use crate::common::{Config, FaceLockError, Result};
use crate::core::matcher::{find_best_match, Gallery, MatchResult};
use crate::core::source::{Announcer, EmbeddingSource, SourceOpener};
use crate::storage::{AccessEvent, Datastore};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often the runner wakes up when nothing is due sooner.
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Scanning,
    Unlocked,
    Error,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LockState::Locked => "locked",
            LockState::Scanning => "scanning",
            LockState::Unlocked => "unlocked",
            LockState::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub distance_threshold: f32,
    pub confidence_threshold: i32,
    pub unlock_duration: u32,
    pub tick_interval: Duration,
    pub countdown_interval: Duration,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            distance_threshold: config.matching.distance_threshold,
            confidence_threshold: config.matching.confidence_threshold,
            unlock_duration: config.door.unlock_duration_secs,
            tick_interval: Duration::from_millis(config.door.tick_interval_ms),
            countdown_interval: Duration::from_millis(config.door.countdown_interval_ms),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// What a display needs to render the door.
#[derive(Debug, Clone, PartialEq)]
pub struct DoorStatus {
    pub state: LockState,
    pub recognized: Option<String>,
    pub confidence: i32,
    pub countdown: u32,
    pub error: Option<String>,
}

/// The open camera and the gallery snapshot for one activation. Dropping it
/// releases the camera.
struct Session {
    source: Box<dyn EmbeddingSource>,
    gallery: Gallery,
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::debug!("Releasing camera session");
    }
}

/// Each active state owns its session and its own schedule, so leaving a
/// state cancels its timer and only the recognition tick or the countdown
/// can ever be pending.
enum Phase {
    Locked,
    Scanning {
        session: Session,
        next_tick: Instant,
    },
    Unlocked {
        session: Session,
        granted: MatchResult,
        remaining: u32,
        next_countdown: Instant,
    },
    Error {
        reason: String,
    },
}

pub struct AccessController {
    phase: Phase,
    settings: ControllerSettings,
    store: Arc<dyn Datastore>,
    announcer: Box<dyn Announcer>,
    displayed_confidence: i32,
}

impl AccessController {
    pub fn new(
        settings: ControllerSettings,
        store: Arc<dyn Datastore>,
        announcer: Box<dyn Announcer>,
    ) -> Self {
        Self {
            phase: Phase::Locked,
            settings,
            store,
            announcer,
            displayed_confidence: 0,
        }
    }

    pub fn state(&self) -> LockState {
        LockState::from(&self.phase)
    }

    pub fn status(&self) -> DoorStatus {
        let (recognized, countdown, error) = match &self.phase {
            Phase::Unlocked { granted, remaining, .. } => (Some(granted.name.clone()), *remaining, None),
            Phase::Error { reason } => (None, 0, Some(reason.clone())),
            _ => (None, 0, None),
        };

        DoorStatus {
            state: self.state(),
            recognized,
            confidence: self.displayed_confidence,
            countdown,
            error,
        }
    }

    /// The gallery of the running session.
    pub fn gallery(&self) -> Option<&Gallery> {
        match &self.phase {
            Phase::Scanning { session, .. } | Phase::Unlocked { session, .. } => Some(&session.gallery),
            _ => None,
        }
    }

    pub fn activate(&mut self, opener: &mut dyn SourceOpener, gallery: Gallery) -> Result<()> {
        self.activate_at(opener, gallery, Instant::now())
    }

    /// Opens the camera and starts scanning. A failed acquisition parks the
    /// controller in `Error` until it is deactivated.
    pub fn activate_at(
        &mut self,
        opener: &mut dyn SourceOpener,
        gallery: Gallery,
        now: Instant,
    ) -> Result<()> {
        match &self.phase {
            Phase::Locked => {}
            Phase::Error { reason } => {
                return Err(FaceLockError::CameraUnavailable(format!(
                    "controller halted ({}); deactivate before activating again", reason
                )));
            }
            _ => {
                tracing::debug!("Activation ignored, controller already {}", self.state());
                return Ok(());
            }
        }

        let source = match opener.open() {
            Ok(source) => source,
            Err(e) => {
                let reason = e.to_string();
                self.fail(reason.clone());
                return Err(match e {
                    FaceLockError::CameraUnavailable(_) => e,
                    _ => FaceLockError::CameraUnavailable(reason),
                });
            }
        };

        if gallery.is_empty() {
            tracing::warn!("Activating with an empty gallery; nobody can be granted access");
        }
        tracing::info!("Door lock active, scanning against {} identities", gallery.len());

        self.displayed_confidence = 0;
        self.phase = Phase::Scanning {
            session: Session { source, gallery },
            next_tick: now + self.settings.tick_interval,
        };
        Ok(())
    }

    /// Releases the camera, cancels every pending tick and returns to
    /// `Locked`. Safe to call in any state, any number of times.
    pub fn deactivate(&mut self) {
        let previous = std::mem::replace(&mut self.phase, Phase::Locked);
        if !matches!(previous, Phase::Locked) {
            tracing::info!("Door lock deactivated");
        }
        drop(previous);
        self.displayed_confidence = 0;
    }

    /// Runs whatever is due at `now` and returns the next deadline, if any.
    pub fn poll(&mut self, now: Instant) -> Option<Instant> {
        let due = self.next_deadline().is_some_and(|deadline| now >= deadline);
        if due {
            match self.state() {
                LockState::Scanning => self.recognition_tick_at(now),
                LockState::Unlocked => self.countdown_tick_at(now),
                LockState::Locked | LockState::Error => {}
            }
        }
        self.next_deadline()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.phase {
            Phase::Scanning { next_tick, .. } => Some(*next_tick),
            Phase::Unlocked { next_countdown, .. } => Some(*next_countdown),
            _ => None,
        }
    }

    /// One recognition attempt, immediately.
    pub fn tick(&mut self) {
        self.recognition_tick_at(Instant::now());
    }

    fn recognition_tick_at(&mut self, now: Instant) {
        let Phase::Scanning { session, .. } = &mut self.phase else {
            return;
        };

        let distance_threshold = self.settings.distance_threshold;
        let attempt = session.source.detect().map(|detected| {
            detected.map(|embedding| find_best_match(&embedding, &session.gallery, distance_threshold))
        });

        match attempt {
            Ok(None) => {
                self.displayed_confidence = 0;
            }
            Ok(Some(None)) => {
                tracing::debug!("Face detected but no enrolled identity is close enough");
                self.displayed_confidence = 0;
            }
            Ok(Some(Some(matched))) if matched.confidence >= self.settings.confidence_threshold => {
                self.unlock_at(&matched, now);
                return;
            }
            Ok(Some(Some(matched))) => {
                tracing::info!(
                    "Access denied: best candidate confidence {} below {}",
                    matched.confidence, self.settings.confidence_threshold
                );
                self.displayed_confidence = matched.confidence;
                self.record(AccessEvent::denied(matched.confidence));
            }
            Err(e) if e.is_fatal() => {
                self.fail(e.to_string());
                return;
            }
            Err(e) => {
                tracing::warn!("Recognition error: {}", e);
            }
        }

        if let Phase::Scanning { next_tick, .. } = &mut self.phase {
            *next_tick = finished(now) + self.settings.tick_interval;
        }
    }

    pub fn unlock(&mut self, matched: &MatchResult) -> bool {
        self.unlock_at(matched, Instant::now())
    }

    /// Opens the door for `matched`. Only a scanning controller unlocks; a
    /// repeat while already unlocked changes nothing and logs nothing.
    fn unlock_at(&mut self, matched: &MatchResult, now: Instant) -> bool {
        match std::mem::replace(&mut self.phase, Phase::Locked) {
            Phase::Scanning { session, .. } => {
                let duration = self.settings.unlock_duration;
                tracing::info!(
                    "Access granted to {} (confidence {}), unlocked for {}s",
                    matched.name, matched.confidence, duration
                );

                self.phase = Phase::Unlocked {
                    session,
                    granted: matched.clone(),
                    remaining: duration,
                    next_countdown: now + self.settings.countdown_interval,
                };
                self.displayed_confidence = matched.confidence;
                self.record(AccessEvent::granted(matched, duration));
                self.announcer.announce(&format!(
                    "Welcome {}. Door unlocked. It will lock in {} seconds.",
                    matched.name, duration
                ));
                true
            }
            other => {
                tracing::debug!("Unlock for {} ignored in state {:?}", matched.name, LockState::from(&other));
                self.phase = other;
                false
            }
        }
    }

    /// One countdown step, immediately.
    pub fn countdown_tick(&mut self) {
        self.countdown_tick_at(Instant::now());
    }

    fn countdown_tick_at(&mut self, now: Instant) {
        let Phase::Unlocked { remaining, next_countdown, .. } = &mut self.phase else {
            return;
        };

        if *remaining <= 1 {
            self.relock_at(now);
        } else {
            *remaining -= 1;
            *next_countdown = now + self.settings.countdown_interval;
        }
    }

    fn relock_at(&mut self, now: Instant) {
        let Phase::Unlocked { session, .. } = std::mem::replace(&mut self.phase, Phase::Locked) else {
            return;
        };

        tracing::info!("Auto-relock, resuming scan");
        self.phase = Phase::Scanning {
            session,
            next_tick: now + self.settings.tick_interval,
        };
        self.displayed_confidence = 0;
        self.announcer.announce("Door locked for your safety.");
    }

    fn fail(&mut self, reason: String) {
        tracing::error!("Camera unavailable, halting door lock: {}", reason);
        self.phase = Phase::Error { reason };
        self.displayed_confidence = 0;
    }

    fn record(&self, event: AccessEvent) {
        if let Err(e) = self.store.append_access_event(&event) {
            tracing::warn!("Failed to log {} access event: {}", event.outcome, e);
        }
    }

    /// Drives the controller until `should_stop` says so or the controller
    /// halts, then deactivates it. `on_status` sees every status change.
    pub fn run_until(
        &mut self,
        mut should_stop: impl FnMut() -> bool,
        mut on_status: impl FnMut(&DoorStatus),
    ) {
        let mut last_status = self.status();
        on_status(&last_status);

        while !should_stop() {
            let next = self.poll(Instant::now());

            let status = self.status();
            if status != last_status {
                on_status(&status);
                last_status = status;
            }

            let Some(deadline) = next else {
                break;
            };
            let wait = deadline.saturating_duration_since(Instant::now()).min(IDLE_POLL);
            std::thread::sleep(wait);
        }

        self.deactivate();
    }
}

impl From<&Phase> for LockState {
    fn from(phase: &Phase) -> Self {
        match phase {
            Phase::Locked => LockState::Locked,
            Phase::Scanning { .. } => LockState::Scanning,
            Phase::Unlocked { .. } => LockState::Unlocked,
            Phase::Error { .. } => LockState::Error,
        }
    }
}

/// Schedules count from when the work finished, never from before `now`.
fn finished(now: Instant) -> Instant {
    Instant::now().max(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{at, identity, OnceOpener, RecordingAnnouncer, ScriptedSource, ORIGIN};
    use crate::storage::{AccessOutcome, MemoryStore};

    struct Harness {
        controller: AccessController,
        store: Arc<MemoryStore>,
        spoken: RecordingAnnouncer,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let spoken = RecordingAnnouncer::default();
        let controller = AccessController::new(
            ControllerSettings::default(),
            store.clone(),
            Box::new(spoken.clone()),
        );
        Harness { controller, store, spoken }
    }

    fn gallery() -> Gallery {
        Gallery::new(vec![
            identity("alice-id", "Alice", vec![at(0.3), at(0.5), at(0.8)]),
            identity("bob-id", "Bob", vec![at(0.1)]),
        ])
    }

    fn bob() -> MatchResult {
        MatchResult {
            identity_id: "bob-id".into(),
            name: "Bob".into(),
            distance: 0.1,
            confidence: 90,
        }
    }

    #[test]
    fn starts_locked_and_scans_after_activation() {
        let mut h = harness();
        assert_eq!(h.controller.state(), LockState::Locked);

        let (source, _) = ScriptedSource::new(vec![]);
        h.controller.activate(&mut OnceOpener::new(source), gallery()).unwrap();
        assert_eq!(h.controller.state(), LockState::Scanning);
        assert_eq!(h.controller.gallery().map(|g| g.len()), Some(2));
    }

    #[test]
    fn near_miss_is_denied_without_identity() {
        let mut h = harness();
        // Only Alice is close: [0.3, 0.5, 0.8] -> 0.3 -> confidence 70.
        let only_alice = Gallery::new(vec![identity("alice-id", "Alice", vec![at(0.3), at(0.5), at(0.8)])]);
        let (source, _) = ScriptedSource::new(vec![Ok(Some(ORIGIN.to_vec()))]);
        h.controller.activate(&mut OnceOpener::new(source), only_alice).unwrap();

        h.controller.tick();

        assert_eq!(h.controller.state(), LockState::Scanning);
        assert_eq!(h.controller.status().confidence, 70);
        let events = h.store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, AccessOutcome::Denied);
        assert_eq!(events[0].confidence, 70);
        assert_eq!(events[0].identity_id, None);
        assert_eq!(events[0].unlock_duration, None);
    }

    #[test]
    fn confident_match_unlocks_then_relocks_to_scanning() {
        let mut h = harness();
        // The query sits 0.1 from Bob and 0.2 from Alice's nearest sample.
        let query = vec![0.1, 0.0];
        let g = Gallery::new(vec![
            identity("alice-id", "Alice", vec![at(0.3)]),
            identity("bob-id", "Bob", vec![at(0.0)]),
        ]);
        let (source, _) = ScriptedSource::new(vec![Ok(Some(query))]);
        h.controller.activate(&mut OnceOpener::new(source), g).unwrap();

        h.controller.tick();

        let status = h.controller.status();
        assert_eq!(status.state, LockState::Unlocked);
        assert_eq!(status.recognized.as_deref(), Some("Bob"));
        assert_eq!(status.confidence, 90);
        assert_eq!(status.countdown, 10);

        let events = h.store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, AccessOutcome::Granted);
        assert_eq!(events[0].identity_id.as_deref(), Some("bob-id"));
        assert_eq!(events[0].unlock_duration, Some(10));

        for _ in 0..9 {
            h.controller.countdown_tick();
            assert_eq!(h.controller.state(), LockState::Unlocked);
        }
        assert_eq!(h.controller.status().countdown, 1);
        h.controller.countdown_tick();

        let status = h.controller.status();
        assert_eq!(status.state, LockState::Scanning);
        assert_eq!(status.recognized, None);
        assert_eq!(status.confidence, 0);
        assert_eq!(h.store.events().len(), 1);
        assert_eq!(
            h.spoken.spoken(),
            vec![
                "Welcome Bob. Door unlocked. It will lock in 10 seconds.".to_string(),
                "Door locked for your safety.".to_string(),
            ]
        );
    }

    #[test]
    fn repeated_unlock_is_a_no_op() {
        let mut h = harness();
        let (source, _) = ScriptedSource::new(vec![]);
        h.controller.activate(&mut OnceOpener::new(source), gallery()).unwrap();

        assert!(h.controller.unlock(&bob()));
        h.controller.countdown_tick();
        assert!(!h.controller.unlock(&bob()));

        assert_eq!(h.controller.status().countdown, 9);
        assert_eq!(h.store.events().len(), 1);
        assert_eq!(h.spoken.spoken().len(), 1);
    }

    #[test]
    fn unlock_requires_an_active_session() {
        let mut h = harness();
        assert!(!h.controller.unlock(&bob()));
        assert_eq!(h.controller.state(), LockState::Locked);
        assert!(h.store.events().is_empty());
    }

    #[test]
    fn recognition_is_suspended_while_unlocked() {
        let mut h = harness();
        let (source, _) = ScriptedSource::new(vec![Ok(Some(vec![0.1, 0.0]))]);
        h.controller.activate(&mut OnceOpener::new(source), gallery()).unwrap();
        h.controller.unlock(&bob());

        h.controller.tick();
        h.controller.tick();

        assert_eq!(h.controller.state(), LockState::Unlocked);
        assert_eq!(h.store.events().len(), 1);
    }

    #[test]
    fn empty_frames_keep_scanning_silently() {
        let mut h = harness();
        let script = (0..5).map(|_| Ok(None)).collect();
        let (source, _) = ScriptedSource::new(script);
        h.controller.activate(&mut OnceOpener::new(source), gallery()).unwrap();

        for _ in 0..5 {
            h.controller.tick();
            assert_eq!(h.controller.state(), LockState::Scanning);
            assert_eq!(h.controller.status().confidence, 0);
        }
        assert!(h.store.events().is_empty());
    }

    #[test]
    fn unknown_face_resets_confidence_without_logging() {
        let mut h = harness();
        let (source, _) = ScriptedSource::new(vec![
            Ok(Some(ORIGIN.to_vec())),
            Ok(Some(vec![5.0, 5.0])),
        ]);
        let only_alice = Gallery::new(vec![identity("alice-id", "Alice", vec![at(0.3)])]);
        h.controller.activate(&mut OnceOpener::new(source), only_alice).unwrap();

        h.controller.tick();
        assert_eq!(h.controller.status().confidence, 70);
        h.controller.tick();
        assert_eq!(h.controller.status().confidence, 0);
        assert_eq!(h.store.events().len(), 1);
    }

    #[test]
    fn empty_gallery_never_logs() {
        let mut h = harness();
        let (source, _) = ScriptedSource::new(vec![Ok(Some(ORIGIN.to_vec()))]);
        h.controller.activate(&mut OnceOpener::new(source), Gallery::default()).unwrap();
        h.controller.tick();
        assert_eq!(h.controller.state(), LockState::Scanning);
        assert!(h.store.events().is_empty());
    }

    #[test]
    fn transient_errors_do_not_stop_scanning() {
        let mut h = harness();
        let (source, released) = ScriptedSource::new(vec![
            Err(FaceLockError::Camera("dropped frame".into())),
            Err(FaceLockError::Model("bad tensor".into())),
            Ok(Some(ORIGIN.to_vec())),
        ]);
        h.controller.activate(&mut OnceOpener::new(source), gallery()).unwrap();

        h.controller.tick();
        h.controller.tick();
        assert_eq!(h.controller.state(), LockState::Scanning);
        assert!(!released.get());

        h.controller.tick();
        assert_eq!(h.store.events().len(), 1);
    }

    #[test]
    fn camera_loss_halts_and_releases() {
        let mut h = harness();
        let (source, released) = ScriptedSource::new(vec![
            Err(FaceLockError::CameraUnavailable("unplugged".into())),
        ]);
        h.controller.activate(&mut OnceOpener::new(source), gallery()).unwrap();

        h.controller.tick();

        let status = h.controller.status();
        assert_eq!(status.state, LockState::Error);
        assert!(status.error.unwrap().contains("unplugged"));
        assert!(released.get());
        assert_eq!(h.controller.next_deadline(), None);

        h.controller.tick();
        assert_eq!(h.controller.state(), LockState::Error);
    }

    #[test]
    fn failed_acquisition_enters_error_until_deactivated() {
        let mut h = harness();
        let mut failing = || -> Result<Box<dyn EmbeddingSource>> {
            Err(FaceLockError::CameraUnavailable("permission denied".into()))
        };

        let err = h.controller.activate(&mut failing, gallery()).unwrap_err();
        assert!(matches!(err, FaceLockError::CameraUnavailable(_)));
        assert_eq!(h.controller.state(), LockState::Error);

        let (source, _) = ScriptedSource::new(vec![]);
        assert!(h.controller.activate(&mut OnceOpener::new(source), gallery()).is_err());

        h.controller.deactivate();
        let (source, _) = ScriptedSource::new(vec![]);
        h.controller.activate(&mut OnceOpener::new(source), gallery()).unwrap();
        assert_eq!(h.controller.state(), LockState::Scanning);
    }

    #[test]
    fn deactivate_from_any_state_releases_camera() {
        let mut h = harness();
        let (source, released) = ScriptedSource::new(vec![]);
        h.controller.activate(&mut OnceOpener::new(source), gallery()).unwrap();
        h.controller.unlock(&bob());

        h.controller.deactivate();
        assert!(released.get());
        let status = h.controller.status();
        assert_eq!(status.state, LockState::Locked);
        assert_eq!(status.recognized, None);
        assert_eq!(status.confidence, 0);
        assert_eq!(status.countdown, 0);
        assert_eq!(h.controller.next_deadline(), None);

        h.controller.deactivate();
        assert_eq!(h.controller.state(), LockState::Locked);
        assert_eq!(h.store.events().len(), 1);
    }

    #[test]
    fn log_failures_do_not_block_unlock() {
        let mut h = harness();
        h.store.set_fail_writes(true);
        let (source, _) = ScriptedSource::new(vec![]);
        h.controller.activate(&mut OnceOpener::new(source), gallery()).unwrap();

        assert!(h.controller.unlock(&bob()));
        assert_eq!(h.controller.state(), LockState::Unlocked);
        assert!(h.store.events().is_empty());
    }

    #[test]
    fn poll_follows_the_schedules() {
        let mut h = harness();
        let (source, _) = ScriptedSource::new(vec![Ok(Some(vec![0.1, 0.0]))]);
        let start = Instant::now();
        let g = Gallery::new(vec![identity("bob-id", "Bob", vec![at(0.0)])]);
        h.controller.activate_at(&mut OnceOpener::new(source), g, start).unwrap();

        let second = Duration::from_secs(1);
        assert_eq!(h.controller.poll(start), Some(start + second));
        assert_eq!(h.controller.state(), LockState::Scanning);

        let deadline = h.controller.poll(start + second).unwrap();
        assert_eq!(h.controller.state(), LockState::Unlocked);
        assert_eq!(deadline, start + 2 * second);

        let mut now = deadline;
        for _ in 0..10 {
            now = h.controller.poll(now).unwrap();
        }
        assert_eq!(h.controller.state(), LockState::Scanning);
        assert!(now >= start + 12 * second);
    }

    #[test]
    fn run_until_deactivates_on_stop() {
        let mut h = harness();
        let (source, released) = ScriptedSource::new(vec![]);
        h.controller.activate(&mut OnceOpener::new(source), gallery()).unwrap();

        let mut polls = 0;
        let mut seen = Vec::new();
        h.controller.run_until(
            || {
                polls += 1;
                polls > 3
            },
            |status| seen.push(status.state),
        );

        assert_eq!(seen, vec![LockState::Scanning]);
        assert_eq!(h.controller.state(), LockState::Locked);
        assert!(released.get());
    }
}
