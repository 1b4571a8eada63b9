//! Frame loop: pulls frames from the source and fans them out
//!
//! One loop runs per session. Each cycle either publishes the placeholder
//! (source still building), replays the last frame (paused), or captures,
//! encodes and publishes a new one. The pacing sleep between cycles is the
//! only throttle on production; viewers that cannot keep up lose frames in
//! the bounded broadcast channel instead of slowing the loop down.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::session::{Readiness, Session, SessionError, SessionState, Stage};

/// What a single cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Source not ready, placeholder published
    Placeholder,
    /// Paused, last frame published again
    Replayed,
    /// New frame captured and published
    Captured { index: u64, restarted: bool },
    /// No viewers, simulation left untouched
    Idle,
    /// Capture or encode failed, nothing published
    Skipped,
    /// Session torn down
    Terminated,
}

struct Captured {
    bytes: Bytes,
    index: u64,
    restarted: bool,
}

/// Scheduler driving one session
pub struct FrameLoop {
    session: Arc<Session>,
}

impl FrameLoop {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Run the loop on the runtime until the session terminates
    pub fn spawn(session: Arc<Session>) -> JoinHandle<()> {
        tokio::spawn(Self::new(session).run())
    }

    pub async fn run(self) {
        let settings = self.session.settings().clone();
        let mut readiness = self.session.watch_readiness();
        info!(
            fps = settings.fps,
            max_frames = settings.max_frames,
            "Frame loop started"
        );

        loop {
            let wait = match self.cycle().await {
                CycleOutcome::Terminated => break,
                CycleOutcome::Placeholder => settings.placeholder_interval,
                CycleOutcome::Captured { index, restarted } => {
                    trace!(index, restarted, "Frame published");
                    settings.pacing_interval()
                }
                _ => settings.pacing_interval(),
            };

            // Readiness changes cut the wait short: the first real frame goes
            // out as soon as the source is built, and teardown is prompt.
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = readiness.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Frame loop stopped");
    }

    /// Run a single cycle without waiting
    pub async fn cycle(&self) -> CycleOutcome {
        match self.session.readiness() {
            Readiness::Terminated => return CycleOutcome::Terminated,
            Readiness::Pending | Readiness::Failed { .. } => {
                self.session.publish(self.session.placeholder());
                return CycleOutcome::Placeholder;
            }
            Readiness::Ready => {}
        }

        let guard = self.session.state().clone().lock_owned().await;

        if guard.paused {
            let frame = self.replay_frame(&guard);
            drop(guard);
            self.session.publish(frame);
            return CycleOutcome::Replayed;
        }

        if self.session.viewer_count() == 0 {
            return CycleOutcome::Idle;
        }

        // Render and encode off the async workers, still holding the lock
        let session = self.session.clone();
        let result = tokio::task::spawn_blocking(move || capture(&session, guard)).await;

        match result {
            Ok(Ok(captured)) => {
                self.session.publish(captured.bytes);
                CycleOutcome::Captured {
                    index: captured.index,
                    restarted: captured.restarted,
                }
            }
            Ok(Err(SessionError::Terminated)) => CycleOutcome::Terminated,
            Ok(Err(e)) => {
                warn!(error = %e, "Frame cycle skipped");
                CycleOutcome::Skipped
            }
            Err(e) => {
                error!(error = %e, "Capture task failed");
                CycleOutcome::Skipped
            }
        }
    }

    /// Bytes to show while paused: the last frame, else the placeholder
    fn replay_frame(&self, state: &SessionState) -> Bytes {
        if let Some(bytes) = &state.last_encoded {
            return bytes.clone();
        }
        if let Some(frame) = &state.last_frame {
            match self.session.encoder().encode(frame) {
                Ok(bytes) => return Bytes::from(bytes),
                Err(e) => debug!(error = %e, "Could not encode paused frame"),
            }
        }
        self.session.placeholder()
    }
}

/// Capture, cache and encode one frame under the session lock
fn capture(
    session: &Session,
    mut guard: OwnedMutexGuard<SessionState>,
) -> Result<Captured, SessionError> {
    let state = &mut *guard;
    let cycle = match &mut state.stage {
        Stage::Live(cycle) => cycle,
        Stage::Terminated => return Err(SessionError::Terminated),
        Stage::Building | Stage::Failed => return Err(SessionError::NotReady),
    };

    let next = cycle.next_frame()?;
    if next.restarted {
        let pose = session.default_pose();
        match cycle.source_mut().set_camera(&pose) {
            Ok(()) => state.pose = pose,
            Err(e) => warn!(error = %e, "Failed to reset camera on cycle restart"),
        }
        info!(frames = next.index + 1, "Simulation cycle restarted");
    }

    // The previous frame stays on display unless this one encodes
    let bytes = Bytes::from(session.encoder().encode(&next.frame)?);
    state.last_frame = Some(Arc::new(next.frame));
    state.last_encoded = Some(bytes.clone());

    Ok(Captured {
        bytes,
        index: next.index,
        restarted: next.restarted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_session, ProbeSource};
    use framecast_core::GestureEvent;
    use std::time::Duration;

    fn red(bytes: &Bytes) -> u8 {
        bytes[0]
    }

    #[tokio::test]
    async fn test_placeholder_until_ready() {
        let (session, probe) = test_session(0);
        let mut rx = session.subscribe();
        let frame_loop = FrameLoop::new(session.clone());

        for _ in 0..3 {
            assert_eq!(frame_loop.cycle().await, CycleOutcome::Placeholder);
            let frame = rx.recv().await.unwrap();
            assert_eq!(frame, session.placeholder());
            assert_eq!(frame.len(), ProbeSource::RESOLUTION.rgb_len());
        }

        session.install_source(probe.source()).await;
        assert_eq!(
            frame_loop.cycle().await,
            CycleOutcome::Captured { index: 0, restarted: false }
        );
        assert_eq!(red(&rx.recv().await.unwrap()), 0);
        frame_loop.cycle().await;
        assert_eq!(red(&rx.recv().await.unwrap()), 1);
    }

    #[tokio::test]
    async fn test_pause_replays_last_frame() {
        let (session, probe) = test_session(0);
        let mut rx = session.subscribe();
        session.install_source(probe.source()).await;
        let frame_loop = FrameLoop::new(session.clone());

        for _ in 0..3 {
            frame_loop.cycle().await;
        }
        let at_pause = {
            let mut last = None;
            while let Ok(frame) = rx.try_recv() {
                last = Some(frame);
            }
            last.unwrap()
        };
        let index = session.frame_index().await;

        session.set_paused(true).await;
        for _ in 0..4 {
            assert_eq!(frame_loop.cycle().await, CycleOutcome::Replayed);
            assert_eq!(rx.recv().await.unwrap(), at_pause);
        }
        assert_eq!(session.frame_index().await, index);

        session.set_paused(false).await;
        assert_eq!(
            frame_loop.cycle().await,
            CycleOutcome::Captured { index, restarted: false }
        );
        // continues from the frame shown at pause time
        assert_eq!(red(&rx.recv().await.unwrap()), red(&at_pause) + 1);
    }

    #[tokio::test]
    async fn test_paused_before_first_capture_shows_placeholder() {
        let (session, probe) = test_session(0);
        let mut rx = session.subscribe();
        session.install_source(probe.source()).await;
        session.set_paused(true).await;

        let frame_loop = FrameLoop::new(session.clone());
        assert_eq!(frame_loop.cycle().await, CycleOutcome::Replayed);
        assert_eq!(rx.recv().await.unwrap(), session.placeholder());
    }

    #[tokio::test]
    async fn test_cycle_restart_resets_index_and_camera() {
        let (session, probe) = test_session(3);
        let _rx = session.subscribe();
        session.install_source(probe.source()).await;
        let frame_loop = FrameLoop::new(session.clone());

        frame_loop.cycle().await;
        let moved = session
            .apply_gesture(&GestureEvent::Rotate { dx: 30.0, dy: 10.0 })
            .await
            .unwrap();
        assert_ne!(moved, session.default_pose());

        frame_loop.cycle().await;
        assert_eq!(
            frame_loop.cycle().await,
            CycleOutcome::Captured { index: 2, restarted: true }
        );
        assert_eq!(session.frame_index().await, 0);
        assert_eq!(session.pose().await, session.default_pose());
        assert_eq!(probe.last_camera(), Some(session.default_pose()));
        assert_eq!(probe.restarts(), 1);

        assert_eq!(
            frame_loop.cycle().await,
            CycleOutcome::Captured { index: 0, restarted: false }
        );
    }

    #[tokio::test]
    async fn test_capture_failure_skips_cycle() {
        let (session, probe) = test_session(0);
        let mut rx = session.subscribe();
        session.install_source(probe.source()).await;
        let frame_loop = FrameLoop::new(session.clone());

        frame_loop.cycle().await;
        let good = rx.recv().await.unwrap();

        probe.fail_render(true);
        assert_eq!(frame_loop.cycle().await, CycleOutcome::Skipped);
        assert!(rx.try_recv().is_err());
        assert_eq!(session.current_frame().await, good);

        probe.fail_render(false);
        assert_eq!(
            frame_loop.cycle().await,
            CycleOutcome::Captured { index: 1, restarted: false }
        );
    }

    #[tokio::test]
    async fn test_encode_failure_skips_cycle() {
        let (session, probe) = test_session(0);
        let mut rx = session.subscribe();
        session.install_source(probe.source()).await;
        let frame_loop = FrameLoop::new(session.clone());

        frame_loop.cycle().await;
        frame_loop.cycle().await;
        rx.recv().await.unwrap();
        let good = rx.recv().await.unwrap();
        assert_eq!(red(&good), 1);

        probe.fail_encode(true);
        assert_eq!(frame_loop.cycle().await, CycleOutcome::Skipped);
        assert!(rx.try_recv().is_err());

        // late joiners and pause replays keep showing the last good frame
        assert_eq!(session.current_frame().await, good);
        session.set_paused(true).await;
        assert_eq!(frame_loop.cycle().await, CycleOutcome::Replayed);
        assert_eq!(rx.recv().await.unwrap(), good);
        session.set_paused(false).await;

        probe.fail_encode(false);
        assert!(matches!(frame_loop.cycle().await, CycleOutcome::Captured { .. }));
    }

    #[tokio::test]
    async fn test_rejected_camera_reset_keeps_pose_in_sync() {
        let (session, probe) = test_session(2);
        let _rx = session.subscribe();
        session.install_source(probe.source()).await;
        let frame_loop = FrameLoop::new(session.clone());

        frame_loop.cycle().await;
        let moved = session
            .apply_gesture(&GestureEvent::Pan { dx: 40.0, dy: 0.0 })
            .await
            .unwrap();

        probe.reject_camera(true);
        assert_eq!(
            frame_loop.cycle().await,
            CycleOutcome::Captured { index: 1, restarted: true }
        );
        // the source still renders the moved camera, so the session reports it too
        assert_eq!(probe.last_camera(), Some(moved));
        assert_eq!(session.pose().await, moved);

        probe.reject_camera(false);
        frame_loop.cycle().await;
        assert_eq!(
            frame_loop.cycle().await,
            CycleOutcome::Captured { index: 1, restarted: true }
        );
        assert_eq!(session.pose().await, session.default_pose());
        assert_eq!(probe.last_camera(), Some(session.default_pose()));
    }

    #[tokio::test]
    async fn test_idle_without_viewers() {
        let (session, probe) = test_session(0);
        session.install_source(probe.source()).await;
        let frame_loop = FrameLoop::new(session.clone());

        assert_eq!(frame_loop.cycle().await, CycleOutcome::Idle);
        assert_eq!(session.frame_index().await, 0);

        let _rx = session.subscribe();
        assert!(matches!(frame_loop.cycle().await, CycleOutcome::Captured { .. }));
    }

    #[tokio::test]
    async fn test_slow_viewer_drops_frames() {
        let (session, probe) = test_session(0);
        let mut slow = session.subscribe();
        session.install_source(probe.source()).await;
        let frame_loop = FrameLoop::new(session.clone());

        for _ in 0..20 {
            assert!(matches!(frame_loop.cycle().await, CycleOutcome::Captured { .. }));
        }
        // the producer never blocked; the viewer lost the oldest frames
        assert!(matches!(
            slow.recv().await,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_))
        ));
        assert_eq!(red(&slow.recv().await.unwrap()), 16);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (session, probe) = test_session(0);
        let mut rx = session.subscribe();
        let handle = FrameLoop::spawn(session.clone());

        // placeholder while pending
        assert_eq!(rx.recv().await.unwrap(), session.placeholder());

        session.install_source(probe.source()).await;
        // the first capture is black like the placeholder; wait for a later one
        loop {
            match rx.recv().await {
                Ok(frame) if frame != session.placeholder() => {
                    assert!(red(&frame) >= 1);
                    break;
                }
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(e) => panic!("frame channel closed: {}", e),
            }
        }

        session.shutdown().await;
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("frame loop did not stop")
            .unwrap();
        assert_eq!(probe.closes(), 1);
    }
}
