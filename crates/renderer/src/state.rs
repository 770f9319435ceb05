use std::time::Duration;

use gfx_hal::FenceWait;

use crate::error::{RendererError, Result};

/// Lifecycle of a [`crate::VulkanRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    /// Device, swapchain and render pass exist; command buffers are missing or stale.
    Initialized,
    CommandBuffersRecorded,
    Rendering,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Init,
    Record,
    Frame,
    /// Surfaces or the swapchain changed, so recorded commands no longer match.
    Invalidate,
    Terminate,
}

impl RendererState {
    /// The state after `event`, or `None` when the event is not allowed here.
    pub fn next(self, event: StateEvent) -> Option<Self> {
        use RendererState::*;
        use StateEvent::*;

        match (self, event) {
            (Uninitialized, Init) => Some(Initialized),
            (Initialized | CommandBuffersRecorded | Rendering, Record) => {
                Some(CommandBuffersRecorded)
            }
            (CommandBuffersRecorded | Rendering, Frame) => Some(Rendering),
            (Initialized | CommandBuffersRecorded | Rendering, Invalidate) => Some(Initialized),
            (Uninitialized, Invalidate) => Some(Uninitialized),
            (_, Terminate) => Some(Terminated),
            _ => None,
        }
    }

    /// Whether device resources can be created.
    pub fn has_device(self) -> bool {
        matches!(
            self,
            RendererState::Initialized
                | RendererState::CommandBuffersRecorded
                | RendererState::Rendering
        )
    }
}

/// Applies `event` to `state` in place, or reports `operation` as invalid.
pub(crate) fn advance(
    state: &mut RendererState,
    event: StateEvent,
    operation: &'static str,
) -> Result<()> {
    match state.next(event) {
        Some(next) => {
            if next != *state {
                tracing::trace!("Renderer state {:?} -> {:?}", state, next);
            }
            *state = next;
            Ok(())
        }
        None => Err(RendererError::InvalidState {
            operation,
            state: *state,
        }),
    }
}

/// Teardown steps, each releasing objects that nothing destroyed later depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStage {
    CommandBuffers,
    CommandPool,
    RenderPass,
    /// Framebuffers, the swapchain with its image views, and every surface's
    /// per-image uniform buffers.
    Swapchain,
    Pipelines,
    GeometryBuffers,
    Textures,
    Descriptors,
    /// Sync objects, allocator, surface, device, debug messenger and instance.
    Context,
}

pub const TEARDOWN_ORDER: [TeardownStage; 9] = [
    TeardownStage::CommandBuffers,
    TeardownStage::CommandPool,
    TeardownStage::RenderPass,
    TeardownStage::Swapchain,
    TeardownStage::Pipelines,
    TeardownStage::GeometryBuffers,
    TeardownStage::Textures,
    TeardownStage::Descriptors,
    TeardownStage::Context,
];

/// Calls `wait` with `timeout` until it reports the fence signaled.
///
/// Each timeout is logged and retried; after `retry_limit` retries the wait gives up
/// with [`RendererError::FenceTimeout`]. Returns the number of timeouts seen.
pub fn wait_with_retry<F>(timeout: Duration, retry_limit: u32, mut wait: F) -> Result<u32>
where
    F: FnMut(Duration) -> Result<FenceWait>,
{
    let mut timeouts = 0;
    loop {
        match wait(timeout)? {
            FenceWait::Signaled => return Ok(timeouts),
            FenceWait::TimedOut => {
                timeouts += 1;
                if timeouts > retry_limit {
                    tracing::error!(
                        "Render fence not signaled after {} waits of {:?}.",
                        timeouts,
                        timeout
                    );
                    return Err(RendererError::FenceTimeout { attempts: timeouts });
                }
                tracing::warn!(
                    "Render fence wait timed out after {:?} (retry {}/{}).",
                    timeout,
                    timeouts,
                    retry_limit
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle() {
        let mut state = RendererState::Uninitialized;
        for (event, expected) in [
            (StateEvent::Init, RendererState::Initialized),
            (StateEvent::Record, RendererState::CommandBuffersRecorded),
            (StateEvent::Frame, RendererState::Rendering),
            (StateEvent::Frame, RendererState::Rendering),
            (StateEvent::Terminate, RendererState::Terminated),
        ] {
            advance(&mut state, event, "test").unwrap();
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        assert_eq!(RendererState::Uninitialized.next(StateEvent::Frame), None);
        assert_eq!(RendererState::Uninitialized.next(StateEvent::Record), None);
        assert_eq!(RendererState::Initialized.next(StateEvent::Frame), None);
        assert_eq!(RendererState::Terminated.next(StateEvent::Init), None);
        assert_eq!(RendererState::Terminated.next(StateEvent::Record), None);
        assert_eq!(RendererState::Rendering.next(StateEvent::Init), None);

        let mut state = RendererState::Terminated;
        let err = advance(&mut state, StateEvent::Frame, "render_frame").unwrap_err();
        assert!(matches!(
            err,
            RendererError::InvalidState {
                operation: "render_frame",
                state: RendererState::Terminated
            }
        ));
    }

    #[test]
    fn invalidate_forces_rerecord() {
        let state = RendererState::Rendering
            .next(StateEvent::Invalidate)
            .unwrap();
        assert_eq!(state, RendererState::Initialized);
        assert_eq!(state.next(StateEvent::Frame), None);
        assert_eq!(
            state.next(StateEvent::Record),
            Some(RendererState::CommandBuffersRecorded)
        );
    }

    #[test]
    fn terminate_is_idempotent() {
        assert_eq!(
            RendererState::Terminated.next(StateEvent::Terminate),
            Some(RendererState::Terminated)
        );
        assert_eq!(
            RendererState::Uninitialized.next(StateEvent::Terminate),
            Some(RendererState::Terminated)
        );
    }

    #[test]
    fn teardown_releases_dependents_first() {
        let position = |stage| TEARDOWN_ORDER.iter().position(|&s| s == stage).unwrap();

        assert_eq!(TEARDOWN_ORDER[0], TeardownStage::CommandBuffers);
        assert!(position(TeardownStage::CommandBuffers) < position(TeardownStage::CommandPool));
        assert!(position(TeardownStage::RenderPass) < position(TeardownStage::Swapchain));
        assert!(position(TeardownStage::Swapchain) < position(TeardownStage::Pipelines));
        assert!(position(TeardownStage::Pipelines) < position(TeardownStage::Descriptors));
        assert!(position(TeardownStage::Textures) < position(TeardownStage::Descriptors));
        assert_eq!(TEARDOWN_ORDER[TEARDOWN_ORDER.len() - 1], TeardownStage::Context);

        for (i, stage) in TEARDOWN_ORDER.iter().enumerate() {
            assert!(!TEARDOWN_ORDER[i + 1..].contains(stage));
        }
    }

    #[test]
    fn fence_timeouts_are_retried() {
        let mut results =
            vec![FenceWait::TimedOut, FenceWait::TimedOut, FenceWait::Signaled].into_iter();
        let timeouts = wait_with_retry(Duration::from_millis(100), 3, |timeout| {
            assert_eq!(timeout, Duration::from_millis(100));
            Ok(results.next().unwrap())
        })
        .unwrap();
        assert_eq!(timeouts, 2);
    }

    #[test]
    fn fence_gives_up_after_limit() {
        let mut calls = 0;
        let err = wait_with_retry(Duration::from_millis(1), 2, |_| {
            calls += 1;
            Ok(FenceWait::TimedOut)
        })
        .unwrap_err();
        assert!(matches!(err, RendererError::FenceTimeout { attempts: 3 }));
        assert_eq!(calls, 3);
    }
}
