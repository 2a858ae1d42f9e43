//! Per-frame render driver
//!
//! One frame is the fixed sequence
//! `WaitFence → AcquireImage → Record → Submit → Present`, with any step
//! able to divert into an error or a swapchain rebuild. [`FrameLoop`] owns
//! the loop-level state (cancellation, frame counter, fence timeout) and
//! drives the sequence against a [`FrameBackend`], the seam between the
//! ordering discipline and the actual Vulkan calls.
//!
//! The discipline the driver enforces:
//! - the frame fence is waited on before anything else touches the frame's
//!   command buffer, and reset only after both the wait and the acquire
//!   succeeded, immediately before submit — never earlier
//! - a timed-out wait is surfaced without resetting anything, so the caller
//!   just calls [`FrameLoop::render`] again
//! - an out-of-date signal from acquire or present triggers a rebuild of
//!   the swapchain-dependent objects and is reported, never swallowed
//! - a set [`CancelToken`] stops the frame after the fence wait, before any
//!   new work is submitted

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::context::VulkanResult;

/// What the acquire step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available at this swapchain index
    Acquired(u32),
    /// The swapchain no longer matches the surface
    OutOfDate,
}

/// What the present step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was queued for presentation
    Presented,
    /// The swapchain no longer matches the surface
    OutOfDate,
    /// Presented, but the swapchain is a stale fit for the surface
    Suboptimal,
}

/// How a call to [`FrameLoop::render`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A full acquire/record/submit/present cycle completed
    Rendered,
    /// The swapchain was rebuilt instead of (or after) presenting
    SwapchainRebuilt,
    /// The cancel token was set; no new work was submitted
    Cancelled,
}

/// Shared flag that asks the frame loop to stop after its current fence
/// wait. Cloneable; any clone can cancel.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The Vulkan side of one frame, as the driver sees it.
///
/// Implemented by [`crate::renderer::Renderer`] over real objects and by
/// mock backends in tests.
pub trait FrameBackend {
    /// Block on the in-flight frame fence with a bounded timeout.
    fn wait_frame_fence(&mut self, timeout_ns: u64) -> VulkanResult<()>;

    /// Reset the in-flight fence to unsignaled. Called by the driver only
    /// after a successful wait and acquire.
    fn reset_frame_fence(&mut self) -> VulkanResult<()>;

    /// Acquire the next swapchain image, signaling the image-available
    /// semaphore.
    fn acquire_image(&mut self) -> VulkanResult<AcquireOutcome>;

    /// Re-record the frame's command buffer targeting `image_index`.
    fn record_commands(&mut self, image_index: u32) -> VulkanResult<()>;

    /// Submit the recorded buffer: waits on image-available at the
    /// color-attachment-output stage, signals render-finished and the frame
    /// fence.
    fn submit_commands(&mut self) -> VulkanResult<()>;

    /// Present `image_index`, waiting on render-finished.
    fn present_image(&mut self, image_index: u32) -> VulkanResult<PresentOutcome>;

    /// Rebuild the swapchain and its dependent objects (images,
    /// framebuffers); the instance, device, and surface stay.
    fn rebuild_swapchain(&mut self) -> VulkanResult<()>;
}

/// Explicit frame-loop context: cancellation, pacing bound, and counters.
/// Owned by the caller and handed the backend by reference each frame.
pub struct FrameLoop {
    cancel: CancelToken,
    fence_timeout_ns: u64,
    frames_rendered: u64,
}

impl FrameLoop {
    /// Create a frame loop with the given fence-wait bound.
    pub fn new(fence_timeout_ns: u64) -> Self {
        Self {
            cancel: CancelToken::new(),
            fence_timeout_ns,
            frames_rendered: 0,
        }
    }

    /// A token that cancels this loop
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Number of frames fully submitted so far
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Drive one frame through the backend.
    ///
    /// Returns [`FrameOutcome::Cancelled`] once the token is set,
    /// [`FrameOutcome::SwapchainRebuilt`] when acquire or present reported
    /// the swapchain stale, and propagates
    /// [`crate::context::VulkanError::FenceWaitTimeout`] untouched so the
    /// caller can retry the wait.
    pub fn render(&mut self, backend: &mut impl FrameBackend) -> VulkanResult<FrameOutcome> {
        backend.wait_frame_fence(self.fence_timeout_ns)?;

        if self.cancel.is_cancelled() {
            log::debug!("Frame loop cancelled after {} frames", self.frames_rendered);
            return Ok(FrameOutcome::Cancelled);
        }

        let image_index = match backend.acquire_image()? {
            AcquireOutcome::Acquired(index) => index,
            AcquireOutcome::OutOfDate => {
                log::debug!("Swapchain out of date during acquire; rebuilding");
                backend.rebuild_swapchain()?;
                return Ok(FrameOutcome::SwapchainRebuilt);
            }
        };

        backend.record_commands(image_index)?;

        // The fence guards the command buffer just recorded; unsignal it
        // only now that a submit is certain to follow.
        backend.reset_frame_fence()?;
        backend.submit_commands()?;
        self.frames_rendered += 1;

        match backend.present_image(image_index)? {
            PresentOutcome::Presented => Ok(FrameOutcome::Rendered),
            PresentOutcome::OutOfDate | PresentOutcome::Suboptimal => {
                log::debug!("Swapchain stale at present; rebuilding");
                backend.rebuild_swapchain()?;
                Ok(FrameOutcome::SwapchainRebuilt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VulkanError;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        Wait,
        Reset,
        Acquire,
        Record,
        Submit,
        Present,
        Rebuild,
    }

    /// Backend double with a one-slot fence model: submit signals the fence
    /// "instantly" (the simulated GPU finishes by the time the next wait
    /// runs), and every step asserts the discipline the real API demands.
    struct MockBackend {
        fence_signaled: bool,
        ops: Vec<Op>,
        acquire_results: VecDeque<AcquireOutcome>,
        present_results: VecDeque<PresentOutcome>,
        next_image: u32,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                // Frame fences are created signaled.
                fence_signaled: true,
                ops: Vec::new(),
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                next_image: 0,
            }
        }

        fn ops_per_frame(&self) -> Vec<&[Op]> {
            self.ops.split(|&op| op == Op::Present).collect()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_frame_fence(&mut self, timeout_ns: u64) -> VulkanResult<()> {
            self.ops.push(Op::Wait);
            if self.fence_signaled {
                Ok(())
            } else {
                Err(VulkanError::FenceWaitTimeout { timeout_ns })
            }
        }

        fn reset_frame_fence(&mut self) -> VulkanResult<()> {
            assert!(
                self.fence_signaled,
                "fence reset before its wait completed"
            );
            self.ops.push(Op::Reset);
            self.fence_signaled = false;
            Ok(())
        }

        fn acquire_image(&mut self) -> VulkanResult<AcquireOutcome> {
            self.ops.push(Op::Acquire);
            let outcome = self
                .acquire_results
                .pop_front()
                .unwrap_or(AcquireOutcome::Acquired(self.next_image));
            if let AcquireOutcome::Acquired(_) = outcome {
                self.next_image = (self.next_image + 1) % 2;
            }
            Ok(outcome)
        }

        fn record_commands(&mut self, _image_index: u32) -> VulkanResult<()> {
            assert!(
                self.fence_signaled,
                "command buffer re-recorded while its fence was unsignaled"
            );
            self.ops.push(Op::Record);
            Ok(())
        }

        fn submit_commands(&mut self) -> VulkanResult<()> {
            assert!(
                !self.fence_signaled,
                "submit without resetting the frame fence first"
            );
            self.ops.push(Op::Submit);
            // Simulated GPU completes immediately.
            self.fence_signaled = true;
            Ok(())
        }

        fn present_image(&mut self, _image_index: u32) -> VulkanResult<PresentOutcome> {
            self.ops.push(Op::Present);
            Ok(self
                .present_results
                .pop_front()
                .unwrap_or(PresentOutcome::Presented))
        }

        fn rebuild_swapchain(&mut self) -> VulkanResult<()> {
            self.ops.push(Op::Rebuild);
            Ok(())
        }
    }

    #[test]
    fn frame_follows_the_fixed_sequence() {
        let mut backend = MockBackend::new();
        let mut frame_loop = FrameLoop::new(1_000_000_000);

        let outcome = frame_loop.render(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::Rendered);
        assert_eq!(
            backend.ops,
            [Op::Wait, Op::Acquire, Op::Record, Op::Reset, Op::Submit, Op::Present]
        );
    }

    #[test]
    fn ten_frames_complete_without_fence_misuse() {
        // Swapchain of 2 images, one frame slot: the mock asserts on every
        // wait/record/reset/submit that the fence discipline holds.
        let mut backend = MockBackend::new();
        let mut frame_loop = FrameLoop::new(1_000_000_000);

        for _ in 0..10 {
            let outcome = frame_loop.render(&mut backend).unwrap();
            assert_eq!(outcome, FrameOutcome::Rendered);
        }

        assert_eq!(frame_loop.frames_rendered(), 10);
        for frame_ops in backend.ops_per_frame() {
            if frame_ops.is_empty() {
                continue; // trailing split entry
            }
            assert_eq!(
                frame_ops,
                [Op::Wait, Op::Acquire, Op::Record, Op::Reset, Op::Submit]
            );
        }
    }

    #[test]
    fn timed_out_wait_is_surfaced_and_retryable() {
        let mut backend = MockBackend::new();
        backend.fence_signaled = false;
        let mut frame_loop = FrameLoop::new(5);

        let result = frame_loop.render(&mut backend);
        assert!(matches!(
            result,
            Err(VulkanError::FenceWaitTimeout { timeout_ns: 5 })
        ));
        // Nothing past the wait ran, and the fence was not reset.
        assert_eq!(backend.ops, [Op::Wait]);

        // Simulate the GPU finishing; the retried wait proceeds normally.
        backend.fence_signaled = true;
        let outcome = frame_loop.render(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::Rendered);
    }

    #[test]
    fn out_of_date_acquire_rebuilds_without_submitting() {
        let mut backend = MockBackend::new();
        backend.acquire_results.push_back(AcquireOutcome::OutOfDate);
        let mut frame_loop = FrameLoop::new(1_000_000_000);

        let outcome = frame_loop.render(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::SwapchainRebuilt);
        assert_eq!(backend.ops, [Op::Wait, Op::Acquire, Op::Rebuild]);
        // The fence is still signaled, so the next frame can proceed.
        assert!(backend.fence_signaled);
        assert_eq!(frame_loop.frames_rendered(), 0);
    }

    #[test]
    fn out_of_date_present_is_not_swallowed() {
        let mut backend = MockBackend::new();
        backend.present_results.push_back(PresentOutcome::OutOfDate);
        let mut frame_loop = FrameLoop::new(1_000_000_000);

        let outcome = frame_loop.render(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::SwapchainRebuilt);
        assert_eq!(
            backend.ops,
            [Op::Wait, Op::Acquire, Op::Record, Op::Reset, Op::Submit, Op::Present, Op::Rebuild]
        );
    }

    #[test]
    fn suboptimal_present_also_rebuilds() {
        let mut backend = MockBackend::new();
        backend
            .present_results
            .push_back(PresentOutcome::Suboptimal);
        let mut frame_loop = FrameLoop::new(1_000_000_000);

        let outcome = frame_loop.render(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::SwapchainRebuilt);
        assert_eq!(*backend.ops.last().unwrap(), Op::Rebuild);
    }

    #[test]
    fn cancellation_stops_after_the_fence_wait() {
        let mut backend = MockBackend::new();
        let mut frame_loop = FrameLoop::new(1_000_000_000);
        frame_loop.cancel_token().cancel();

        let outcome = frame_loop.render(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::Cancelled);
        // The wait completed, then nothing else ran: no acquire, no
        // submission to cancel mid-flight, no present.
        assert_eq!(backend.ops, [Op::Wait]);
    }

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());

        clone.cancel();
        assert!(token.is_cancelled());
    }
}
