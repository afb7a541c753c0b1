//! Frame loop state machine

use crate::render::backends::vulkan::frame::{
    AcquireOutcome, FrameBackend, FrameState, PresentOutcome, MAX_FRAMES_IN_FLIGHT,
};
use crate::render::backends::vulkan::VulkanResult;

/// What one call to [`FrameOrchestrator::draw_frame`] ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Image presented, chain still valid
    Presented,
    /// Image presented, then the swapchain was rebuilt
    Recreated,
    /// Acquire found the chain out of date; it was rebuilt and nothing was submitted
    Abandoned,
}

/// Drives frame slots through the wait-acquire-record-submit-present cycle
#[derive(Debug, Default)]
pub struct FrameOrchestrator {
    current_frame: usize,
    states: [FrameState; MAX_FRAMES_IN_FLIGHT],
    frames_presented: u64,
}

impl FrameOrchestrator {
    /// All slots idle, starting at slot 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot the next frame will use
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// State of `slot`
    pub fn state(&self, slot: usize) -> FrameState {
        self.states[slot % MAX_FRAMES_IN_FLIGHT]
    }

    /// Number of frames that reached presentation
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    fn enter(&mut self, slot: usize, state: FrameState) {
        log::trace!("frame slot {}: {:?} -> {:?}", slot, self.states[slot], state);
        self.states[slot] = state;
    }

    /// Run one frame
    ///
    /// `resized` is the window's framebuffer-resized flag; when set, the
    /// swapchain is rebuilt after presenting. Errors from the backend are
    /// returned as-is and leave the slot where it failed.
    pub fn draw_frame<B>(&mut self, backend: &mut B, scene: &B::Scene, resized: bool) -> VulkanResult<FrameOutcome>
    where
        B: FrameBackend + ?Sized,
    {
        let slot = self.current_frame;

        self.enter(slot, FrameState::Acquiring);
        backend.wait_for_slot(slot)?;

        let image_index = match backend.acquire_image(slot)? {
            AcquireOutcome::Acquired { image_index, .. } => image_index,
            AcquireOutcome::OutOfDate => {
                log::warn!("Swapchain out of date on acquire, recreating");
                self.enter(slot, FrameState::Idle);
                backend.recreate_swapchain()?;
                return Ok(FrameOutcome::Abandoned);
            }
        };

        // A submission is now guaranteed, so the fence may be reset
        backend.reset_slot_fence(slot)?;

        self.enter(slot, FrameState::Recording);
        backend.record(slot, image_index, scene)?;

        backend.submit(slot)?;
        self.enter(slot, FrameState::Submitted);

        self.enter(slot, FrameState::Presenting);
        let presented = backend.present(slot, image_index)?;
        self.frames_presented += 1;
        self.enter(slot, FrameState::Idle);

        let outcome = if presented == PresentOutcome::Stale || resized {
            log::warn!("Swapchain stale after present (resized: {}), recreating", resized);
            backend.recreate_swapchain()?;
            FrameOutcome::Recreated
        } else {
            FrameOutcome::Presented
        };

        self.current_frame = (slot + 1) % MAX_FRAMES_IN_FLIGHT;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::VulkanError;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        Wait(usize),
        Acquire(usize),
        ResetFence(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate,
    }

    /// Simulates fences and a swapchain with three images
    struct MockBackend {
        ops: Vec<Op>,
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        fence_signaled: [bool; MAX_FRAMES_IN_FLIGHT],
        in_flight: [bool; MAX_FRAMES_IN_FLIGHT],
        next_image: u32,
        fail_record: bool,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                ops: Vec::new(),
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                fence_signaled: [true; MAX_FRAMES_IN_FLIGHT],
                in_flight: [false; MAX_FRAMES_IN_FLIGHT],
                next_image: 0,
                fail_record: false,
            }
        }

        fn outstanding(&self) -> usize {
            self.in_flight.iter().filter(|&&busy| busy).count()
        }

        fn count(&self, wanted: fn(&Op) -> bool) -> usize {
            self.ops.iter().filter(|op| wanted(op)).count()
        }
    }

    impl FrameBackend for MockBackend {
        type Scene = ();

        fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.ops.push(Op::Wait(slot));
            // The GPU retires the slot's work
            self.fence_signaled[slot] = true;
            self.in_flight[slot] = false;
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
            self.ops.push(Op::Acquire(slot));
            let outcome = self.acquires.pop_front().unwrap_or(AcquireOutcome::Acquired {
                image_index: self.next_image,
                suboptimal: false,
            });
            self.next_image = (self.next_image + 1) % 3;
            Ok(outcome)
        }

        fn reset_slot_fence(&mut self, slot: usize) -> VulkanResult<()> {
            assert!(self.fence_signaled[slot], "fence of slot {} reset while unsignaled", slot);
            self.ops.push(Op::ResetFence(slot));
            self.fence_signaled[slot] = false;
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32, _scene: &()) -> VulkanResult<()> {
            assert!(!self.in_flight[slot], "command buffer of slot {} reset while in flight", slot);
            self.ops.push(Op::Record(slot, image_index));
            if self.fail_record {
                return Err(VulkanError::InvalidOperation {
                    reason: "record failed".into(),
                });
            }
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> VulkanResult<()> {
            self.ops.push(Op::Submit(slot));
            self.in_flight[slot] = true;
            assert!(self.outstanding() <= MAX_FRAMES_IN_FLIGHT);
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
            self.ops.push(Op::Present(slot, image_index));
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn recreate_swapchain(&mut self) -> VulkanResult<()> {
            self.ops.push(Op::Recreate);
            Ok(())
        }
    }

    #[test]
    fn slots_alternate_and_fences_are_waited_before_reuse() {
        let mut backend = MockBackend::new();
        let mut orchestrator = FrameOrchestrator::new();

        for _ in 0..6 {
            let outcome = orchestrator.draw_frame(&mut backend, &(), false).expect("frame");
            assert_eq!(outcome, FrameOutcome::Presented);
        }

        let recorded: Vec<usize> = backend
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Record(slot, _) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(recorded, [0, 1, 0, 1, 0, 1]);
        assert_eq!(orchestrator.frames_presented(), 6);

        // Between a slot's submit and its next record there is a wait on that slot
        for (i, op) in backend.ops.iter().enumerate() {
            if let Op::Record(slot, _) = *op {
                let last_submit = backend.ops[..i].iter().rposition(|o| *o == Op::Submit(slot));
                let last_wait = backend.ops[..i].iter().rposition(|o| *o == Op::Wait(slot));
                if let Some(submit) = last_submit {
                    assert!(last_wait.is_some_and(|wait| wait > submit));
                }
            }
        }
    }

    #[test]
    fn each_frame_follows_the_fixed_step_order() {
        let mut backend = MockBackend::new();
        let mut orchestrator = FrameOrchestrator::new();

        orchestrator.draw_frame(&mut backend, &(), false).expect("frame");

        assert_eq!(
            backend.ops,
            [
                Op::Wait(0),
                Op::Acquire(0),
                Op::ResetFence(0),
                Op::Record(0, 0),
                Op::Submit(0),
                Op::Present(0, 0),
            ]
        );
        assert_eq!(orchestrator.state(0), FrameState::Idle);
        assert_eq!(orchestrator.current_frame(), 1);
    }

    #[test]
    fn out_of_date_acquire_abandons_the_frame() {
        let mut backend = MockBackend::new();
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut orchestrator = FrameOrchestrator::new();

        let outcome = orchestrator.draw_frame(&mut backend, &(), false).expect("frame");

        assert_eq!(outcome, FrameOutcome::Abandoned);
        assert_eq!(backend.ops, [Op::Wait(0), Op::Acquire(0), Op::Recreate]);
        assert_eq!(backend.count(|op| matches!(op, Op::ResetFence(_))), 0);
        assert_eq!(backend.count(|op| matches!(op, Op::Submit(_))), 0);
        assert!(backend.fence_signaled[0]);

        orchestrator.draw_frame(&mut backend, &(), false).expect("retry");

        let recreate = backend.ops.iter().position(|op| *op == Op::Recreate);
        let next_acquire = backend.ops.iter().rposition(|op| matches!(op, Op::Acquire(_)));
        assert!(recreate < next_acquire);
        assert_eq!(backend.ops[3], Op::Wait(0));
    }

    #[test]
    fn stale_present_recreates_and_still_advances() {
        let mut backend = MockBackend::new();
        backend.presents.push_back(PresentOutcome::Stale);
        let mut orchestrator = FrameOrchestrator::new();

        let outcome = orchestrator.draw_frame(&mut backend, &(), false).expect("frame");

        assert_eq!(outcome, FrameOutcome::Recreated);
        assert_eq!(backend.ops.last(), Some(&Op::Recreate));
        assert_eq!(orchestrator.current_frame(), 1);
    }

    #[test]
    fn resize_flag_forces_recreation() {
        let mut backend = MockBackend::new();
        let mut orchestrator = FrameOrchestrator::new();

        assert_eq!(
            orchestrator.draw_frame(&mut backend, &(), true).expect("frame"),
            FrameOutcome::Recreated
        );
        assert_eq!(backend.count(|op| *op == Op::Recreate), 1);
    }

    #[test]
    fn backend_errors_propagate() {
        let mut backend = MockBackend::new();
        backend.fail_record = true;
        let mut orchestrator = FrameOrchestrator::new();

        let result = orchestrator.draw_frame(&mut backend, &(), false);

        assert!(result.is_err());
        assert_eq!(backend.count(|op| matches!(op, Op::Submit(_))), 0);
        assert_eq!(orchestrator.state(0), FrameState::Recording);
        assert_eq!(orchestrator.frames_presented(), 0);
    }
}
