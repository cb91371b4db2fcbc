// =============================================================================
// FRAME SCHEDULER - per-frame acquire / record / submit / present protocol
// =============================================================================
//
// The scheduler owns no GPU objects. It drives a FrameBackend through the
// frame-slot state machine
//
//     Idle -> Acquiring -> Recording -> Submitted -> (fence signaled) -> Idle
//
// and decides when the swapchain must be rebuilt. Keeping it generic lets the
// protocol run against a scripted backend in tests.

use anyhow::Result;

/// Frame slots, i.e. the maximum number of submissions in flight
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Result of asking the swapchain for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready { image_index: u32, suboptimal: bool },
    /// The chain no longer matches the surface; nothing was acquired
    OutOfDate,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented (or dropped) but the chain is suboptimal or out of date
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Recorded, submitted and handed to the presentation engine
    Drawn,
    /// Acquire reported out-of-date; the chain was rebuilt, nothing drawn
    Skipped,
}

/// GPU side of a frame. Every method addresses one frame slot; slot indices
/// are always below MAX_FRAMES_IN_FLIGHT.
pub trait FrameBackend {
    type Uniforms;

    /// Block until the slot's previous submission has completed
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome>;
    fn reset_slot_fence(&mut self, slot: usize) -> Result<()>;
    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;
    fn update_uniforms(&mut self, slot: usize, uniforms: &Self::Uniforms) -> Result<()>;
    fn submit(&mut self, slot: usize) -> Result<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;
    fn wait_idle(&mut self) -> Result<()>;
    /// Replace every swapchain-dependent object for the given framebuffer size
    fn rebuild(&mut self, framebuffer_size: (u32, u32)) -> Result<()>;
    /// Extent of the current swapchain
    fn extent(&self) -> (u32, u32);
}

/// Window side of a frame
pub trait SurfaceProvider {
    /// Current drawable size in pixels; zero in either dimension when minimized
    fn framebuffer_size(&self) -> (u32, u32);
    /// Read and clear the sticky resize flag
    fn take_resized(&mut self) -> bool;
    /// Block until at least one window event has been processed
    fn wait_events(&mut self);
    fn should_close(&self) -> bool;
}

pub struct FrameScheduler {
    current: usize,
    states: [SlotState; MAX_FRAMES_IN_FLIGHT],
    frames_drawn: u64,
    rebuilds: u64,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            current: 0,
            states: [SlotState::Idle; MAX_FRAMES_IN_FLIGHT],
            frames_drawn: 0,
            rebuilds: 0,
        }
    }

    /// Slots whose submission has not been confirmed complete by a fence wait
    pub fn in_flight(&self) -> usize {
        self.states.iter().filter(|&&s| s == SlotState::Submitted).count()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Run one iteration of the frame protocol.
    ///
    /// `make_uniforms` receives the current swapchain extent and produces this
    /// frame's uniform payload.
    pub fn run_frame<B, S, F>(&mut self, backend: &mut B, surface: &mut S, make_uniforms: F) -> Result<FrameStatus>
    where
        B: FrameBackend,
        S: SurfaceProvider,
        F: FnOnce((u32, u32)) -> B::Uniforms,
    {
        let slot = self.current;

        // 1. The slot's previous submission must be done before anything in
        //    it is touched again
        backend.wait_for_slot(slot)?;
        self.states[slot] = SlotState::Idle;

        // 2. Acquire
        self.states[slot] = SlotState::Acquiring;
        let (image_index, suboptimal) = match backend.acquire(slot)? {
            AcquireOutcome::Ready { image_index, suboptimal } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                // Fence untouched, so the next wait on this slot still returns
                self.states[slot] = SlotState::Idle;
                log::debug!("Acquire reported out-of-date, rebuilding");
                self.rebuild(backend, surface)?;
                return Ok(FrameStatus::Skipped);
            }
        };

        // 3. Only now is the fence guaranteed to be signaled again by a submit
        backend.reset_slot_fence(slot)?;

        // 4. Record
        self.states[slot] = SlotState::Recording;
        backend.record(slot, image_index)?;

        // 5. Uniforms for this slot's buffer
        let uniforms = make_uniforms(backend.extent());
        backend.update_uniforms(slot, &uniforms)?;

        // 6. Submit
        debug_assert!(self.in_flight() < MAX_FRAMES_IN_FLIGHT);
        backend.submit(slot)?;
        self.states[slot] = SlotState::Submitted;
        self.frames_drawn += 1;

        // 7. Present; the resize flag is always consumed here
        let stale = backend.present(slot, image_index)? == PresentOutcome::Stale;
        let resized = surface.take_resized();
        if stale || suboptimal || resized {
            log::debug!(
                "Rebuilding after present (stale={}, suboptimal={}, resized={})",
                stale,
                suboptimal,
                resized
            );
            self.rebuild(backend, surface)?;
        }

        // 8. Advance
        self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;

        Ok(FrameStatus::Drawn)
    }

    /// Wait out a minimized window, drain the GPU, and rebuild the
    /// swapchain-dependent objects. Returns false when the window was closed
    /// while minimized; nothing is rebuilt in that case.
    pub fn rebuild<B, S>(&mut self, backend: &mut B, surface: &mut S) -> Result<bool>
    where
        B: FrameBackend,
        S: SurfaceProvider,
    {
        let mut size = surface.framebuffer_size();
        while size.0 == 0 || size.1 == 0 {
            if surface.should_close() {
                return Ok(false);
            }
            surface.wait_events();
            size = surface.framebuffer_size();
        }

        backend.wait_idle()?;
        // Device idle: every outstanding submission has completed
        for state in &mut self.states {
            *state = SlotState::Idle;
        }

        backend.rebuild(size)?;
        // Resize events pumped while waiting are covered by this rebuild
        surface.take_resized();
        self.rebuilds += 1;
        log::info!("Swapchain rebuilt for {}x{}", size.0, size.1);

        Ok(true)
    }
}

#[cfg(test)]
impl FrameScheduler {
    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.states[slot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Record(usize, u32),
        Uniforms(usize, u64),
        Submit(usize),
        Present(usize, u32),
        WaitIdle,
        Rebuild(u32, u32),
    }

    /// Scripted GPU: fences complete only when waited on, images are handed
    /// out round-robin unless a result is scripted
    struct MockBackend {
        calls: Vec<Call>,
        fence_signaled: [bool; MAX_FRAMES_IN_FLIGHT],
        pending: usize,
        max_pending: usize,
        image_count: u32,
        view_count: u32,
        next_image: u32,
        extent: (u32, u32),
        acquire_script: VecDeque<AcquireOutcome>,
        present_script: VecDeque<PresentOutcome>,
    }

    impl MockBackend {
        fn new(extent: (u32, u32)) -> Self {
            Self {
                calls: Vec::new(),
                fence_signaled: [true; MAX_FRAMES_IN_FLIGHT],
                pending: 0,
                max_pending: 0,
                image_count: 3,
                view_count: 3,
                next_image: 0,
                extent,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
            }
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }

        fn position(&self, call: Call) -> Option<usize> {
            self.calls.iter().position(|&c| c == call)
        }
    }

    impl FrameBackend for MockBackend {
        type Uniforms = u64;

        fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Wait(slot));
            if !self.fence_signaled[slot] {
                self.fence_signaled[slot] = true;
                self.pending -= 1;
            }
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            if let Some(outcome) = self.acquire_script.pop_front() {
                return Ok(outcome);
            }
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(AcquireOutcome::Ready { image_index, suboptimal: false })
        }

        fn reset_slot_fence(&mut self, slot: usize) -> Result<()> {
            assert!(self.fence_signaled[slot], "reset of an unsignaled fence");
            self.calls.push(Call::Reset(slot));
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
            self.calls.push(Call::Record(slot, image_index));
            Ok(())
        }

        fn update_uniforms(&mut self, slot: usize, uniforms: &u64) -> Result<()> {
            self.calls.push(Call::Uniforms(slot, *uniforms));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Submit(slot));
            self.fence_signaled[slot] = false;
            self.pending += 1;
            self.max_pending = self.max_pending.max(self.pending);
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self.present_script.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn wait_idle(&mut self) -> Result<()> {
            self.calls.push(Call::WaitIdle);
            self.fence_signaled = [true; MAX_FRAMES_IN_FLIGHT];
            self.pending = 0;
            Ok(())
        }

        fn rebuild(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
            self.calls.push(Call::Rebuild(framebuffer_size.0, framebuffer_size.1));
            self.extent = framebuffer_size;
            self.image_count = 3;
            self.view_count = 3;
            self.next_image = 0;
            Ok(())
        }

        fn extent(&self) -> (u32, u32) {
            self.extent
        }
    }

    /// Scripted window: `wait_events` steps through queued sizes
    struct MockSurface {
        size: (u32, u32),
        queued_sizes: VecDeque<(u32, u32)>,
        resized: bool,
        close: bool,
        waits: usize,
    }

    impl MockSurface {
        fn new(size: (u32, u32)) -> Self {
            Self {
                size,
                queued_sizes: VecDeque::new(),
                resized: false,
                close: false,
                waits: 0,
            }
        }

        fn resize(&mut self, size: (u32, u32)) {
            self.size = size;
            self.resized = true;
        }
    }

    impl SurfaceProvider for MockSurface {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.size
        }

        fn take_resized(&mut self) -> bool {
            std::mem::take(&mut self.resized)
        }

        fn wait_events(&mut self) {
            self.waits += 1;
            // Like winit, a size change arrives as a resize event
            match self.queued_sizes.pop_front() {
                Some(size) => {
                    if size != self.size {
                        self.resized = true;
                    }
                    self.size = size;
                }
                None => self.close = true,
            }
        }

        fn should_close(&self) -> bool {
            self.close
        }
    }

    fn frame(scheduler: &mut FrameScheduler, backend: &mut MockBackend, surface: &mut MockSurface) -> FrameStatus {
        scheduler
            .run_frame(backend, surface, |(w, h)| u64::from(w) * 10_000 + u64::from(h))
            .unwrap()
    }

    #[test]
    fn first_frames_follow_the_protocol() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((1024, 768));

        assert_eq!(frame(&mut scheduler, &mut backend, &mut surface), FrameStatus::Drawn);
        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Record(0, 0),
                Call::Uniforms(0, 1024 * 10_000 + 768),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(scheduler.current_slot(), 1);
        assert_eq!(scheduler.slot_state(0), SlotState::Submitted);
    }

    #[test]
    fn third_frame_waits_on_slot_zero_before_recording() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((1024, 768));

        frame(&mut scheduler, &mut backend, &mut surface);
        frame(&mut scheduler, &mut backend, &mut surface);
        assert_eq!(backend.count(|c| matches!(c, Call::Submit(_))), 2);
        assert_eq!(scheduler.in_flight(), 2);

        let before_third = backend.calls.len();
        frame(&mut scheduler, &mut backend, &mut surface);

        let third = &backend.calls[before_third..];
        assert_eq!(third[0], Call::Wait(0));
        let record = third.iter().position(|c| matches!(c, Call::Record(0, _))).unwrap();
        assert!(record > 0);
    }

    #[test]
    fn never_more_than_two_frames_in_flight() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((1024, 768));

        for _ in 0..25 {
            frame(&mut scheduler, &mut backend, &mut surface);
            assert!(scheduler.in_flight() <= MAX_FRAMES_IN_FLIGHT);
        }
        assert_eq!(backend.max_pending, MAX_FRAMES_IN_FLIGHT);
        assert_eq!(scheduler.frames_drawn(), 25);
    }

    #[test]
    fn slots_alternate() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((1024, 768));

        for _ in 0..4 {
            frame(&mut scheduler, &mut backend, &mut surface);
        }
        let submits: Vec<_> = backend
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Submit(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(submits, vec![0, 1, 0, 1]);
    }

    #[test]
    fn minimize_defers_rebuild_until_visible() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((1024, 768));

        frame(&mut scheduler, &mut backend, &mut surface);

        // Minimized, then restored at a new size while we wait for events
        surface.resize((0, 0));
        surface.queued_sizes.extend([(0, 0), (800, 600)]);
        frame(&mut scheduler, &mut backend, &mut surface);

        assert_eq!(surface.waits, 2);
        assert_eq!(scheduler.rebuilds(), 1);
        assert!(!surface.resized);
        assert_eq!(backend.count(|c| matches!(c, Call::Rebuild(..))), 1);
        assert!(backend.position(Call::Rebuild(800, 600)).is_some());
        assert_eq!(backend.extent, (800, 600));

        // Idle wait comes before the rebuild
        let idle = backend.position(Call::WaitIdle).unwrap();
        assert!(idle < backend.position(Call::Rebuild(800, 600)).unwrap());

        // Next frame renders at the new size without another rebuild
        frame(&mut scheduler, &mut backend, &mut surface);
        assert_eq!(scheduler.rebuilds(), 1);
        assert!(matches!(backend.calls.iter().rev().find(|c| matches!(c, Call::Uniforms(..))), Some(Call::Uniforms(_, u)) if *u == 800 * 10_000 + 600));
    }

    #[test]
    fn close_while_minimized_skips_rebuild() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((0, 0));

        assert!(!scheduler.rebuild(&mut backend, &mut surface).unwrap());
        assert_eq!(backend.count(|c| matches!(c, Call::Rebuild(..) | Call::WaitIdle)), 0);
    }

    #[test]
    fn suboptimal_present_rebuilds_before_next_acquire() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((1024, 768));

        frame(&mut scheduler, &mut backend, &mut surface);
        backend.present_script.push_back(PresentOutcome::Stale);
        assert_eq!(frame(&mut scheduler, &mut backend, &mut surface), FrameStatus::Drawn);

        // Frame K was still submitted and presented
        let present = backend.position(Call::Present(1, 1)).unwrap();
        let rebuild = backend.position(Call::Rebuild(1024, 768)).unwrap();
        assert!(present < rebuild);

        let before = backend.calls.len();
        frame(&mut scheduler, &mut backend, &mut surface);
        assert!(backend.calls[before..].contains(&Call::Acquire(0)));
        assert!(rebuild < before);
    }

    #[test]
    fn suboptimal_acquire_draws_then_rebuilds() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((1024, 768));

        backend
            .acquire_script
            .push_back(AcquireOutcome::Ready { image_index: 2, suboptimal: true });
        assert_eq!(frame(&mut scheduler, &mut backend, &mut surface), FrameStatus::Drawn);

        assert!(backend.position(Call::Present(0, 2)).unwrap() < backend.position(Call::Rebuild(1024, 768)).unwrap());
        assert_eq!(scheduler.rebuilds(), 1);
    }

    #[test]
    fn out_of_date_acquire_skips_the_frame() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((1024, 768));

        backend.acquire_script.push_back(AcquireOutcome::OutOfDate);
        assert_eq!(frame(&mut scheduler, &mut backend, &mut surface), FrameStatus::Skipped);

        assert_eq!(backend.count(|c| matches!(c, Call::Reset(_))), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::Record(..) | Call::Submit(_) | Call::Present(..))), 0);
        assert_eq!(scheduler.rebuilds(), 1);
        // The slot is reused for the retry
        assert_eq!(scheduler.current_slot(), 0);
        assert_eq!(scheduler.slot_state(0), SlotState::Idle);

        assert_eq!(frame(&mut scheduler, &mut backend, &mut surface), FrameStatus::Drawn);
        assert!(backend.calls.contains(&Call::Submit(0)));
    }

    #[test]
    fn restore_from_minimize_rebuilds_exactly_once() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((0, 0));
        surface.resized = true;
        surface.queued_sizes.push_back((800, 600));

        for _ in 0..3 {
            frame(&mut scheduler, &mut backend, &mut surface);
        }

        let rebuilds: Vec<_> = backend
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Rebuild(..)))
            .copied()
            .collect();
        assert_eq!(rebuilds, vec![Call::Rebuild(800, 600)]);
        assert_eq!(scheduler.rebuilds(), 1);
    }

    #[test]
    fn out_of_date_rebuild_consumes_pending_resize() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((1024, 768));

        surface.resize((1280, 720));
        backend.acquire_script.push_back(AcquireOutcome::OutOfDate);
        assert_eq!(frame(&mut scheduler, &mut backend, &mut surface), FrameStatus::Skipped);
        assert_eq!(frame(&mut scheduler, &mut backend, &mut surface), FrameStatus::Drawn);

        assert_eq!(scheduler.rebuilds(), 1);
        assert_eq!(backend.extent, (1280, 720));
    }

    #[test]
    fn resize_flag_triggers_a_single_rebuild() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((1024, 768));

        surface.resize((1280, 720));
        frame(&mut scheduler, &mut backend, &mut surface);
        frame(&mut scheduler, &mut backend, &mut surface);

        assert!(!surface.resized);
        assert_eq!(scheduler.rebuilds(), 1);
        assert!(backend.calls.contains(&Call::Rebuild(1280, 720)));
    }

    #[test]
    fn repeated_rebuilds_stay_consistent() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new((1024, 768));
        let mut surface = MockSurface::new((1024, 768));

        frame(&mut scheduler, &mut backend, &mut surface);
        for _ in 0..5 {
            assert!(scheduler.rebuild(&mut backend, &mut surface).unwrap());
            assert_eq!(backend.image_count, backend.view_count);
            assert_eq!(backend.extent, (1024, 768));
            assert_eq!(scheduler.in_flight(), 0);
        }
        assert_eq!(scheduler.rebuilds(), 5);
        assert_eq!(frame(&mut scheduler, &mut backend, &mut surface), FrameStatus::Drawn);
    }

    #[test]
    fn backend_errors_propagate() {
        struct FailingSubmit(MockBackend);

        impl FrameBackend for FailingSubmit {
            type Uniforms = u64;
            fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
                self.0.wait_for_slot(slot)
            }
            fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome> {
                self.0.acquire(slot)
            }
            fn reset_slot_fence(&mut self, slot: usize) -> Result<()> {
                self.0.reset_slot_fence(slot)
            }
            fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
                self.0.record(slot, image_index)
            }
            fn update_uniforms(&mut self, slot: usize, uniforms: &u64) -> Result<()> {
                self.0.update_uniforms(slot, uniforms)
            }
            fn submit(&mut self, _slot: usize) -> Result<()> {
                anyhow::bail!("device lost")
            }
            fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
                self.0.present(slot, image_index)
            }
            fn wait_idle(&mut self) -> Result<()> {
                self.0.wait_idle()
            }
            fn rebuild(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
                self.0.rebuild(framebuffer_size)
            }
            fn extent(&self) -> (u32, u32) {
                self.0.extent()
            }
        }

        let mut scheduler = FrameScheduler::new();
        let mut backend = FailingSubmit(MockBackend::new((1024, 768)));
        let mut surface = MockSurface::new((1024, 768));

        let err = scheduler.run_frame(&mut backend, &mut surface, |_| 0).unwrap_err();
        assert!(err.to_string().contains("device lost"));
        assert_eq!(scheduler.in_flight(), 0);
    }
}
