//! Frame scheduler behaviour against an in-memory backend.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ash::vk;
use frameloop_renderer::{
    FrameBackend, FrameContext, FrameError, FrameScheduler, RenderStage, SchedulerConfig,
    StageKind, StageResult, SurfaceInfo, TickOutcome,
};
use frameloop_rhi::swapchain::{AcquireResult, RenderTarget, SurfaceStatus};
use frameloop_rhi::sync::FenceStatus;
use frameloop_rhi::{RhiError, RhiResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    CreateSlot(usize),
    Wait(usize),
    ResetFence(usize),
    Acquire(usize),
    Begin(usize),
    Record(&'static str),
    End(usize),
    Submit(usize),
    Release(usize),
    Present(usize, u32),
    Recreate(u32, u32),
    SurfaceRecreated(u32),
    WaitIdle,
}

struct State {
    events: Vec<Event>,
    /// Fence signaled state per slot id.
    fences: HashMap<usize, bool>,
    live_slots: usize,
    next_slot_id: usize,
    image_count: u32,
    extent: vk::Extent2D,
    next_image: u32,
    acquire_results: VecDeque<RhiResult<AcquireResult>>,
    present_results: VecDeque<RhiResult<SurfaceStatus>>,
    submit_failures: VecDeque<RhiError>,
    end_failures: VecDeque<RhiError>,
    /// Report no render target for any image.
    missing_targets: bool,
    recreate_failures: VecDeque<RhiError>,
    /// Timeouts reported before the next fence wait succeeds.
    fence_timeouts: u32,
}

#[derive(Clone)]
struct Shared(Arc<Mutex<State>>);

impl Shared {
    fn new(image_count: u32) -> Self {
        Shared(Arc::new(Mutex::new(State {
            events: Vec::new(),
            fences: HashMap::new(),
            live_slots: 0,
            next_slot_id: 0,
            image_count,
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            next_image: 0,
            acquire_results: VecDeque::new(),
            present_results: VecDeque::new(),
            submit_failures: VecDeque::new(),
            end_failures: VecDeque::new(),
            missing_targets: false,
            recreate_failures: VecDeque::new(),
            fence_timeouts: 0,
        })))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.0.lock().unwrap()
    }

    fn push(&self, event: Event) {
        self.state().events.push(event);
    }

    fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    fn clear_events(&self) {
        self.state().events.clear();
    }
}

struct FakeSlot {
    id: usize,
    shared: Shared,
}

impl Drop for FakeSlot {
    fn drop(&mut self) {
        let mut state = self.shared.state();
        state.live_slots -= 1;
        state.fences.remove(&self.id);
    }
}

struct FakeBackend {
    shared: Shared,
}

impl FrameBackend for FakeBackend {
    type Slot = FakeSlot;

    fn image_count(&self) -> u32 {
        self.shared.state().image_count
    }

    fn surface_info(&self) -> SurfaceInfo {
        let state = self.shared.state();
        SurfaceInfo {
            extent: state.extent,
            format: vk::Format::B8G8R8A8_SRGB,
            image_count: state.image_count,
            render_pass: vk::RenderPass::null(),
        }
    }

    fn create_slot(&mut self, _index: usize) -> RhiResult<FakeSlot> {
        let mut state = self.shared.state();
        let id = state.next_slot_id;
        state.next_slot_id += 1;
        state.live_slots += 1;
        state.fences.insert(id, true);
        state.events.push(Event::CreateSlot(id));
        Ok(FakeSlot {
            id,
            shared: self.shared.clone(),
        })
    }

    fn wait_for_fence(&self, slot: &FakeSlot, _timeout: Duration) -> RhiResult<FenceStatus> {
        let mut state = self.shared.state();
        state.events.push(Event::Wait(slot.id));
        if state.fence_timeouts > 0 {
            state.fence_timeouts -= 1;
            return Ok(FenceStatus::TimedOut);
        }
        if state.fences.get(&slot.id) == Some(&true) {
            Ok(FenceStatus::Signaled)
        } else {
            // Nothing will ever signal this fence: a real device would hang here.
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        }
    }

    fn reset_fence(&self, slot: &FakeSlot) -> RhiResult<()> {
        let mut state = self.shared.state();
        state.events.push(Event::ResetFence(slot.id));
        state.fences.insert(slot.id, false);
        Ok(())
    }

    fn acquire_next_image(&self, slot: &FakeSlot) -> RhiResult<AcquireResult> {
        let mut state = self.shared.state();
        state.events.push(Event::Acquire(slot.id));
        if let Some(result) = state.acquire_results.pop_front() {
            return result;
        }
        let index = state.next_image;
        state.next_image = (index + 1) % state.image_count;
        Ok(AcquireResult::Ok(index))
    }

    fn begin_recording(&self, slot: &FakeSlot) -> RhiResult<vk::CommandBuffer> {
        self.shared.push(Event::Begin(slot.id));
        Ok(vk::CommandBuffer::null())
    }

    fn end_recording(&self, slot: &FakeSlot) -> RhiResult<()> {
        let mut state = self.shared.state();
        state.events.push(Event::End(slot.id));
        match state.end_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn submit(&self, slot: &FakeSlot) -> RhiResult<()> {
        let mut state = self.shared.state();
        state.events.push(Event::Submit(slot.id));
        if let Some(err) = state.submit_failures.pop_front() {
            return Err(err);
        }
        // The fake GPU finishes instantly.
        state.fences.insert(slot.id, true);
        Ok(())
    }

    fn release_acquired(&self, slot: &FakeSlot) -> RhiResult<()> {
        let mut state = self.shared.state();
        state.events.push(Event::Release(slot.id));
        state.fences.insert(slot.id, true);
        Ok(())
    }

    fn present(&self, slot: &FakeSlot, image_index: u32) -> RhiResult<SurfaceStatus> {
        let mut state = self.shared.state();
        state.events.push(Event::Present(slot.id, image_index));
        state
            .present_results
            .pop_front()
            .unwrap_or(Ok(SurfaceStatus::Ok))
    }

    fn render_target(&self, image_index: u32) -> Option<RenderTarget> {
        let state = self.shared.state();
        (!state.missing_targets && image_index < state.image_count).then(|| RenderTarget {
            image_index,
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            framebuffer: vk::Framebuffer::null(),
            render_pass: vk::RenderPass::null(),
            extent: state.extent,
            format: vk::Format::B8G8R8A8_SRGB,
        })
    }

    fn recreate_surface(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let mut state = self.shared.state();
        state.events.push(Event::Recreate(width, height));
        state.events.push(Event::WaitIdle);
        if let Some(err) = state.recreate_failures.pop_front() {
            return Err(err);
        }
        state.extent = vk::Extent2D { width, height };
        state.next_image = 0;
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.shared.push(Event::WaitIdle);
        Ok(())
    }
}

struct LoggingStage {
    name: &'static str,
    shared: Shared,
    fail: bool,
}

impl RenderStage for LoggingStage {
    fn name(&self) -> &str {
        self.name
    }

    fn record(&mut self, frame: &FrameContext) -> StageResult {
        assert_eq!(frame.target.image_index, frame.image_index);
        self.shared.push(Event::Record(self.name));
        if self.fail {
            return Err(format!("{} failed", self.name).into());
        }
        Ok(())
    }

    fn surface_recreated(&mut self, surface: &SurfaceInfo) {
        self.shared
            .push(Event::SurfaceRecreated(surface.extent.width));
    }
}

fn stage(name: &'static str, shared: &Shared) -> LoggingStage {
    LoggingStage {
        name,
        shared: shared.clone(),
        fail: false,
    }
}

fn scheduler(image_count: u32) -> (FrameScheduler<FakeBackend>, Shared) {
    let shared = Shared::new(image_count);
    let backend = FakeBackend {
        shared: shared.clone(),
    };
    let scheduler = FrameScheduler::new(backend, SchedulerConfig::default()).unwrap();
    shared.clear_events();
    (scheduler, shared)
}

fn presented_slot(outcome: &TickOutcome) -> usize {
    match outcome {
        TickOutcome::Presented { frame_index, .. } => *frame_index,
        other => panic!("expected a presented frame, got {other:?}"),
    }
}

fn position(events: &[Event], wanted: &Event) -> Option<usize> {
    events.iter().position(|e| e == wanted)
}

#[test]
fn test_first_frame_runs_full_sequence() {
    let (mut scheduler, shared) = scheduler(3);
    scheduler.register_stage(StageKind::Composite, stage("clear", &shared));

    let outcome = scheduler.tick().unwrap();
    assert_eq!(presented_slot(&outcome), 0);

    assert_eq!(
        shared.events(),
        [
            Event::Wait(0),
            Event::ResetFence(0),
            Event::Acquire(0),
            Event::Begin(0),
            Event::Record("clear"),
            Event::End(0),
            Event::Submit(0),
            Event::Present(0, 0),
        ]
    );
}

#[test]
fn test_frames_in_flight_never_exceed_images() {
    assert_eq!(scheduler(1).0.frames_in_flight(), 1);
    assert_eq!(scheduler(2).0.frames_in_flight(), 2);
    assert_eq!(scheduler(3).0.frames_in_flight(), 2);
}

#[test]
fn test_scheduler_rejects_surface_without_images() {
    let backend = FakeBackend {
        shared: Shared::new(0),
    };
    assert!(FrameScheduler::new(backend, SchedulerConfig::default()).is_err());
}

#[test]
fn test_slots_rotate_round_robin() {
    let (mut scheduler, _shared) = scheduler(3);

    let slots: Vec<_> = (0..5)
        .map(|_| presented_slot(&scheduler.tick().unwrap()))
        .collect();
    assert_eq!(slots, [0, 1, 0, 1, 0]);
}

#[test]
fn test_never_waits_on_unsignaled_fence_across_many_frames() {
    let (mut scheduler, shared) = scheduler(2);
    scheduler.register_stage(StageKind::Scene, stage("scene", &shared));

    for _ in 0..16 {
        assert!(scheduler.tick().unwrap().is_presented());
    }
}

#[test]
fn test_out_of_date_acquire_recreates_before_next_acquire() {
    let (mut scheduler, shared) = scheduler(3);
    shared
        .state()
        .acquire_results
        .push_back(Ok(AcquireResult::OutOfDate));

    let outcome = scheduler.tick().unwrap();
    assert!(matches!(
        outcome,
        TickOutcome::Skipped(FrameError::SurfaceInvalidated(SurfaceStatus::OutOfDate))
    ));
    assert!(scheduler.recreate_pending());
    assert_eq!(scheduler.current_frame_index(), 1);

    let events = shared.events();
    assert!(!events.contains(&Event::Submit(0)));
    assert!(!events.iter().any(|e| matches!(e, Event::Present(..))));
    shared.clear_events();

    let outcome = scheduler.tick().unwrap();
    assert!(matches!(outcome, TickOutcome::Recreated { frames_in_flight: 2 }));
    assert!(!scheduler.recreate_pending());

    let events = shared.events();
    assert_eq!(events[0], Event::Recreate(1280, 720));
    assert!(!events.iter().any(|e| matches!(e, Event::Acquire(_))));

    assert!(scheduler.tick().unwrap().is_presented());
}

#[test]
fn test_suboptimal_acquire_releases_the_image() {
    let (mut scheduler, shared) = scheduler(3);
    shared
        .state()
        .acquire_results
        .push_back(Ok(AcquireResult::Suboptimal(1)));

    let outcome = scheduler.tick().unwrap();
    assert!(matches!(
        outcome,
        TickOutcome::Skipped(FrameError::SurfaceInvalidated(SurfaceStatus::Suboptimal))
    ));

    let events = shared.events();
    assert!(events.contains(&Event::Release(0)));
    assert!(!events.contains(&Event::Begin(0)));
    assert!(scheduler.recreate_pending());
}

#[test]
fn test_stages_record_in_fixed_order() {
    let (mut scheduler, shared) = scheduler(3);
    scheduler.register_stage(StageKind::Composite, stage("composite", &shared));
    scheduler.register_stage(StageKind::Overlay, stage("ui", &shared));
    scheduler.register_stage(StageKind::PostProcess, stage("post", &shared));
    scheduler.register_stage(StageKind::Scene, stage("scene", &shared));

    scheduler.tick().unwrap();

    let recorded: Vec<_> = shared
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Record(name) => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(recorded, ["scene", "post", "ui", "composite"]);
}

#[test]
fn test_stage_failure_aborts_frame_without_submit() {
    let (mut scheduler, shared) = scheduler(3);
    scheduler.register_stage(StageKind::Scene, stage("scene", &shared));
    scheduler.register_stage(
        StageKind::PostProcess,
        LoggingStage {
            name: "bloom",
            shared: shared.clone(),
            fail: true,
        },
    );
    scheduler.register_stage(StageKind::Overlay, stage("ui", &shared));

    let outcome = scheduler.tick().unwrap();
    match outcome {
        TickOutcome::Skipped(FrameError::Recording { stage, .. }) => assert_eq!(stage, "bloom"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let events = shared.events();
    assert!(!events.contains(&Event::Record("ui")));
    assert!(!events.contains(&Event::End(0)));
    assert!(!events.contains(&Event::Submit(0)));
    assert!(!events.iter().any(|e| matches!(e, Event::Present(..))));
    assert!(events.contains(&Event::Release(0)));
    assert_eq!(scheduler.current_frame_index(), 1);
    assert!(scheduler.recreate_pending());
}

#[test]
fn test_recovers_after_aborted_frames() {
    let (mut scheduler, shared) = scheduler(2);
    scheduler.register_stage(
        StageKind::Scene,
        LoggingStage {
            name: "flaky",
            shared: shared.clone(),
            fail: true,
        },
    );

    // Every frame aborts, every other tick recreates; no fence wait may hang.
    for _ in 0..8 {
        let outcome = scheduler.tick().unwrap();
        assert!(!outcome.is_presented());
    }
}

#[test]
fn test_submission_failure_is_absorbed() {
    let (mut scheduler, shared) = scheduler(3);
    shared
        .state()
        .submit_failures
        .push_back(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));

    let outcome = scheduler.tick().unwrap();
    assert!(matches!(
        outcome,
        TickOutcome::Skipped(FrameError::Submission(_))
    ));
    assert!(!shared.events().iter().any(|e| matches!(e, Event::Present(..))));

    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Recreated { .. }
    ));
    assert!(scheduler.tick().unwrap().is_presented());
}

#[test]
fn test_device_loss_is_fatal() {
    let (mut scheduler, shared) = scheduler(3);
    shared
        .state()
        .submit_failures
        .push_back(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST));

    let err = scheduler.tick().unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_present_error_is_fatal() {
    let (mut scheduler, shared) = scheduler(3);
    shared
        .state()
        .present_results
        .push_back(Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_HOST_MEMORY)));

    let err = scheduler.tick().unwrap_err();
    assert!(matches!(err, FrameError::Fatal(_)));
    assert!(shared.events().contains(&Event::Submit(0)));
}

#[test]
fn test_end_recording_failure_releases_slot() {
    let (mut scheduler, shared) = scheduler(3);
    scheduler.register_stage(StageKind::Composite, stage("clear", &shared));
    shared
        .state()
        .end_failures
        .push_back(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));

    match scheduler.tick().unwrap() {
        TickOutcome::Skipped(FrameError::Recording { stage, .. }) => assert_eq!(stage, "end"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let events = shared.events();
    let end = position(&events, &Event::End(0)).unwrap();
    let release = position(&events, &Event::Release(0)).unwrap();
    assert!(end < release);
    assert!(!events.contains(&Event::Submit(0)));
    assert!(scheduler.recreate_pending());

    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Recreated { .. }
    ));
    assert!(scheduler.tick().unwrap().is_presented());
}

#[test]
fn test_missing_render_target_aborts_before_stages() {
    let (mut scheduler, shared) = scheduler(3);
    scheduler.register_stage(StageKind::Composite, stage("clear", &shared));
    shared.state().missing_targets = true;

    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Skipped(FrameError::Recording { .. })
    ));
    let events = shared.events();
    assert!(!events.contains(&Event::Record("clear")));
    assert!(!events.contains(&Event::Submit(0)));
    assert!(events.contains(&Event::Release(0)));

    shared.state().missing_targets = false;
    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Recreated { .. }
    ));
    assert!(scheduler.tick().unwrap().is_presented());
}

#[test]
fn test_acquire_error_is_fatal() {
    let (mut scheduler, shared) = scheduler(3);
    shared
        .state()
        .acquire_results
        .push_back(Err(RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR)));

    assert!(matches!(scheduler.tick(), Err(FrameError::Fatal(_))));
}

#[test]
fn test_out_of_date_present_schedules_recreate() {
    let (mut scheduler, shared) = scheduler(3);
    shared
        .state()
        .present_results
        .push_back(Ok(SurfaceStatus::OutOfDate));

    let outcome = scheduler.tick().unwrap();
    assert!(matches!(
        outcome,
        TickOutcome::Presented {
            status: SurfaceStatus::OutOfDate,
            ..
        }
    ));
    assert!(scheduler.recreate_pending());
    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Recreated { .. }
    ));
}

#[test]
fn test_invalidation_from_another_thread() {
    let (mut scheduler, shared) = scheduler(3);
    let invalidator = scheduler.invalidator();

    std::thread::spawn(move || {
        invalidator.mark_invalid();
        invalidator.mark_invalid();
    })
    .join()
    .unwrap();

    // Marking only flips a flag; nothing happens until the next tick.
    assert!(shared.events().is_empty());
    assert!(scheduler.recreate_pending());

    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Recreated { .. }
    ));
    assert!(scheduler.tick().unwrap().is_presented());

    let recreations = shared
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Recreate(..)))
        .count();
    assert_eq!(recreations, 1);
}

#[test]
fn test_resize_recreates_at_new_size_and_notifies_stages() {
    let (mut scheduler, shared) = scheduler(3);
    scheduler.register_stage(StageKind::Scene, stage("scene", &shared));

    scheduler.invalidator().notify_resize(1920, 1080);
    scheduler.tick().unwrap();

    let events = shared.events();
    let recreate = position(&events, &Event::Recreate(1920, 1080)).unwrap();
    let notified = position(&events, &Event::SurfaceRecreated(1920)).unwrap();
    assert!(recreate < notified);
    assert_eq!(scheduler.backend().surface_info().extent.width, 1920);
}

#[test]
fn test_recreate_reallocates_slots_for_new_image_count() {
    let (mut scheduler, shared) = scheduler(3);
    shared.state().image_count = 1;

    scheduler.mark_surface_invalid();
    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Recreated { frames_in_flight: 1 }
    ));
    assert_eq!(scheduler.frames_in_flight(), 1);
    assert_eq!(shared.state().live_slots, 1);

    // Fresh slots start signaled.
    assert!(scheduler.tick().unwrap().is_presented());
}

#[test]
fn test_minimized_window_pauses() {
    let (mut scheduler, shared) = scheduler(3);
    let invalidator = scheduler.invalidator();

    assert!(scheduler.tick().unwrap().is_presented());
    assert_eq!(scheduler.current_frame_index(), 1);
    shared.clear_events();

    invalidator.notify_resize(0, 0);
    for _ in 0..3 {
        assert!(matches!(scheduler.tick().unwrap(), TickOutcome::Paused));
    }
    assert!(shared.events().is_empty());
    assert_eq!(scheduler.current_frame_index(), 1);

    invalidator.notify_resize(800, 600);
    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Recreated { .. }
    ));
    assert_eq!(shared.events()[0], Event::Recreate(800, 600));
}

#[test]
fn test_failed_recreate_is_retried() {
    let (mut scheduler, shared) = scheduler(3);
    shared
        .state()
        .recreate_failures
        .push_back(RhiError::SwapchainError("surface busy".to_string()));

    scheduler.mark_surface_invalid();
    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Skipped(FrameError::Recreation(_))
    ));
    assert!(scheduler.recreate_pending());

    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Recreated { .. }
    ));
    assert!(scheduler.tick().unwrap().is_presented());
}

#[test]
fn test_fence_timeout_keeps_waiting() {
    let (mut scheduler, shared) = scheduler(3);
    shared.state().fence_timeouts = 2;

    assert!(scheduler.tick().unwrap().is_presented());

    let waits = shared
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Wait(_)))
        .count();
    assert_eq!(waits, 3);
}

#[test]
fn test_drop_idles_and_releases_slots() {
    let (mut scheduler, shared) = scheduler(3);
    scheduler.tick().unwrap();
    assert_eq!(shared.state().live_slots, 2);

    drop(scheduler);

    assert_eq!(shared.events().last(), Some(&Event::WaitIdle));
    assert_eq!(shared.state().live_slots, 0);
}
