//! Per-frame device tracking
//!
//! [`PoseTracker::update`] is the frame's pacing point: the compositor's
//! pose wait blocks until the display is ready for the next frame, so the
//! whole host loop ends up running at the headset's refresh rate.

use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::runtime::{
    TrackedDevicePose, VrCompositor, VrEvent, VrSystem, HMD_DEVICE_INDEX, MAX_TRACKED_DEVICE_COUNT,
};

/// Poses for every tracked device slot; slot 0 is the headset
pub type TrackedPoseArray = [TrackedDevicePose; MAX_TRACKED_DEVICE_COUNT];

/// Outcome of one pose update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoseUpdate {
    /// Time spent blocked in the pose wait
    pub wait: Duration,
    /// Number of runtime events drained afterwards
    pub events_drained: usize,
}

/// Owns the tracked pose array
#[derive(Debug, Clone)]
pub struct PoseTracker {
    poses: TrackedPoseArray,
    updates: u64,
}

impl Default for PoseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseTracker {
    /// Tracker with every slot at its default pose
    pub fn new() -> Self {
        Self {
            poses: [TrackedDevicePose::default(); MAX_TRACKED_DEVICE_COUNT],
            updates: 0,
        }
    }

    /// Wait for fresh poses, overwrite the array, then drain pending events
    pub fn update(&mut self, compositor: &dyn VrCompositor, system: &dyn VrSystem) -> PoseUpdate {
        let started = Instant::now();
        if let Err(err) = compositor.wait_get_poses(&mut self.poses) {
            warn!("[VR] Pose wait failed, keeping previous poses: {}", err);
        }
        let wait = started.elapsed();

        let mut events_drained = 0;
        while let Some(event) = system.poll_next_event() {
            events_drained += 1;
            Self::handle_event(&event);
        }

        self.updates += 1;
        trace!("Pose update {}: waited {:?}, {} events", self.updates, wait, events_drained);
        PoseUpdate { wait, events_drained }
    }

    fn handle_event(event: &VrEvent) {
        match event {
            VrEvent::TrackedDeviceActivated { device } => debug!("[VR] Device {} activated", device),
            VrEvent::TrackedDeviceDeactivated { device } => debug!("[VR] Device {} deactivated", device),
            _ => {}
        }
    }

    /// All device poses
    pub const fn poses(&self) -> &TrackedPoseArray {
        &self.poses
    }

    /// The headset pose
    pub const fn hmd_pose(&self) -> &TrackedDevicePose {
        &self.poses[HMD_DEVICE_INDEX]
    }

    /// Number of completed updates
    pub const fn update_count(&self) -> u64 {
        self.updates
    }

    /// Forget all poses (session teardown)
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{RowMajor34, RowMajor44, IDENTITY_34};
    use crate::runtime::{CompositorError, Eye, SubmitFlags, SubmitTexture, TextureBounds};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    struct ScriptedRuntime {
        hmd: RowMajor34,
        fail_wait: bool,
        waits: Cell<usize>,
        events: RefCell<VecDeque<VrEvent>>,
    }

    impl ScriptedRuntime {
        fn new(events: Vec<VrEvent>) -> Self {
            let mut hmd = IDENTITY_34;
            hmd[1][3] = 1.7;
            Self { hmd, fail_wait: false, waits: Cell::new(0), events: RefCell::new(events.into()) }
        }
    }

    impl VrCompositor for ScriptedRuntime {
        fn wait_get_poses(&self, render_poses: &mut [TrackedDevicePose]) -> Result<(), CompositorError> {
            self.waits.set(self.waits.get() + 1);
            if self.fail_wait {
                return Err(CompositorError::DoNotHaveFocus);
            }
            render_poses[0] = TrackedDevicePose {
                device_to_absolute_tracking: self.hmd,
                pose_is_valid: true,
                device_is_connected: true,
            };
            Ok(())
        }

        fn submit(&self, _: Eye, _: &SubmitTexture, _: &TextureBounds, _: SubmitFlags) -> Result<(), CompositorError> {
            Ok(())
        }
    }

    impl VrSystem for ScriptedRuntime {
        fn recommended_render_target_size(&self) -> (u32, u32) {
            (1, 1)
        }

        fn projection_matrix(&self, _: Eye, _: f32, _: f32) -> RowMajor44 {
            [[0.0; 4]; 4]
        }

        fn eye_to_head_transform(&self, _: Eye) -> RowMajor34 {
            IDENTITY_34
        }

        fn poll_next_event(&self) -> Option<VrEvent> {
            self.events.borrow_mut().pop_front()
        }
    }

    #[test]
    fn test_update_overwrites_hmd_slot() {
        let runtime = ScriptedRuntime::new(Vec::new());
        let mut tracker = PoseTracker::new();
        assert!(!tracker.hmd_pose().pose_is_valid);

        tracker.update(&runtime, &runtime);
        assert!(tracker.hmd_pose().pose_is_valid);
        assert_eq!(tracker.hmd_pose().device_to_absolute_tracking[1][3], 1.7);
        assert_eq!(tracker.poses().len(), MAX_TRACKED_DEVICE_COUNT);
        assert_eq!(tracker.update_count(), 1);
    }

    #[test]
    fn test_update_drains_all_events_including_unknown() {
        let runtime = ScriptedRuntime::new(vec![
            VrEvent::TrackedDeviceActivated { device: 1 },
            VrEvent::Other { event_type: 1234 },
            VrEvent::IpdChanged,
        ]);
        let mut tracker = PoseTracker::new();

        let update = tracker.update(&runtime, &runtime);
        assert_eq!(update.events_drained, 3);
        assert!(runtime.events.borrow().is_empty());

        let update = tracker.update(&runtime, &runtime);
        assert_eq!(update.events_drained, 0);
        assert_eq!(runtime.waits.get(), 2);
    }

    #[test]
    fn test_failed_wait_keeps_previous_poses() {
        let mut runtime = ScriptedRuntime::new(Vec::new());
        let mut tracker = PoseTracker::new();
        tracker.update(&runtime, &runtime);

        runtime.fail_wait = true;
        runtime.hmd = [[0.0; 4]; 3];
        tracker.update(&runtime, &runtime);
        assert_eq!(tracker.hmd_pose().device_to_absolute_tracking[1][3], 1.7);
    }

    #[test]
    fn test_reset_clears_poses() {
        let runtime = ScriptedRuntime::new(Vec::new());
        let mut tracker = PoseTracker::new();
        tracker.update(&runtime, &runtime);

        tracker.reset();
        assert_eq!(*tracker.hmd_pose(), TrackedDevicePose::default());
        assert_eq!(tracker.update_count(), 0);
    }
}
