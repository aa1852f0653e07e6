// Camera focus controller
//
// Maps detection geometry onto one-shot focus-and-meter actions. Focus is a
// UX affordance, so every operation degrades to a logged no-op instead of
// returning an error.

use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::core::types::{InferenceResult, StreamState, ViewPoint};

/// Platform camera control surface (focus and metering)
pub trait CameraControl: Send + Sync {
    /// Start a one-shot focus-and-meter action at a view-space point
    fn start_focus_and_metering(&self, point: ViewPoint) -> Result<()>;

    fn cancel_focus_and_metering(&self) -> Result<()>;
}

/// Reports whether the preview stream is delivering frames
pub trait StreamStateProvider: Send + Sync {
    fn stream_state(&self) -> StreamState;
}

/// What a focus request ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusOutcome {
    Issued,
    CameraNotReady,
    NotStreaming,
    Failed,
}

pub struct CameraFocusController {
    camera: RwLock<Option<Arc<dyn CameraControl>>>,
    stream_state: Arc<dyn StreamStateProvider>,
    view_size: RwLock<(f32, f32)>,
}

impl CameraFocusController {
    pub fn new(stream_state: Arc<dyn StreamStateProvider>, view_width: f32, view_height: f32) -> Self {
        Self {
            camera: RwLock::new(None),
            stream_state,
            view_size: RwLock::new((view_width, view_height)),
        }
    }

    /// Attach the camera control once the camera has been bound
    pub fn attach_camera(&self, camera: Arc<dyn CameraControl>) {
        *self.camera.write() = Some(camera);
    }

    pub fn detach_camera(&self) {
        *self.camera.write() = None;
    }

    pub fn set_view_size(&self, width: f32, height: f32) {
        *self.view_size.write() = (width, height);
    }

    fn camera(&self) -> Option<Arc<dyn CameraControl>> {
        self.camera.read().clone()
    }

    /// Focus at a point the user tapped, in view-space pixels.
    pub fn manual_focus_at(&self, point: ViewPoint) -> FocusOutcome {
        self.issue_focus(point)
    }

    /// Focus on the center of a detection, only while the preview is streaming.
    ///
    /// Detections produced during a camera state transition are stale and
    /// must not move the focus.
    pub fn auto_focus_at(&self, result: &InferenceResult) -> FocusOutcome {
        if self.stream_state.stream_state() != StreamState::Streaming {
            trace!("Auto focus skipped: preview not streaming");
            return FocusOutcome::NotStreaming;
        }

        let (view_width, view_height) = *self.view_size.read();
        let (center_x, center_y) = result.bbox.center();
        let point = ViewPoint {
            x: center_x * view_width,
            y: center_y * view_height,
        };

        self.issue_focus(point)
    }

    /// Cancel any in-flight focus-and-meter action
    pub fn cancel_focus(&self) -> FocusOutcome {
        let Some(camera) = self.camera() else {
            debug!("Cancel focus skipped: camera control not ready");
            return FocusOutcome::CameraNotReady;
        };

        match camera.cancel_focus_and_metering() {
            Ok(()) => FocusOutcome::Issued,
            Err(e) => {
                warn!("Failed to cancel focus: {:#}", e);
                FocusOutcome::Failed
            }
        }
    }

    fn issue_focus(&self, point: ViewPoint) -> FocusOutcome {
        let Some(camera) = self.camera() else {
            debug!("Focus skipped: camera control not ready");
            return FocusOutcome::CameraNotReady;
        };

        match camera.start_focus_and_metering(point) {
            Ok(()) => {
                trace!("Focus issued at ({:.1}, {:.1})", point.x, point.y);
                FocusOutcome::Issued
            }
            Err(e) => {
                warn!("Focus at ({:.1}, {:.1}) failed: {:#}", point.x, point.y, e);
                FocusOutcome::Failed
            }
        }
    }
}
