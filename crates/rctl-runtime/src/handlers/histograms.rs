#![forbid(unsafe_code)]

//! Renderer-side histogram uploads.

use rctl_core::{HistogramRegistry, HostMsg};

use crate::channel::ControlChannel;

/// Sends the samples recorded since the previous upload.
#[derive(Debug, Clone)]
pub struct HistogramSnapshots {
    registry: HistogramRegistry,
}

impl HistogramSnapshots {
    #[must_use]
    pub fn new(registry: HistogramRegistry) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &HistogramRegistry {
        &self.registry
    }

    /// Reply to a histogram request. A reply is sent even when nothing
    /// changed so the parent can match it to `sequence`.
    pub fn send_histograms(&self, sequence: i32, channel: &ControlChannel) {
        let deltas = self.registry.snapshot_deltas();
        tracing::debug!(sequence, histograms = deltas.len(), "sending histogram deltas");
        channel.send(HostMsg::RendererHistograms { sequence, deltas });
    }
}
