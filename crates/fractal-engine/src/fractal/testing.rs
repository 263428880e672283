//! Recording backend for exercising buffer hand-off and lifecycle without a GPU.

use anyhow::{bail, Result};

use super::part::InstanceMatrix;
use super::sync::{DrawInstanced, InstanceBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BackendEvent {
    Create { buffer: usize, level: usize, len: usize },
    Upload { buffer: usize, len: usize },
    Draw { buffer: usize, level: usize, instances: u32 },
    Release { buffer: usize },
}

#[derive(Debug)]
pub(crate) struct RecordedBuffer {
    pub id: usize,
    pub len: usize,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingBackend {
    pub events: Vec<BackendEvent>,
    pub draws: Vec<DrawInstanced>,
    /// Last uploaded contents, by buffer id.
    pub contents: Vec<Vec<InstanceMatrix>>,
    pub live: usize,
    /// Buffer creation for this level fails.
    pub fail_at_level: Option<usize>,
    next_id: usize,
}

impl RecordingBackend {
    pub fn failing_at(level: usize) -> Self {
        Self {
            fail_at_level: Some(level),
            ..Self::default()
        }
    }

    pub fn released(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Release { buffer } => Some(*buffer),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Create { buffer, .. } => Some(*buffer),
                _ => None,
            })
            .collect()
    }
}

impl InstanceBackend for RecordingBackend {
    type Buffer = RecordedBuffer;

    fn create_instance_buffer(&mut self, level: usize, len: usize) -> Result<RecordedBuffer> {
        if self.fail_at_level == Some(level) {
            bail!("out of memory creating level {level} buffer");
        }
        let id = self.next_id;
        self.next_id += 1;
        self.live += 1;
        self.contents.push(Vec::new());
        self.events.push(BackendEvent::Create { buffer: id, level, len });
        Ok(RecordedBuffer { id, len })
    }

    fn upload_instances(&mut self, buffer: &RecordedBuffer, matrices: &[InstanceMatrix]) {
        assert_eq!(buffer.len, matrices.len(), "upload size must match buffer size");
        self.contents[buffer.id] = matrices.to_vec();
        self.events.push(BackendEvent::Upload { buffer: buffer.id, len: matrices.len() });
    }

    fn draw_instanced(&mut self, buffer: &RecordedBuffer, draw: &DrawInstanced) {
        self.draws.push(*draw);
        self.events.push(BackendEvent::Draw {
            buffer: buffer.id,
            level: draw.level,
            instances: draw.instance_count,
        });
    }

    fn release_instance_buffer(&mut self, buffer: RecordedBuffer) {
        self.live -= 1;
        self.events.push(BackendEvent::Release { buffer: buffer.id });
    }
}
