// records.rs - the owned session collection and per-record lifecycle

use std::path::Path;
use std::sync::Arc;

use iced::widget::image::Handle;

use crate::compression::CompressResponse;
use crate::estimate::{self, QualityPreset};

pub type RecordId = u64;

/// Pending → Compressing → {Done | Error}. Terminal states never transition
/// back; re-uploading creates a fresh record. Carrying the measured result
/// inside `Done` means a result can only exist on a finished record.
#[derive(Debug, Clone)]
pub enum RecordState {
    Pending,
    Compressing,
    Done(CompressResponse),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: RecordId,
    pub filename: String,
    pub stem: String,
    pub source_bytes: u64,
    /// Raw upload, shared with in-flight compression calls.
    pub raw: Arc<Vec<u8>>,
    /// Thumbnail handle; dropped together with the record.
    pub preview: Handle,
    /// Heuristic only; refreshed on every preset/quality change until done.
    pub estimated_bytes: u64,
    pub state: RecordState,
}

impl ImageRecord {
    pub fn is_compressing(&self) -> bool {
        matches!(self.state, RecordState::Compressing)
    }

    pub fn response(&self) -> Option<&CompressResponse> {
        match &self.state {
            RecordState::Done(response) => Some(response),
            _ => None,
        }
    }
}

/// Ordered store of session records. The app struct is the single owner and
/// every mutation goes through an id-keyed method here; nothing outside holds
/// a `&mut` into the collection.
#[derive(Default)]
pub struct SessionStore {
    records: Vec<ImageRecord>,
    next_id: RecordId,
}

impl SessionStore {
    pub fn insert(
        &mut self,
        path: &Path,
        bytes: Vec<u8>,
        preset: QualityPreset,
        quality: u8,
    ) -> RecordId {
        let id = self.next_id;
        self.next_id += 1;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("image-{}", id));
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("image-{}", id));

        let source_bytes = bytes.len() as u64;
        let raw = Arc::new(bytes);
        let preview = Handle::from_memory((*raw).clone());

        self.records.push(ImageRecord {
            id,
            filename,
            stem,
            source_bytes,
            raw,
            preview,
            estimated_bytes: estimate::estimate(source_bytes, preset, quality),
            state: RecordState::Pending,
        });
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.iter()
    }

    pub fn get(&self, id: RecordId) -> Option<&ImageRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replace-by-id: the only state mutation applied to a record after
    /// creation, besides re-estimation. Unknown ids are ignored.
    pub fn set_state(&mut self, id: RecordId, state: RecordState) {
        if let Some(record) = self.records.iter_mut().find(|record| record.id == id) {
            record.state = state;
        }
    }

    /// Select every record eligible for a batch (pending, or already marked
    /// compressing by a duplicate start) and mark it compressing. Returns the
    /// eligible ids in collection order.
    pub fn mark_compressing(&mut self) -> Vec<RecordId> {
        let mut eligible = Vec::new();
        for record in &mut self.records {
            match record.state {
                RecordState::Pending | RecordState::Compressing => {
                    record.state = RecordState::Compressing;
                    eligible.push(record.id);
                }
                _ => {}
            }
        }
        eligible
    }

    /// Refresh predictions for everything without a measured result yet.
    pub fn reestimate(&mut self, preset: QualityPreset, quality: u8) {
        for record in &mut self.records {
            if !matches!(record.state, RecordState::Done(_)) {
                record.estimated_bytes = estimate::estimate(record.source_bytes, preset, quality);
            }
        }
    }

    /// Drop a record and release its buffers. Refused (returns false) while
    /// the batch still holds the record.
    pub fn remove(&mut self, id: RecordId) -> bool {
        match self.records.iter().position(|record| record.id == id) {
            Some(index) if !self.records[index].is_compressing() => {
                self.records.remove(index);
                true
            }
            _ => false,
        }
    }

    /// Empty the whole session. Refused while any record is compressing.
    /// Quality, preset, and format selections are not touched by a clear.
    pub fn clear(&mut self) -> bool {
        if self.any_compressing() {
            return false;
        }
        self.records.clear();
        true
    }

    pub fn any_compressing(&self) -> bool {
        self.records.iter().any(ImageRecord::is_compressing)
    }

    pub fn pending_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| matches!(record.state, RecordState::Pending))
            .count()
    }

    pub fn done_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.response().is_some())
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| matches!(record.state, RecordState::Error(_)))
            .count()
    }

    pub fn original_bytes(&self) -> u64 {
        self.records.iter().map(|record| record.source_bytes).sum()
    }

    /// Blended projection: the measured size once a record is done, the
    /// heuristic estimate before that.
    pub fn projected_bytes(&self) -> u64 {
        self.records
            .iter()
            .map(|record| match &record.state {
                RecordState::Done(response) => response.result.bytes,
                _ => record.estimated_bytes,
            })
            .sum()
    }

    /// Measured output bytes over finished records only.
    pub fn compressed_bytes(&self) -> u64 {
        self.records
            .iter()
            .filter_map(ImageRecord::response)
            .map(|response| response.result.bytes)
            .sum()
    }

    /// Overall percentage reduction across the session; `None` when there is
    /// nothing to divide by.
    pub fn overall_reduction(&self) -> Option<f64> {
        let original = self.original_bytes();
        if original == 0 {
            return None;
        }
        Some((1.0 - self.compressed_bytes() as f64 / original as f64) * 100.0)
    }
}
