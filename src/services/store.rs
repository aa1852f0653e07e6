// Persistence seam for captured specimens

use anyhow::Result;
use parking_lot::Mutex;

use crate::core::types::SpecimenRecord;

/// Destination for successful captures
pub trait SpecimenStore: Send + Sync {
    fn save(&self, record: SpecimenRecord) -> Result<()>;
}

/// Keeps records in memory, in save order
#[derive(Default)]
pub struct InMemorySpecimenStore {
    records: Mutex<Vec<SpecimenRecord>>,
}

impl InMemorySpecimenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SpecimenRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl SpecimenStore for InMemorySpecimenStore {
    fn save(&self, record: SpecimenRecord) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }
}
