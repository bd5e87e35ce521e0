//! Fixed-capacity measurement table and per-session history.

/// One object measurement produced from an accepted cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Slot index, equal to the cluster's discovery index.
    pub slot_id: usize,
    pub centroid_x: f32,
    pub centroid_y: f32,
    /// Sensor-frame azimuth in `[0, 2π)`.
    pub azimuth: f32,
    /// Estimated capture time, microseconds.
    pub corrected_time: u64,
    pub box_min: [f32; 3],
    pub box_max: [f32; 3],
}

/// Ordered slots, each either empty or holding one measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementTable {
    slots: Vec<Option<Measurement>>,
}

impl MeasurementTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Reset every slot to empty.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// Store `measurement` at `slot`.
    ///
    /// Returns `false` without writing when `slot` is beyond capacity.
    pub fn write(&mut self, slot: usize, measurement: Measurement) -> bool {
        match self.slots.get_mut(slot) {
            Some(entry) => {
                *entry = Some(measurement);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, slot: usize) -> Option<&Measurement> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn slots(&self) -> &[Option<Measurement>] {
        &self.slots
    }

    /// Occupied slots in slot order.
    pub fn occupied(&self) -> impl Iterator<Item = &Measurement> {
        self.slots.iter().flatten()
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied().count()
    }

    /// True when no slot holds a measurement.
    pub fn is_vacant(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

/// Append-only record of every frame table that held at least one measurement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    tables: Vec<MeasurementTable>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a copy of `table` unless it is vacant. Returns whether it was appended.
    pub fn commit_if_any(&mut self, table: &MeasurementTable) -> bool {
        if table.is_vacant() {
            return false;
        }
        self.tables.push(table.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> &[MeasurementTable] {
        &self.tables
    }

    /// Every stored measurement, frame after frame.
    pub fn measurements(&self) -> impl Iterator<Item = &Measurement> {
        self.tables.iter().flat_map(MeasurementTable::occupied)
    }
}
