use crate::error::{Error, Result};

/// Index of a scalar slot in the [`ParameterStore`].
pub type ParamIndex = usize;

/// Opaque grouping tag; used for bulk removal of constraints and the
/// parameters allocated alongside them.
pub type Tag = u32;

/// Tag for parameters that belong to no removal group.
pub const UNTAGGED: Tag = 0;

#[derive(Debug, Clone, Copy)]
struct Slot {
    value: f64,
    fixed: bool,
    tag: Tag,
    retired: bool,
}

/// Dense arena of scalar optimization parameters.
///
/// Indices are append-only for the lifetime of the store: slots are never
/// recycled individually. `retire_tag` marks a tagged group inert (its
/// indices stop resolving and leave the free set) without disturbing the
/// indices of surviving slots; `clear` releases everything at once.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    slots: Vec<Slot>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot, returning its index (monotonically increasing from 0).
    pub fn push(&mut self, value: f64, fixed: bool) -> ParamIndex {
        self.push_tagged(value, fixed, UNTAGGED)
    }

    /// Append a slot belonging to a removal group.
    pub fn push_tagged(&mut self, value: f64, fixed: bool, tag: Tag) -> ParamIndex {
        let index = self.slots.len();
        self.slots.push(Slot {
            value,
            fixed,
            tag,
            retired: false,
        });
        index
    }

    fn slot(&self, index: ParamIndex) -> Result<&Slot> {
        match self.slots.get(index) {
            Some(slot) if !slot.retired => Ok(slot),
            _ => Err(Error::IndexOutOfRange {
                index,
                len: self.slots.len(),
            }),
        }
    }

    pub fn get(&self, index: ParamIndex) -> Result<f64> {
        Ok(self.slot(index)?.value)
    }

    /// Overwrite both value and fixed flag.
    pub fn set(&mut self, index: ParamIndex, value: f64, fixed: bool) -> Result<()> {
        self.slot(index)?;
        let slot = &mut self.slots[index];
        slot.value = value;
        slot.fixed = fixed;
        Ok(())
    }

    pub fn is_fixed(&self, index: ParamIndex) -> Result<bool> {
        Ok(self.slot(index)?.fixed)
    }

    /// True when `index` resolves to a live slot.
    pub fn contains(&self, index: ParamIndex) -> bool {
        self.slot(index).is_ok()
    }

    /// Total number of slots ever pushed, retired ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current values of every slot, in index order. Retired slots keep
    /// their last value so surviving geometry indices stay meaningful.
    pub fn snapshot(&self) -> Vec<f64> {
        self.slots.iter().map(|slot| slot.value).collect()
    }

    /// Indices eligible for optimization: neither fixed nor retired.
    pub fn free_indices(&self) -> Vec<ParamIndex> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.fixed && !slot.retired)
            .map(|(index, _)| index)
            .collect()
    }

    /// Mark every slot carrying `tag` inert.
    pub fn retire_tag(&mut self, tag: Tag) -> usize {
        let mut retired = 0;
        for slot in &mut self.slots {
            if slot.tag == tag && !slot.retired {
                slot.retired = true;
                retired += 1;
            }
        }
        retired
    }

    /// Release every slot. Indices from before the clear never become
    /// valid again (short of pushing a fresh sequence).
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
