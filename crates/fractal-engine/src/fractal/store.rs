use anyhow::{Context, Result};

use super::config::{level_len, Depth};
use super::part::{ChildSlot, InstanceMatrix, Part};

/// Scale factor between consecutive levels.
pub const LEVEL_SCALE_FACTOR: f32 = 0.5;

/// Uniform scale of level `level` for a root of scale `root_scale`.
#[inline]
pub fn level_scale(root_scale: f32, level: usize) -> f32 {
    root_scale * LEVEL_SCALE_FACTOR.powi(level as i32)
}

/// One tree depth: parts plus their derived instance matrices.
///
/// Both buffers have exactly `5^level` entries for the lifetime of the level.
#[derive(Debug)]
pub struct Level {
    parts: Vec<Part>,
    matrices: Vec<InstanceMatrix>,
}

impl Level {
    fn allocate(len: usize) -> Result<Self> {
        let mut parts = Vec::new();
        parts
            .try_reserve_exact(len)
            .with_context(|| format!("failed to reserve {len} parts"))?;
        parts.resize(len, Part::default());

        let mut matrices = Vec::new();
        matrices
            .try_reserve_exact(len)
            .with_context(|| format!("failed to reserve {len} instance matrices"))?;
        matrices.resize(len, InstanceMatrix::default());

        Ok(Self { parts, matrices })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    #[inline]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    #[inline]
    pub fn matrices(&self) -> &[InstanceMatrix] {
        &self.matrices
    }

    /// Mutable views of both buffers, for the level's own update pass.
    #[inline]
    pub(crate) fn buffers_mut(&mut self) -> (&mut [Part], &mut [InstanceMatrix]) {
        (&mut self.parts, &mut self.matrices)
    }

    fn bind_child_slots(&mut self) {
        for (i, part) in self.parts.iter_mut().enumerate() {
            *part = Part::new(ChildSlot::for_index(i));
        }
    }

    fn byte_size(&self) -> usize {
        self.parts.capacity() * std::mem::size_of::<Part>()
            + self.matrices.capacity() * InstanceMatrix::SIZE
    }
}

/// Flat per-level storage for the whole hierarchy.
///
/// Level `k` has `5^k` entries; element `i` of level `k` is the child of element
/// `i / 5` of level `k - 1`. The level count is fixed for the lifetime of the
/// store; a different depth needs a new store.
#[derive(Debug)]
pub struct HierarchyStore {
    levels: Vec<Level>,
}

impl HierarchyStore {
    /// Allocates `depth` levels sized 1, 5, 25, ...
    ///
    /// Parts start unbound; call [`initialize_child_bindings`](Self::initialize_child_bindings)
    /// before the first frame.
    pub fn allocate(depth: Depth) -> Result<Self> {
        let mut levels = Vec::new();
        levels
            .try_reserve_exact(depth.levels())
            .context("failed to reserve level table")?;

        for k in 0..depth.levels() {
            let len = level_len(k);
            let level = Level::allocate(len)
                .with_context(|| format!("failed to allocate level {k}"))?;
            log::debug!("allocated level {k}: {len} parts ({} bytes)", level.byte_size());
            levels.push(level);
        }

        Ok(Self { levels })
    }

    /// Binds every part to the (direction, rotation) pair of slot `i mod 5`.
    ///
    /// Also resets spin and world state, so a rebuilt store starts from the same
    /// state as a fresh one.
    pub fn initialize_child_bindings(&mut self) {
        for level in &mut self.levels {
            level.bind_child_slots();
        }
    }

    /// Frees all CPU buffers.
    pub fn release(self) {
        let parts: usize = self.levels.iter().map(Level::len).sum();
        log::debug!("released {} levels ({parts} parts)", self.levels.len());
        drop(self);
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn level(&self, k: usize) -> Option<&Level> {
        self.levels.get(k)
    }

    #[inline]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    #[inline]
    pub fn root(&self) -> &Part {
        &self.levels[0].parts[0]
    }

    /// Total number of parts across all levels.
    pub fn total_parts(&self) -> usize {
        self.levels.iter().map(Level::len).sum()
    }

    /// Root part and its matrix slot.
    pub(crate) fn root_mut(&mut self) -> (&mut Part, &mut InstanceMatrix) {
        let (parts, matrices) = self.levels[0].buffers_mut();
        (&mut parts[0], &mut matrices[0])
    }

    /// Splits the store into the already-updated level `k - 1` (read-only) and
    /// level `k` (mutable).
    ///
    /// # Panics
    /// Panics if `k == 0` or `k >= depth()`.
    pub(crate) fn parent_and_level_mut(&mut self, k: usize) -> (&Level, &mut Level) {
        assert!(k > 0 && k < self.levels.len(), "level {k} has no parent level");
        let (before, after) = self.levels.split_at_mut(k);
        (&before[k - 1], &mut after[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fractal::part::parent_index;

    fn store(depth: u8) -> HierarchyStore {
        let mut store = HierarchyStore::allocate(Depth::new(depth).unwrap()).unwrap();
        store.initialize_child_bindings();
        store
    }

    // ── allocation ────────────────────────────────────────────────────────

    #[test]
    fn level_lengths_are_powers_of_five() {
        for depth in 1..=6u8 {
            let s = store(depth);
            assert_eq!(s.depth(), depth as usize);
            for (k, level) in s.levels().iter().enumerate() {
                assert_eq!(level.len(), 5usize.pow(k as u32));
                assert_eq!(level.matrices().len(), level.len());
            }
        }
    }

    #[test]
    fn depth_three_lengths() {
        let s = store(3);
        let lens: Vec<usize> = s.levels().iter().map(Level::len).collect();
        assert_eq!(lens, vec![1, 5, 25]);
        assert_eq!(s.total_parts(), 31);
    }

    #[test]
    fn level_lookup_is_bounded_by_depth() {
        let s = store(2);
        assert_eq!(s.level(1).map(Level::len), Some(5));
        assert!(s.levels().iter().all(|l| !l.is_empty()));
        assert!(s.level(2).is_none());
    }

    // ── bindings ──────────────────────────────────────────────────────────

    #[test]
    fn bindings_are_periodic_in_five() {
        let s = store(4);
        for level in s.levels().iter().skip(1) {
            for (i, part) in level.parts().iter().enumerate() {
                let slot = ChildSlot::for_index(i);
                assert_eq!(part.direction, slot.direction());
                assert_eq!(part.rotation, slot.rotation());
                if i >= 5 {
                    let twin = &level.parts()[i - 5];
                    assert_eq!((part.direction, part.rotation), (twin.direction, twin.rotation));
                }
            }
        }
    }

    #[test]
    fn root_uses_first_slot() {
        let s = store(2);
        assert_eq!(s.root().direction, ChildSlot::Up.direction());
        assert_eq!(s.root().spin_angle, 0.0);
    }

    #[test]
    fn rebuild_reproduces_bindings_and_zero_spin() {
        let a = store(3);
        a.release();
        let b = store(3);
        let c = store(3);
        for (lb, lc) in b.levels().iter().zip(c.levels()) {
            assert_eq!(lb.parts(), lc.parts());
        }
        assert!(b.levels().iter().flat_map(Level::parts).all(|p| p.spin_angle == 0.0));
    }

    // ── topology ──────────────────────────────────────────────────────────

    #[test]
    fn every_child_has_a_parent_in_previous_level() {
        let s = store(4);
        for k in 1..s.depth() {
            let parents = s.levels()[k - 1].len();
            for i in 0..s.levels()[k].len() {
                assert!(parent_index(i) < parents);
            }
        }
    }

    #[test]
    fn parent_and_level_split() {
        let mut s = store(3);
        let (parent, level) = s.parent_and_level_mut(2);
        assert_eq!(parent.len(), 5);
        assert_eq!(level.len(), 25);
    }

    #[test]
    #[should_panic(expected = "has no parent level")]
    fn root_level_has_no_parent() {
        let mut s = store(2);
        let _ = s.parent_and_level_mut(0);
    }

    // ── scale ─────────────────────────────────────────────────────────────

    #[test]
    fn level_scale_halves_per_level() {
        assert_eq!(level_scale(2.0, 0), 2.0);
        assert_eq!(level_scale(2.0, 1), 1.0);
        assert_eq!(level_scale(2.0, 3), 0.25);
    }
}
