use glam::Quat;
use rayon::prelude::*;

use super::part::{InstanceMatrix, Part, BRANCHING};

/// Distance from a parent to a child, in units of the child's scale.
pub const CHILD_OFFSET: f32 = 1.5;

/// Per-level update parameters for one frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LevelUpdate {
    /// Angle added to every part's spin this frame.
    pub spin_delta: f32,

    /// Uniform scale of the level being updated.
    pub scale: f32,
}

impl LevelUpdate {
    /// Advances a whole level from its (already updated) parent level.
    ///
    /// Every element reads only `parents[i / 5]` and writes only its own slot,
    /// so the level is processed as one sibling group per parallel item. Returns
    /// once every element has been written.
    pub fn run(&self, parents: &[Part], parts: &mut [Part], matrices: &mut [InstanceMatrix]) {
        debug_assert_eq!(parts.len(), parents.len() * BRANCHING);
        debug_assert_eq!(parts.len(), matrices.len());

        parts
            .par_chunks_mut(BRANCHING)
            .zip(matrices.par_chunks_mut(BRANCHING))
            .zip(parents.par_iter())
            .for_each(|((siblings, sibling_matrices), parent)| {
                for (part, matrix) in siblings.iter_mut().zip(sibling_matrices) {
                    *matrix = self.update_part(parent, part);
                }
            });
    }

    /// Single-threaded equivalent of [`run`](Self::run).
    pub fn run_serial(&self, parents: &[Part], parts: &mut [Part], matrices: &mut [InstanceMatrix]) {
        for (i, (part, matrix)) in parts.iter_mut().zip(matrices.iter_mut()).enumerate() {
            *matrix = self.update_part(&parents[i / BRANCHING], part);
        }
    }

    /// Updates one part from its parent's world state and returns its matrix.
    #[inline]
    pub fn update_part(&self, parent: &Part, part: &mut Part) -> InstanceMatrix {
        part.spin_angle += self.spin_delta;
        part.world_rotation = compose_rotation(parent.world_rotation, part);
        part.world_position = parent.world_position
            + parent.world_rotation * (CHILD_OFFSET * self.scale * part.direction);

        InstanceMatrix::from_rotation_scale_translation(
            part.world_rotation,
            self.scale,
            part.world_position,
        )
    }
}

/// `parent * (rotation * spin)`; shared by the root and all child levels.
#[inline]
pub(crate) fn compose_rotation(parent_rotation: Quat, part: &Part) -> Quat {
    parent_rotation * part.local_rotation()
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use glam::Vec3;

    use super::*;
    use crate::fractal::part::ChildSlot;

    const EPS: f32 = 1e-5;

    fn root_at(position: Vec3, rotation: Quat) -> Part {
        Part {
            world_position: position,
            world_rotation: rotation,
            ..Part::default()
        }
    }

    // ── single part ───────────────────────────────────────────────────────

    #[test]
    fn up_child_sits_above_identity_parent() {
        let parent = root_at(Vec3::ZERO, Quat::IDENTITY);
        let mut part = Part::new(ChildSlot::Up);
        let update = LevelUpdate { spin_delta: 0.0, scale: 0.5 };
        let m = update.update_part(&parent, &mut part);

        assert!((part.world_position - Vec3::new(0.0, 0.75, 0.0)).length() < EPS);
        assert!((m.translation() - part.world_position).length() < EPS);
    }

    #[test]
    fn right_child_is_rotated_onto_x() {
        let parent = root_at(Vec3::ZERO, Quat::IDENTITY);
        let mut part = Part::new(ChildSlot::Right);
        let update = LevelUpdate { spin_delta: 0.0, scale: 0.5 };
        let m = update.update_part(&parent, &mut part);

        assert!((part.world_position - Vec3::new(0.75, 0.0, 0.0)).length() < EPS);
        // Local up now points along +X, scaled.
        let up = m.basis() * Vec3::Y;
        assert!((up - Vec3::new(0.5, 0.0, 0.0)).length() < EPS, "{up:?}");
    }

    #[test]
    fn offset_follows_parent_rotation() {
        let parent = root_at(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_x(FRAC_PI_2));
        let mut part = Part::new(ChildSlot::Up);
        LevelUpdate { spin_delta: 0.0, scale: 1.0 }.update_part(&parent, &mut part);

        // +Y rotated 90 degrees about X lands on +Z.
        assert!((part.world_position - Vec3::new(1.0, 2.0, 4.5)).length() < EPS);
    }

    #[test]
    fn rotation_composition_order() {
        let parent_rot = Quat::from_rotation_z(0.3);
        let parent = root_at(Vec3::ZERO, parent_rot);
        let mut part = Part::new(ChildSlot::Forward);
        LevelUpdate { spin_delta: 0.7, scale: 1.0 }.update_part(&parent, &mut part);

        let expected = parent_rot * ChildSlot::Forward.rotation() * Quat::from_rotation_y(0.7);
        assert!(part.world_rotation.abs_diff_eq(expected, EPS));
    }

    #[test]
    fn spin_accumulates_without_wrapping() {
        let parent = root_at(Vec3::ZERO, Quat::IDENTITY);
        let mut part = Part::new(ChildSlot::Left);
        let update = LevelUpdate { spin_delta: 1.0, scale: 1.0 };
        for _ in 0..10 {
            update.update_part(&parent, &mut part);
        }
        assert_eq!(part.spin_angle, 10.0);
    }

    // ── whole level ───────────────────────────────────────────────────────

    #[test]
    fn parallel_matches_serial() {
        let parents: Vec<Part> = (0..25)
            .map(|i| root_at(Vec3::splat(i as f32), Quat::from_rotation_y(i as f32 * 0.1)))
            .collect();
        let mut a: Vec<Part> = (0..125).map(|i| Part::new(ChildSlot::for_index(i))).collect();
        let mut b = a.clone();
        let mut ma = vec![InstanceMatrix::default(); 125];
        let mut mb = ma.clone();

        let update = LevelUpdate { spin_delta: 0.25, scale: 0.125 };
        for _ in 0..3 {
            update.run(&parents, &mut a, &mut ma);
            update.run_serial(&parents, &mut b, &mut mb);
        }

        assert_eq!(a, b);
        assert_eq!(ma, mb);
    }

    #[test]
    fn each_child_reads_its_own_parent() {
        let parents = vec![
            root_at(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY),
            root_at(Vec3::new(-10.0, 0.0, 0.0), Quat::IDENTITY),
        ];
        let mut parts: Vec<Part> = (0..10).map(|i| Part::new(ChildSlot::for_index(i))).collect();
        let mut matrices = vec![InstanceMatrix::default(); 10];
        LevelUpdate { spin_delta: 0.0, scale: 1.0 }.run(&parents, &mut parts, &mut matrices);

        assert!(parts[..5].iter().all(|p| p.world_position.x > 5.0));
        assert!(parts[5..].iter().all(|p| p.world_position.x < -5.0));
    }
}
