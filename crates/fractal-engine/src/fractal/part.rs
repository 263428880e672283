use std::f32::consts::FRAC_PI_2;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Quat, Vec3};

/// Number of children under every non-leaf part.
pub const BRANCHING: usize = 5;

/// Returns the index of the parent (in level `k - 1`) of element `index` in level `k`.
#[inline]
pub const fn parent_index(index: usize) -> usize {
    index / BRANCHING
}

/// One of the five fixed child positions under a parent.
///
/// The slot determines the part's direction and local rotation. The local
/// rotation turns the part's "up" axis onto its direction, so every child
/// spins around the axis pointing away from its parent.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ChildSlot {
    Up,
    Right,
    Left,
    Forward,
    Back,
}

impl ChildSlot {
    /// All slots in table order (slot index 0..5).
    pub const ALL: [Self; BRANCHING] = [
        Self::Up,
        Self::Right,
        Self::Left,
        Self::Forward,
        Self::Back,
    ];

    /// Slot used by element `index` of any level.
    #[inline]
    pub const fn for_index(index: usize) -> Self {
        Self::ALL[index % BRANCHING]
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Unit offset direction relative to the parent.
    #[inline]
    pub const fn direction(self) -> Vec3 {
        match self {
            Self::Up => Vec3::Y,
            Self::Right => Vec3::X,
            Self::Left => Vec3::NEG_X,
            Self::Forward => Vec3::Z,
            Self::Back => Vec3::NEG_Z,
        }
    }

    /// Fixed local orientation offset.
    #[inline]
    pub fn rotation(self) -> Quat {
        match self {
            Self::Up => Quat::IDENTITY,
            Self::Right => Quat::from_rotation_z(-FRAC_PI_2),
            Self::Left => Quat::from_rotation_z(FRAC_PI_2),
            Self::Forward => Quat::from_rotation_x(FRAC_PI_2),
            Self::Back => Quat::from_rotation_x(-FRAC_PI_2),
        }
    }
}

/// State of a single node in the hierarchy.
///
/// `direction` and `rotation` are bound once from the child slot. `spin_angle`
/// only ever grows. The world fields are rewritten every frame from the parent's
/// world state of the same frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Part {
    pub direction: Vec3,
    pub rotation: Quat,
    pub spin_angle: f32,
    pub world_rotation: Quat,
    pub world_position: Vec3,
}

impl Part {
    /// Creates a fresh part bound to `slot`, with zero spin.
    pub fn new(slot: ChildSlot) -> Self {
        Self {
            direction: slot.direction(),
            rotation: slot.rotation(),
            spin_angle: 0.0,
            world_rotation: Quat::IDENTITY,
            world_position: Vec3::ZERO,
        }
    }

    /// Local orientation of this part including its accumulated spin.
    ///
    /// Composed as `rotation * spin`, with the spin taken around local up (+Y).
    #[inline]
    pub fn local_rotation(&self) -> Quat {
        self.rotation * Quat::from_rotation_y(self.spin_angle)
    }
}

impl Default for Part {
    fn default() -> Self {
        Self::new(ChildSlot::Up)
    }
}

/// Affine instance transform as consumed by the GPU (48 bytes).
///
/// Column-major: the three columns of the scaled rotation block followed by the
/// translation column.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceMatrix {
    pub columns: [[f32; 3]; 4],
}

impl InstanceMatrix {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Builds the matrix for a uniformly scaled, rotated and translated instance.
    #[inline]
    pub fn from_rotation_scale_translation(rotation: Quat, scale: f32, translation: Vec3) -> Self {
        let r = Mat3::from_quat(rotation) * scale;
        Self {
            columns: [
                r.x_axis.to_array(),
                r.y_axis.to_array(),
                r.z_axis.to_array(),
                translation.to_array(),
            ],
        }
    }

    #[inline]
    pub fn translation(&self) -> Vec3 {
        Vec3::from_array(self.columns[3])
    }

    /// Scaled rotation block.
    #[inline]
    pub fn basis(&self) -> Mat3 {
        Mat3::from_cols(
            Vec3::from_array(self.columns[0]),
            Vec3::from_array(self.columns[1]),
            Vec3::from_array(self.columns[2]),
        )
    }

    /// Applies the transform to a point.
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.basis() * p + self.translation()
    }
}
