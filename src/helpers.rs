// OgmaNeo - helpers module

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// --- Constants ---

pub const LIMIT_SMALL: f32 = 0.000001;

pub const INIT_WEIGHT_RANGE: Float2 = Float2 { x: -0.01, y: 0.01 };

// Strength below which a chunk neighbour is skipped during learning
pub const MIN_LEARN_STRENGTH: f32 = 0.0001;

// Encoder biases saturate at +/- this value
pub const BIAS_LIMIT: f32 = 0.1;

const PCG_MULTIPLIER: u64 = 6364136223846793005;
const PCG_INCREMENT: u64 = 1442695040888963407;
pub const RAND_MAX: u32 = 0x00ffffff;

// --- Type aliases ---

pub type FloatBuffer = Vec<f32>;

// --- Vector types ---

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Int2 {
    pub x: i32,
    pub y: i32,
}

impl Int2 {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Number of cells in a grid of this size (negative components count as zero).
    pub fn area(self) -> usize {
        self.x.max(0) as usize * self.y.max(0) as usize
    }
}

impl std::fmt::Display for Int2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Size or coordinate on a 2D grid.
pub type Vec2i = Int2;

#[derive(Clone, Copy, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct Float2 {
    pub x: f32,
    pub y: f32,
}

impl Float2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pair of floats, used for ranges such as the initial weight range.
pub type Vec2f = Float2;

// --- Bounds checking ---

pub fn in_bounds0(pos: Int2, upper_bound: Int2) -> bool {
    pos.x >= 0 && pos.x < upper_bound.x && pos.y >= 0 && pos.y < upper_bound.y
}

// --- Projections ---

pub fn project(pos: Int2, to_scalars: Float2) -> Int2 {
    Int2::new(
        ((pos.x as f32 + 0.5) * to_scalars.x) as i32,
        ((pos.y as f32 + 0.5) * to_scalars.y) as i32,
    )
}

pub fn scalars_between(from: Int2, to: Int2) -> Float2 {
    Float2::new(to.x as f32 / from.x as f32, to.y as f32 / from.y as f32)
}

/// Receptive field of one hidden unit onto a visible grid.
///
/// `lower` is the (possibly negative) corner of the full window, used to
/// compute weight offsets; `iter_lower..=iter_upper` is the clamped region
/// that actually lies inside the visible grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldBounds {
    pub lower: Int2,
    pub iter_lower: Int2,
    pub iter_upper: Int2,
}

impl FieldBounds {
    pub fn new(hidden_pos: Int2, h_to_v: Float2, visible_size: Int2, radius: i32) -> Self {
        let visible_center = project(hidden_pos, h_to_v);
        let lower = Int2::new(visible_center.x - radius, visible_center.y - radius);

        Self {
            lower,
            iter_lower: Int2::new(lower.x.max(0), lower.y.max(0)),
            iter_upper: Int2::new(
                (visible_center.x + radius).min(visible_size.x - 1),
                (visible_center.y + radius).min(visible_size.y - 1),
            ),
        }
    }

    pub fn count(&self) -> usize {
        ((self.iter_upper.x - self.iter_lower.x + 1).max(0)
            * (self.iter_upper.y - self.iter_lower.y + 1).max(0)) as usize
    }
}

/// Check a receptive field radius and return the number of weights one
/// hidden unit holds for it over `num_samples` frames.
///
/// The radius must be positive and no larger than the largest extent of
/// either grid, since a wider window covers no additional cells.
pub fn field_row_len(
    what: &str,
    radius: i32,
    hidden_size: Int2,
    visible_size: Int2,
    num_samples: usize,
) -> Result<usize> {
    if radius <= 0 {
        return Err(Error::Configuration(format!(
            "{what} radius must be positive, got {radius}"
        )));
    }

    let extent = hidden_size
        .x
        .max(hidden_size.y)
        .max(visible_size.x)
        .max(visible_size.y);
    if radius > extent {
        return Err(Error::Configuration(format!(
            "{what} radius {radius} exceeds the largest grid extent {extent}"
        )));
    }

    radius
        .checked_mul(2)
        .and_then(|d| d.checked_add(1))
        .and_then(|d| usize::try_from(d).ok())
        .and_then(|d| d.checked_mul(d))
        .and_then(|area| area.checked_mul(num_samples))
        .filter(|&len| len.checked_mul(hidden_size.area()).is_some())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "{what} radius {radius} gives too many weights for {hidden_size} units"
            ))
        })
}

// --- Addressing ---

pub fn address2(pos: Int2, dims: Int2) -> usize {
    (pos.y + pos.x * dims.y) as usize
}

pub fn position2(index: usize, dims: Int2) -> Int2 {
    Int2::new((index / dims.y as usize) as i32, (index % dims.y as usize) as i32)
}

/// Offset of a window cell inside a `diam × diam` weight row.
pub fn window_offset(offset: Int2, diam: i32) -> usize {
    (offset.y + diam * offset.x) as usize
}

// --- PCG32 RNG ---

pub fn rand_get_state(seed: u64) -> u64 {
    let state = seed.wrapping_add(PCG_INCREMENT);
    state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(PCG_INCREMENT)
}

#[inline]
fn rotr32(x: u32, r: u32) -> u32 {
    x >> r | x << (r.wrapping_neg() & 31)
}

pub fn rand_step(state: &mut u64) -> u32 {
    let x = *state;
    let count = (x >> 59) as u32;
    *state = x.wrapping_mul(PCG_MULTIPLIER).wrapping_add(PCG_INCREMENT);
    let x = x ^ (x >> 18);
    rotr32((x >> 27) as u32, count)
}

pub fn randf_step(state: &mut u64) -> f32 {
    (rand_step(state) % RAND_MAX) as f32 / RAND_MAX as f32
}

pub fn randf_range_step(low: f32, high: f32, state: &mut u64) -> f32 {
    low + (high - low) * randf_step(state)
}

pub fn random_buffer(len: usize, range: Float2, state: &mut u64) -> FloatBuffer {
    (0..len).map(|_| randf_range_step(range.x, range.y, state)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_and_position_are_inverse() {
        let dims = Int2::new(5, 3);
        for i in 0..dims.area() {
            assert_eq!(address2(position2(i, dims), dims), i);
        }
    }

    #[test]
    fn field_bounds_clamp_to_visible_grid() {
        let fb = FieldBounds::new(Int2::new(0, 0), Float2::new(1.0, 1.0), Int2::new(4, 4), 2);
        assert_eq!(fb.lower, Int2::new(-2, -2));
        assert_eq!(fb.iter_lower, Int2::new(0, 0));
        assert_eq!(fb.iter_upper, Int2::new(2, 2));
        assert_eq!(fb.count(), 9);
    }

    #[test]
    fn field_row_len_bounds_the_radius() {
        let hidden = Int2::new(36, 36);
        let visible = Int2::new(4, 4);

        assert_eq!(field_row_len("ff", 2, hidden, visible, 1).unwrap(), 25);
        assert_eq!(field_row_len("ff", 2, hidden, visible, 3).unwrap(), 75);
        assert_eq!(field_row_len("ff", 36, hidden, visible, 1).unwrap(), 73 * 73);

        for radius in [0, -1, 37, 40000, i32::MAX] {
            assert!(matches!(
                field_row_len("ff", radius, hidden, visible, 1),
                Err(Error::Configuration(_))
            ));
        }
    }

    #[test]
    fn projection_maps_centres() {
        // 36 hidden columns onto 4 visible columns
        let h_to_v = scalars_between(Int2::new(36, 36), Int2::new(4, 4));
        assert_eq!(project(Int2::new(0, 0), h_to_v), Int2::new(0, 0));
        assert_eq!(project(Int2::new(35, 35), h_to_v), Int2::new(3, 3));
    }

    #[test]
    fn rng_is_reproducible_and_in_range() {
        let mut a = rand_get_state(1234);
        let mut b = rand_get_state(1234);
        for _ in 0..100 {
            let va = randf_range_step(-0.5, 0.5, &mut a);
            assert_eq!(va, randf_range_step(-0.5, 0.5, &mut b));
            assert!((-0.5..=0.5).contains(&va));
        }
    }
}
