// OgmaNeo - ValueField2D (dense 2D scalar grid)

use crate::error::{Error, Result};
use crate::helpers::*;

/// Dense 2D field of values, used for hierarchy inputs and predictions.
///
/// Values are stored in the same column-major order ([`address2`]) as the
/// hierarchy's internal buffers, so [`data`](Self::data) can be handed to
/// layers without reordering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueField2D {
    size: Int2,
    data: FloatBuffer,
}

impl ValueField2D {
    /// Zero-filled field. Negative size components are treated as zero.
    pub fn new(size: Vec2i) -> Self {
        Self::with_value(size, 0.0)
    }

    pub fn with_value(size: Vec2i, value: f32) -> Self {
        let size = Int2::new(size.x.max(0), size.y.max(0));
        Self {
            size,
            data: vec![value; size.area()],
        }
    }

    /// Build a field by evaluating `f` at every coordinate.
    pub fn from_fn(size: Vec2i, mut f: impl FnMut(Int2) -> f32) -> Self {
        let mut field = Self::new(size);
        for i in 0..field.data.len() {
            field.data[i] = f(position2(i, field.size));
        }
        field
    }

    pub fn get_value(&self, pos: Vec2i) -> Result<f32> {
        let i = self.index(pos)?;
        Ok(self.data[i])
    }

    pub fn set_value(&mut self, pos: Vec2i, value: f32) -> Result<()> {
        let i = self.index(pos)?;
        self.data[i] = value;
        Ok(())
    }

    pub fn get_size(&self) -> Vec2i {
        self.size
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    fn index(&self, pos: Int2) -> Result<usize> {
        if !in_bounds0(pos, self.size) {
            return Err(Error::OutOfBounds {
                pos,
                size: self.size,
            });
        }
        Ok(address2(pos, self.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_field_is_zeroed() {
        let f = ValueField2D::new(Int2::new(3, 2));
        assert_eq!(f.get_size(), Int2::new(3, 2));
        assert_eq!(f.data().len(), 6);
        assert!(f.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn set_then_get() {
        let mut f = ValueField2D::new(Int2::new(4, 4));
        f.set_value(Int2::new(1, 2), 3.5).unwrap();
        assert_eq!(f.get_value(Int2::new(1, 2)).unwrap(), 3.5);
        assert_eq!(f.get_value(Int2::new(2, 1)).unwrap(), 0.0);
    }

    #[test]
    fn one_past_the_edge_is_out_of_bounds() {
        let mut f = ValueField2D::new(Int2::new(4, 3));
        assert!(f.set_value(Int2::new(3, 2), 1.0).is_ok());
        assert!(f.get_value(Int2::new(3, 2)).is_ok());

        for pos in [Int2::new(4, 0), Int2::new(0, 3), Int2::new(-1, 0)] {
            assert_eq!(
                f.get_value(pos),
                Err(Error::OutOfBounds { pos, size: Int2::new(4, 3) })
            );
            assert!(f.set_value(pos, 1.0).is_err());
        }
    }

    #[test]
    fn negative_size_is_empty() {
        let f = ValueField2D::new(Int2::new(-2, 5));
        assert_eq!(f.get_size(), Int2::new(0, 5));
        assert!(f.data().is_empty());
        assert!(f.get_value(Int2::new(0, 0)).is_err());
    }

    #[test]
    fn from_fn_visits_every_cell() {
        let f = ValueField2D::from_fn(Int2::new(4, 4), |p| (p.y * 4 + p.x) as f32);
        assert_eq!(f.get_value(Int2::new(3, 1)).unwrap(), 7.0);
        assert_eq!(f.get_value(Int2::new(0, 3)).unwrap(), 12.0);
    }
}
