// OgmaNeo - Pooler (temporal aggregation of sparse codes)

use rayon::prelude::*;

use crate::compute::ComputeSystem;
use crate::error::{Error, Result};
use crate::helpers::*;

/// Averages a layer's sparse code over a fixed window of ticks.
///
/// The layer above only sees [`get_pooled`](Self::get_pooled) once a window
/// completes, so every extra pool step halves, thirds, ... the rate at which
/// it receives new evidence.
#[derive(Clone, Debug)]
pub struct Pooler {
    size: Int2,
    pool_steps: usize,
    ticks: usize,
    sums: FloatBuffer,
    pooled: FloatBuffer,
}

impl Pooler {
    pub fn new(size: Int2, pool_steps: usize) -> Result<Self> {
        if pool_steps == 0 {
            return Err(Error::Configuration("pool steps must be at least 1".into()));
        }

        Ok(Self {
            size,
            pool_steps,
            ticks: 0,
            sums: vec![0.0; size.area()],
            pooled: vec![0.0; size.area()],
        })
    }

    /// Add one tick of `states`. Returns `true` when this tick completes a
    /// window, in which case the pooled output has been refreshed.
    pub fn accumulate(&mut self, cs: &ComputeSystem, states: &[f32]) -> bool {
        debug_assert_eq!(states.len(), self.sums.len());

        self.ticks += 1;
        let complete = self.ticks >= self.pool_steps;
        let scale = 1.0 / self.pool_steps as f32;

        cs.install(|| {
            if complete {
                self.sums
                    .par_iter_mut()
                    .zip(self.pooled.par_iter_mut())
                    .zip(states.par_iter())
                    .for_each(|((sum, pooled), &s)| {
                        *pooled = (*sum + s) * scale;
                        *sum = 0.0;
                    });
            } else {
                self.sums
                    .par_iter_mut()
                    .zip(states.par_iter())
                    .for_each(|(sum, &s)| *sum += s);
            }
        });

        if complete {
            self.ticks = 0;
        }

        complete
    }

    pub fn clear_memory(&mut self) {
        self.ticks = 0;
        self.sums.fill(0.0);
        self.pooled.fill(0.0);
    }

    pub fn get_pooled(&self) -> &[f32] {
        &self.pooled
    }

    pub fn get_size(&self) -> Int2 {
        self.size
    }

    pub fn get_pool_steps(&self) -> usize {
        self.pool_steps
    }

    /// Ticks accumulated in the current, incomplete window.
    pub fn get_ticks(&self) -> usize {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::DeviceType;

    #[test]
    fn single_step_pooling_passes_code_through() {
        let cs = ComputeSystem::new(DeviceType::Cpu, 1).unwrap();
        let mut pooler = Pooler::new(Int2::new(2, 2), 1).unwrap();
        let code = [0.0, 1.0, 0.0, 0.0];

        assert!(pooler.accumulate(&cs, &code));
        assert_eq!(pooler.get_pooled(), &code);
    }

    #[test]
    fn window_averages_and_resets() {
        let cs = ComputeSystem::new(DeviceType::Cpu, 1).unwrap();
        let mut pooler = Pooler::new(Int2::new(2, 1), 2).unwrap();

        assert!(!pooler.accumulate(&cs, &[1.0, 0.0]));
        assert_eq!(pooler.get_pooled(), &[0.0, 0.0]);
        assert_eq!(pooler.get_ticks(), 1);

        assert!(pooler.accumulate(&cs, &[1.0, 1.0]));
        assert_eq!(pooler.get_pooled(), &[1.0, 0.5]);
        assert_eq!(pooler.get_ticks(), 0);

        assert!(!pooler.accumulate(&cs, &[0.0, 1.0]));
        assert!(pooler.accumulate(&cs, &[0.0, 1.0]));
        assert_eq!(pooler.get_pooled(), &[0.0, 1.0]);
    }

    #[test]
    fn zero_pool_steps_is_rejected() {
        assert!(matches!(
            Pooler::new(Int2::new(2, 2), 0),
            Err(Error::Configuration(_))
        ));
    }
}
