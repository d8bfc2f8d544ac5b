// OgmaNeo - ComputeSystem (parallel dispatch context)

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which device the compute system should dispatch onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceType {
    /// Multi-threaded CPU pool.
    #[default]
    Cpu,
    /// Accelerator only. No accelerator backend is compiled in.
    Gpu,
    /// Any available device.
    All,
}

/// Handle to the parallel execution resources shared by hierarchies.
///
/// Every per-unit and per-chunk kernel runs inside [`install`](Self::install),
/// so all data-parallel work of a hierarchy stays on this context's pool.
/// Share it between hierarchies with an `Arc`.
#[derive(Debug)]
pub struct ComputeSystem {
    device: DeviceType,
    pool: rayon::ThreadPool,
}

impl ComputeSystem {
    /// Create a compute system. `num_threads == 0` uses rayon's default
    /// (one thread per logical core).
    pub fn new(device: DeviceType, num_threads: usize) -> Result<Self> {
        match device {
            DeviceType::Cpu => {}
            DeviceType::Gpu => {
                return Err(Error::DeviceUnavailable(
                    "no accelerator backend available".into(),
                ))
            }
            DeviceType::All => {
                tracing::warn!("no accelerator backend available, falling back to CPU");
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("ogmaneo-{i}"))
            .build()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        tracing::debug!(threads = pool.current_num_threads(), "compute system created");

        Ok(Self {
            device: DeviceType::Cpu,
            pool,
        })
    }

    /// CPU compute system with the default thread count.
    pub fn cpu() -> Result<Self> {
        Self::new(DeviceType::Cpu, 0)
    }

    /// Run `op` inside this context's thread pool, blocking until it completes.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// The device actually in use.
    pub fn device(&self) -> DeviceType {
        self.device
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}
