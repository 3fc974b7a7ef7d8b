//! Compute device abstraction.
//!
//! The pass graph only talks to a [`ComputeDevice`]: it asks for limits,
//! sizes dispatches from them and reserves buffer memory on the device
//! ledger. [`HostDevice`] runs passes on host-resident arrays, spreading
//! per-particle kernels over rayon workers when the `parallel` feature is on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ResourceError;

/// Capability limits a device reports to the allocator and the pass graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Buffer sizes are rounded up to a multiple of this.
    pub min_storage_buffer_offset_alignment: u64,
    pub max_storage_buffer_binding_size: u64,
    /// Total bytes the device will hand out across all live buffers.
    pub memory_budget: u64,
    pub max_compute_workgroup_size_x: u32,
    pub max_compute_workgroups_per_dimension: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_storage_buffer_offset_alignment: 256,
            max_storage_buffer_binding_size: 128 << 20,
            memory_budget: 1 << 30,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroups_per_dimension: 65_535,
        }
    }
}

pub trait ComputeDevice {
    fn label(&self) -> &str;

    fn limits(&self) -> DeviceLimits;

    /// Whether compute dispatches can run at all.
    fn supports_dispatch(&self) -> bool;

    /// Reserve `bytes` on the device ledger. Fails without side effects
    /// when the budget would be exceeded.
    fn reserve(&self, bytes: u64) -> Result<(), ResourceError>;

    fn release(&self, bytes: u64);

    /// Bytes currently reserved.
    fn reserved_bytes(&self) -> u64;
}

impl<D: ComputeDevice + ?Sized> ComputeDevice for Arc<D> {
    fn label(&self) -> &str {
        (**self).label()
    }

    fn limits(&self) -> DeviceLimits {
        (**self).limits()
    }

    fn supports_dispatch(&self) -> bool {
        (**self).supports_dispatch()
    }

    fn reserve(&self, bytes: u64) -> Result<(), ResourceError> {
        (**self).reserve(bytes)
    }

    fn release(&self, bytes: u64) {
        (**self).release(bytes)
    }

    fn reserved_bytes(&self) -> u64 {
        (**self).reserved_bytes()
    }
}

/// Host-resident device.
#[derive(Debug)]
pub struct HostDevice {
    label: String,
    limits: DeviceLimits,
    dispatch: bool,
    reserved: AtomicU64,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            label: "host".to_owned(),
            limits,
            dispatch: true,
            reserved: AtomicU64::new(0),
        }
    }

    /// A device that reports no dispatch support.
    pub fn without_dispatch() -> Self {
        Self {
            dispatch: false,
            ..Self::new()
        }
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeDevice for HostDevice {
    fn label(&self) -> &str {
        &self.label
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn supports_dispatch(&self) -> bool {
        self.dispatch
    }

    fn reserve(&self, bytes: u64) -> Result<(), ResourceError> {
        let budget = self.limits.memory_budget;
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(bytes).filter(|&total| total <= budget)
            })
            .map(|_| ())
            .map_err(|current| ResourceError::OutOfBudget {
                requested: bytes,
                available: budget.saturating_sub(current),
            })
    }

    fn release(&self, bytes: u64) {
        // Saturate so a double release can never wrap the ledger.
        let _ = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    fn reserved_bytes(&self) -> u64 {
        self.reserved.load(Ordering::Acquire)
    }
}

/// Workgroup counts for one dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl DispatchSize {
    pub fn workgroups(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

/// Round `bytes` up to a multiple of `alignment`, saturating at `u64::MAX`.
pub fn align_to(bytes: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return bytes;
    }
    bytes.div_ceil(alignment).saturating_mul(alignment)
}

/// Clamp a requested workgroup size to what the device supports.
pub fn clamp_workgroup_size(requested: u32, limits: &DeviceLimits) -> u32 {
    requested.clamp(1, limits.max_compute_workgroup_size_x.max(1))
}

/// `ceil(items / workgroup_size)` groups, folded into `y` when `x` would
/// exceed the per-dimension limit.
pub fn dispatch_size(items: usize, workgroup_size: u32, limits: &DeviceLimits) -> DispatchSize {
    let wg = workgroup_size.max(1) as u64;
    let groups = (items as u64).div_ceil(wg);
    let max_dim = limits.max_compute_workgroups_per_dimension.max(1) as u64;
    if groups <= max_dim {
        return DispatchSize {
            x: groups as u32,
            y: 1,
            z: 1,
        };
    }
    let y = groups.div_ceil(max_dim);
    let x = groups.div_ceil(y);
    DispatchSize {
        x: x as u32,
        y: y as u32,
        z: 1,
    }
}
