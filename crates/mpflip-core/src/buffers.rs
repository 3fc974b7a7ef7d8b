//! Buffer sizing, allocation and disposal.
//!
//! All simulation memory is created here and released here. Sizes use the
//! std430 array strides a storage buffer would have on the device (vec3 and
//! mat3 columns padded to 16 bytes) so the ledger matches what a GPU
//! implementation would reserve.

use log::info;

use crate::compute::{align_to, ComputeDevice};
use crate::config::SimulationOptions;
use crate::error::ResourceError;
use crate::grid::GridBuffers;
use crate::particle::ParticleBuffers;

const F32: u64 = 4;
const U32: u64 = 4;
const VEC3: u64 = 16;
const VEC4: u64 = 16;
const MAT3: u64 = 48;

/// Whether a buffer is indexed by particle slot or by grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferDomain {
    Particles,
    Cells,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferSpec {
    pub label: &'static str,
    pub domain: BufferDomain,
    pub element_bytes: u64,
    pub len: u64,
    /// `element_bytes * len` rounded up to the device alignment.
    pub bytes: u64,
}

/// Every buffer the simulation owns, sized from one options snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferLayout {
    pub buffers: Vec<BufferSpec>,
}

impl BufferLayout {
    pub fn new(opts: &SimulationOptions, alignment: u64) -> Self {
        let particles = opts.max_particles as u64;
        // Sizes saturate at u64::MAX so an overflowing layout fails the
        // binding-limit check instead of wrapping.
        let cells = opts.grid.cell_count().map_or(u64::MAX, |n| n as u64);
        let particle_fields: [(&'static str, u64); 9] = [
            ("particle.position", VEC3),
            ("particle.velocity", VEC3),
            ("particle.affine", MAT3),
            ("particle.deformation", MAT3),
            ("particle.stress", MAT3),
            ("particle.mass", F32),
            ("particle.material", VEC4),
            ("particle.life", F32),
            ("particle.alive", U32),
        ];
        let cell_fields: [(&'static str, u64); 11] = [
            ("grid.u", F32),
            ("grid.v", F32),
            ("grid.w", F32),
            ("grid.u0", F32),
            ("grid.v0", F32),
            ("grid.w0", F32),
            ("grid.mass", F32),
            ("grid.pressure", F32),
            ("grid.divergence", F32),
            ("grid.flags", U32),
            ("grid.vorticity", VEC3),
        ];

        let spec = |label, domain, element_bytes: u64, len: u64| BufferSpec {
            label,
            domain,
            element_bytes,
            len,
            bytes: element_bytes
                .checked_mul(len)
                .map_or(u64::MAX, |b| align_to(b, alignment)),
        };

        let mut buffers = Vec::with_capacity(particle_fields.len() + cell_fields.len());
        for (label, size) in particle_fields {
            // The alive counter is a single u32, not per particle.
            let len = if label == "particle.alive" { 1 } else { particles };
            buffers.push(spec(label, BufferDomain::Particles, size, len));
        }
        for (label, size) in cell_fields {
            buffers.push(spec(label, BufferDomain::Cells, size, cells));
        }
        Self { buffers }
    }

    pub fn total_bytes(&self) -> u64 {
        self.buffers
            .iter()
            .fold(0u64, |acc, b| acc.saturating_add(b.bytes))
    }

    /// First buffer larger than the device's binding limit.
    pub fn check_binding_limit(&self, limit: u64) -> Result<(), ResourceError> {
        match self.buffers.iter().find(|b| b.bytes > limit) {
            Some(b) => Err(ResourceError::BufferTooLarge {
                label: b.label,
                bytes: b.bytes,
                limit,
            }),
            None => Ok(()),
        }
    }
}

/// Owned particle and grid storage plus its ledger reservation.
///
/// Only [`dispose`] gives the reservation back; the bundle is consumed.
#[derive(Debug)]
pub struct BufferBundle {
    pub particles: ParticleBuffers,
    pub grid: GridBuffers,
    reserved_bytes: u64,
}

impl BufferBundle {
    pub fn reserved_bytes(&self) -> u64 {
        self.reserved_bytes
    }
}

/// Create a vector of `len` copies of `value`, reporting allocator failure
/// instead of aborting.
pub(crate) fn try_filled<T: Clone>(
    label: &'static str,
    len: usize,
    value: T,
) -> Result<Vec<T>, ResourceError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| ResourceError::AllocationFailed(label))?;
    v.resize(len, value);
    Ok(v)
}

/// Size, check, reserve and create every buffer for `opts`. Atomic: on
/// error nothing stays reserved on `device`.
pub fn allocate<D: ComputeDevice + ?Sized>(
    device: &D,
    opts: &SimulationOptions,
) -> Result<BufferBundle, ResourceError> {
    if !device.supports_dispatch() {
        return Err(ResourceError::NoDispatchSupport(device.label().to_owned()));
    }
    let limits = device.limits();
    let layout = BufferLayout::new(opts, limits.min_storage_buffer_offset_alignment);
    layout.check_binding_limit(limits.max_storage_buffer_binding_size)?;

    let total = layout.total_bytes();
    device.reserve(total)?;

    let created = ParticleBuffers::try_new(opts.max_particles as usize).and_then(|particles| {
        GridBuffers::try_new(&opts.grid).map(|grid| (particles, grid))
    });
    match created {
        Ok((particles, grid)) => {
            info!(
                "allocated {} bytes on `{}` ({} particles, {} cells)",
                total,
                device.label(),
                particles.capacity(),
                grid.cell_count()
            );
            Ok(BufferBundle {
                particles,
                grid,
                reserved_bytes: total,
            })
        }
        Err(e) => {
            device.release(total);
            Err(e)
        }
    }
}

/// Release `bundle`'s storage and its ledger reservation.
pub fn dispose<D: ComputeDevice + ?Sized>(device: &D, bundle: BufferBundle) {
    let bytes = bundle.reserved_bytes;
    drop(bundle);
    device.release(bytes);
    info!("disposed {} bytes on `{}`", bytes, device.label());
}
