use std::sync::Arc;

use mpflip_core::buffers::BufferLayout;
use mpflip_core::config::Mode;
use mpflip_core::patch::{EmitPatch, GridPatch, TimePatch};
use mpflip_core::{
    create_default, merge, Collider, ComputeDevice, DeviceLimits, HostDevice, OptionsPatch,
    ParticleSimulation, ResourceError, SimError,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_flip_fountain_stays_above_ground() {
    init_logger();
    let patch = OptionsPatch {
        mode: Some(Mode::Flip),
        emit: Some(EmitPatch {
            rate: Some(10_000.0),
            ..Default::default()
        }),
        colliders: Some(vec![Collider::ground(0.0)]),
        ..Default::default()
    };
    let mut sim = ParticleSimulation::new(HostDevice::new(), Some(&patch)).unwrap();
    let thickness = sim.options().colliders[0].thickness;
    let max = sim.options().max_particles as usize;

    for frame in 0..120 {
        let step = sim.update(1.0 / 60.0);
        assert!(step.alive <= max, "frame {frame}");
        let particles = sim.particles();
        let below = particles.position[..particles.alive()]
            .iter()
            .filter(|x| x.y < -thickness)
            .count();
        assert_eq!(below, 0, "frame {frame}: {below} particles under the floor");
    }

    let stats = sim.stats();
    assert!(stats.alive > 0);
    assert!(stats.alive <= max);
    assert_eq!(stats.steps, 120);
    assert!(stats.pressure_residual.is_some());
    assert!(sim
        .particles()
        .position[..stats.alive]
        .iter()
        .all(|x| x.is_finite()));
}

#[test]
fn test_sand_settles_without_blowing_up() {
    init_logger();
    let mut sim = ParticleSimulation::new(HostDevice::new(), None).unwrap();
    sim.apply_preset("sand_mpm").unwrap();
    assert_eq!(sim.options().mode, Mode::Mpm);

    for _ in 0..60 {
        sim.update(1.0 / 60.0);
    }
    let particles = sim.particles();
    let alive = particles.alive();
    assert!(alive > 0);
    assert!(particles.position[..alive].iter().all(|x| x.is_finite()));
    assert!(particles.deformation[..alive].iter().all(|f| f.is_finite()));
    assert!(sim.stats().pressure_residual.is_none());
}

#[test]
fn test_mode_switch_resets_population() {
    init_logger();
    let mut sim = ParticleSimulation::new(HostDevice::new(), None).unwrap();
    for _ in 0..10 {
        sim.update(1.0 / 60.0);
    }
    assert!(sim.particles().alive() > 0);

    let to_mpm = OptionsPatch {
        mode: Some(Mode::Mpm),
        ..Default::default()
    };
    sim.set_params(&to_mpm).unwrap();
    assert_eq!(sim.particles().alive(), 0);
    assert_eq!(
        sim.particles().capacity(),
        sim.options().max_particles as usize
    );
    assert_eq!(sim.stats().mode, Mode::Mpm);

    let expected = BufferLayout::new(sim.options(), 256).total_bytes();
    assert_eq!(sim.device().reserved_bytes(), expected);
}

#[test]
fn test_allocation_failure_is_atomic() {
    init_logger();
    let opts = create_default();
    let needed = BufferLayout::new(&opts, 256).total_bytes();
    let device = Arc::new(HostDevice::with_limits(DeviceLimits {
        memory_budget: needed - 1,
        ..Default::default()
    }));

    let err = ParticleSimulation::new(device.clone(), None).err().unwrap();
    assert!(matches!(
        err,
        SimError::Resource(ResourceError::OutOfBudget { .. })
    ));
    assert_eq!(device.reserved_bytes(), 0);
}

#[test]
fn test_failed_set_params_keeps_previous_bundle() {
    init_logger();
    let opts = create_default();
    let needed = BufferLayout::new(&opts, 256).total_bytes();
    let device = Arc::new(HostDevice::with_limits(DeviceLimits {
        memory_budget: needed + needed / 4,
        ..Default::default()
    }));
    let mut sim = ParticleSimulation::new(device.clone(), None).unwrap();
    for _ in 0..5 {
        sim.update(1.0 / 60.0);
    }
    let alive = sim.particles().alive();
    let before = sim.options().clone();

    let to_mpm = OptionsPatch {
        mode: Some(Mode::Mpm),
        ..Default::default()
    };
    assert!(matches!(
        sim.set_params(&to_mpm),
        Err(SimError::Resource(ResourceError::OutOfBudget { .. }))
    ));
    assert_eq!(sim.options(), &before);
    assert_eq!(sim.particles().alive(), alive);
    assert_eq!(device.reserved_bytes(), needed);

    // Still steps on the old bundle.
    sim.update(1.0 / 60.0);
    assert!(sim.particles().alive() >= alive);
}

#[test]
fn test_binding_limit_rejects_oversized_buffers() {
    let device = HostDevice::with_limits(DeviceLimits {
        max_storage_buffer_binding_size: 1024,
        ..Default::default()
    });
    let err = ParticleSimulation::new(device, None).err().unwrap();
    assert!(matches!(
        err,
        SimError::Resource(ResourceError::BufferTooLarge { .. })
    ));
}

#[test]
fn test_overflowing_grid_reports_resource_error() {
    let patch = OptionsPatch {
        grid: Some(GridPatch {
            resolution: Some([1 << 22; 3]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let device = Arc::new(HostDevice::new());
    let err = ParticleSimulation::new(device.clone(), Some(&patch))
        .err()
        .unwrap();
    assert!(matches!(err, SimError::Resource(_)), "{err:?}");
    assert_eq!(device.reserved_bytes(), 0);

    let mut sim = ParticleSimulation::new(device.clone(), None).unwrap();
    let before = sim.options().clone();
    assert!(matches!(
        sim.set_params(&patch),
        Err(SimError::Resource(_))
    ));
    assert_eq!(sim.options(), &before);
    assert_eq!(
        device.reserved_bytes(),
        BufferLayout::new(&before, 256).total_bytes()
    );
}

#[test]
fn test_large_frame_time_is_clamped() {
    let patch = OptionsPatch {
        time: Some(TimePatch {
            substeps: Some(3),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mut sim = ParticleSimulation::new(HostDevice::new(), Some(&patch)).unwrap();
    let step = sim.update(0.5);
    assert_eq!(step.dt, sim.options().time.dt_max);
    assert_eq!(step.substeps, 3);
    assert_eq!(step.passes, sim.passes().len() * 3);

    let idle = sim.update(0.0);
    assert_eq!(idle.substeps, 0);
    assert_eq!(idle.alive, sim.particles().alive());
}

#[test]
fn test_stats_serialize_camel_case() {
    let mut sim = ParticleSimulation::new(HostDevice::new(), None).unwrap();
    assert_eq!(sim.stats().dt, 0.0);
    let step = sim.update(1.0 / 60.0);
    let stats = sim.stats();
    assert_eq!(stats.dt, step.dt);
    assert!(stats.dt > 0.0);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["mode"], "flip");
    assert!((json["dt"].as_f64().unwrap() - f64::from(step.dt)).abs() < 1e-9);
    assert!(json.get("fps").is_some());
    assert!(json.get("alive").is_some());
    assert!(json.get("reservedBytes").is_some());
    assert!(json.get("pressureResidual").is_some());
    let merged = merge(&create_default(), &OptionsPatch::default());
    assert_eq!(sim.options(), &merged);
    sim.dispose();
}
