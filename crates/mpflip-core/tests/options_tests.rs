use mpflip_core::config::{EmitShape, Mode, MpmModel};
use mpflip_core::patch::{EmitPatch, FlipPatch, GridPatch, MpmPatch, TimePatch};
use mpflip_core::presets::preset_names;
use mpflip_core::{
    apply_preset, create_default, merge, validate, Collider, ConfigError, OptionsPatch, Preset,
    UnknownPresetError,
};

#[test]
fn test_defaults_validate() {
    let opts = create_default();
    assert_eq!(validate(&opts), Ok(()));
    assert_eq!(opts.mode, Mode::Flip);
    assert_eq!(opts.colliders.len(), 1);
}

#[test]
fn test_every_preset_validates_over_defaults() {
    let base = create_default();
    for name in preset_names() {
        let opts = apply_preset(&base, name).unwrap();
        assert_eq!(validate(&opts), Ok(()), "preset {name}");
    }
}

#[test]
fn test_sand_preset_selects_drucker_prager() {
    let opts = apply_preset(&create_default(), "sand_mpm").unwrap();
    assert_eq!(validate(&opts), Ok(()));
    assert_eq!(opts.mode, Mode::Mpm);
    assert_eq!(opts.mpm.model, MpmModel::DruckerPrager);
}

#[test]
fn test_unknown_preset_is_rejected() {
    let err = apply_preset(&create_default(), "lava").unwrap_err();
    assert_eq!(err, UnknownPresetError("lava".to_owned()));
    assert!(Preset::from_name("Water_Flip").is_err());
}

#[test]
fn test_merge_is_idempotent() {
    let base = create_default();
    let mut patches: Vec<OptionsPatch> = Preset::ALL.iter().map(|p| p.patch()).collect();
    patches.push(OptionsPatch {
        max_particles: Some(1000),
        grid: Some(GridPatch {
            dx: Some(0.1),
            ..Default::default()
        }),
        colliders: Some(vec![Collider::ground(0.0), Collider::sphere([0.0, 0.5, 0.0].into(), 0.3)]),
        ..Default::default()
    });
    for patch in &patches {
        let once = merge(&base, patch);
        assert_eq!(merge(&once, patch), once);
    }
}

#[test]
fn test_merge_leaves_unset_fields_alone() {
    let base = create_default();
    let patch = OptionsPatch {
        flip: Some(FlipPatch {
            vorticity: Some(0.3),
            ..Default::default()
        }),
        ..Default::default()
    };
    let merged = merge(&base, &patch);
    assert_eq!(merged.flip.vorticity, 0.3);
    assert_eq!(merged.flip.pic_flip, base.flip.pic_flip);
    assert_eq!(merged.emit, base.emit);
    assert_eq!(merged.colliders, base.colliders);
}

#[test]
fn test_json_patch_uses_camel_case() {
    let json = r#"{
        "mode": "mpm",
        "maxParticles": 4096,
        "mpm": { "model": "neo_hookean", "youngsModulus": 8000 },
        "emit": { "shape": "box", "speedJitter": 0.0 },
        "colliders": [
            { "kind": "plane", "normal": [0, 1, 0], "offset": 0, "friction": 0.5 },
            { "kind": "box", "center": [0, 0.2, 0], "halfExtents": [0.1, 0.1, 0.1] }
        ]
    }"#;
    let patch: OptionsPatch = serde_json::from_str(json).unwrap();
    let opts = merge(&create_default(), &patch);
    assert_eq!(validate(&opts), Ok(()));
    assert_eq!(opts.mode, Mode::Mpm);
    assert_eq!(opts.max_particles, 4096);
    assert_eq!(opts.mpm.model, MpmModel::NeoHookean);
    assert_eq!(opts.mpm.youngs_modulus, 8000.0);
    assert_eq!(opts.emit.shape, EmitShape::Box);
    assert_eq!(opts.emit.speed_jitter, 0.0);
    assert_eq!(opts.colliders.len(), 2);
    assert_eq!(opts.colliders[0].friction, 0.5);
}

#[test]
fn test_invalid_values_are_reported() {
    let base = create_default();
    let cases: Vec<(OptionsPatch, fn(&ConfigError) -> bool)> = vec![
        (
            OptionsPatch {
                max_particles: Some(0),
                ..Default::default()
            },
            |e| matches!(e, ConfigError::MaxParticles),
        ),
        (
            OptionsPatch {
                grid: Some(GridPatch {
                    resolution: Some([24, 0, 24]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            |e| matches!(e, ConfigError::GridResolution(_)),
        ),
        (
            OptionsPatch {
                grid: Some(GridPatch {
                    dx: Some(f32::NAN),
                    ..Default::default()
                }),
                ..Default::default()
            },
            |e| matches!(e, ConfigError::CellSize(_)),
        ),
        (
            OptionsPatch {
                flip: Some(FlipPatch {
                    pic_flip: Some(1.5),
                    ..Default::default()
                }),
                ..Default::default()
            },
            |e| matches!(e, ConfigError::PicFlip(_)),
        ),
        (
            OptionsPatch {
                emit: Some(EmitPatch {
                    life: Some([5.0, 1.0]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            |e| matches!(e, ConfigError::EmitLife(_)),
        ),
        (
            OptionsPatch {
                emit: Some(EmitPatch {
                    rate: Some(f32::INFINITY),
                    ..Default::default()
                }),
                ..Default::default()
            },
            |e| matches!(e, ConfigError::EmitRate(_)),
        ),
        (
            OptionsPatch {
                time: Some(TimePatch {
                    cfl_limit: Some(-0.5),
                    ..Default::default()
                }),
                ..Default::default()
            },
            |e| matches!(e, ConfigError::CflLimit(_)),
        ),
        (
            OptionsPatch {
                mode: Some(Mode::Mpm),
                mpm: Some(MpmPatch {
                    grid_speed_limit: Some(-1.0),
                    ..Default::default()
                }),
                ..Default::default()
            },
            |e| matches!(e, ConfigError::GridSpeedLimit(_)),
        ),
        (
            OptionsPatch {
                colliders: Some(vec![Collider::ground(0.0).with_friction(2.0)]),
                ..Default::default()
            },
            |e| matches!(e, ConfigError::ColliderCoefficient { index: 0, .. }),
        ),
    ];
    for (patch, expected) in cases {
        let err = validate(&merge(&base, &patch)).unwrap_err();
        assert!(expected(&err), "unexpected error {err:?}");
    }
}

#[test]
fn test_options_round_trip_through_json() {
    let opts = apply_preset(&create_default(), "sheet_flip").unwrap();
    let json = serde_json::to_string(&opts).unwrap();
    assert!(json.contains("\"picFlip\""));
    let back: mpflip_core::SimulationOptions = serde_json::from_str(&json).unwrap();
    assert_eq!(back, opts);
}
