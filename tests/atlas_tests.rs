//! Subsurface Profile Atlas Integration Tests
//!
//! Tests for:
//! - Slot assignment and the encoded slot scalar seen by the render context
//! - Profile inheritance along material chains
//! - Slot recycling, updates in place, and the row limit

use std::sync::Arc;

use myth_material::atlas::MAX_ATLAS_ROWS;
use myth_material::interner::{self, SUBSURFACE_PROFILE_PARAMETER};
use myth_material::testing::{MapTextureResolver, MockShaderCompiler};
use myth_material::{
    InstanceKind, MaterialCacheSettings, MaterialDefinition, MaterialDomain, MaterialError,
    MaterialHandle, MaterialSystem, RenderScene, SelectionState, ShadingModel, SlotIndex,
    SubsurfaceProfileSettings,
};

struct World {
    system: MaterialSystem,
    scene: RenderScene,
    skin: MaterialHandle,
}

fn world() -> World {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut system, scene) = MaterialSystem::new(
        MaterialCacheSettings::default(),
        Arc::new(MockShaderCompiler::new()),
        Arc::new(MapTextureResolver::new()),
    );
    let fallback = system
        .create_definition(MaterialDefinition::new("DefaultSurface", MaterialDomain::Surface))
        .unwrap();
    system
        .initialize_defaults([(MaterialDomain::Surface, fallback)])
        .unwrap();
    let skin = system
        .create_definition(
            MaterialDefinition::new("Skin", MaterialDomain::Surface)
                .with_shading_model(ShadingModel::SubsurfaceProfile),
        )
        .unwrap();
    World {
        system,
        scene,
        skin,
    }
}

fn profile_scalar(w: &World, material: MaterialHandle) -> f32 {
    let name = interner::intern(SUBSURFACE_PROFILE_PARAMETER);
    w.scene
        .scalar_value(material, SelectionState::Unselected, name)
}

fn radius(radius: f32) -> SubsurfaceProfileSettings {
    SubsurfaceProfileSettings {
        scatter_radius: radius,
        ..Default::default()
    }
}

// ============================================================================
// Slot assignment
// ============================================================================

#[test]
fn unassigned_material_uses_default_slot() {
    let mut w = world();
    w.scene.process_commands();
    assert_eq!(profile_scalar(&w, w.skin), 0.0);
}

#[test]
fn first_profile_takes_slot_one() {
    let mut w = world();
    let profile = w.system.create_subsurface_profile(radius(16.0)).unwrap();
    w.system.set_subsurface_profile(w.skin, Some(profile)).unwrap();
    w.scene.process_commands();

    assert_eq!(w.system.profile_atlas().find_slot(profile), Some(SlotIndex(1)));
    assert_eq!(profile_scalar(&w, w.skin), 1.0 / 255.0);

    let texture = w.scene.profile_atlas().unwrap();
    assert_eq!(texture.scatter_radius(SlotIndex(1)), Some(16.0));
}

#[test]
fn instances_inherit_profile() {
    let mut w = world();
    let first = w.system.create_subsurface_profile(radius(8.0)).unwrap();
    let second = w.system.create_subsurface_profile(radius(4.0)).unwrap();
    let pale = w
        .system
        .create_instance("Pale", InstanceKind::Constant, Some(w.skin))
        .unwrap();
    let tanned = w
        .system
        .create_instance("Tanned", InstanceKind::Constant, Some(pale))
        .unwrap();

    w.system.set_subsurface_profile(w.skin, Some(first)).unwrap();
    w.system.set_subsurface_profile(tanned, Some(second)).unwrap();
    w.scene.process_commands();

    assert_eq!(profile_scalar(&w, pale), 1.0 / 255.0);
    assert_eq!(profile_scalar(&w, tanned), 2.0 / 255.0);
}

#[test]
fn unknown_profile_is_rejected() {
    let mut w = world();
    let profile = w.system.create_subsurface_profile(radius(8.0)).unwrap();
    w.system.destroy_subsurface_profile(profile).unwrap();

    let err = w
        .system
        .set_subsurface_profile(w.skin, Some(profile))
        .unwrap_err();
    assert!(matches!(err, MaterialError::InvalidHandle(_)));
}

// ============================================================================
// Updates and recycling
// ============================================================================

#[test]
fn update_keeps_slot_and_republishes_texture() {
    let mut w = world();
    let profile = w.system.create_subsurface_profile(radius(16.0)).unwrap();
    w.scene.process_commands();
    let version = w.scene.profile_atlas().unwrap().version;

    let slot = w
        .system
        .update_subsurface_profile(profile, radius(32.0))
        .unwrap();
    w.scene.process_commands();

    assert_eq!(slot, SlotIndex(1));
    let texture = w.scene.profile_atlas().unwrap();
    assert!(texture.version > version);
    assert_eq!(texture.scatter_radius(slot), Some(32.0));
}

#[test]
fn destroyed_profile_falls_back_and_slot_is_reused() {
    let mut w = world();
    let first = w.system.create_subsurface_profile(radius(8.0)).unwrap();
    let second = w.system.create_subsurface_profile(radius(4.0)).unwrap();
    w.system.set_subsurface_profile(w.skin, Some(first)).unwrap();

    w.system.destroy_subsurface_profile(first).unwrap();
    w.scene.process_commands();
    assert_eq!(profile_scalar(&w, w.skin), 0.0);
    assert_eq!(w.system.get(w.skin).unwrap().subsurface_profile(), None);

    let third = w.system.create_subsurface_profile(radius(2.0)).unwrap();
    assert_eq!(w.system.profile_atlas().find_slot(third), Some(SlotIndex(1)));
    assert_eq!(w.system.profile_atlas().find_slot(second), Some(SlotIndex(2)));
}

#[test]
fn atlas_refuses_profiles_past_row_limit() {
    let mut w = world();
    for _ in 1..MAX_ATLAS_ROWS {
        w.system.create_subsurface_profile(radius(1.0)).unwrap();
    }
    let err = w.system.create_subsurface_profile(radius(1.0)).unwrap_err();
    assert!(matches!(err, MaterialError::AtlasFull { capacity: 256 }));
    assert_eq!(w.system.profile_atlas().len(), MAX_ATLAS_ROWS);
}
