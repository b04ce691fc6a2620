//! Publish Integration Tests
//!
//! Tests for:
//! - Batches becoming visible to the render context all at once
//! - Fences tracking what the render context has applied
//! - Render proxy lookups: parent chain, domain default, selection states
//! - Uniform expression caching and invalidation

use std::sync::Arc;

use glam::Vec4;
use myth_material::interner;
use myth_material::testing::{MapTextureResolver, MockShaderCompiler};
use myth_material::{
    GpuTextureHandle, InstanceKind, MaterialCacheSettings, MaterialDefinition, MaterialDomain,
    MaterialHandle, MaterialSystem, ParameterValue, RenderScene, SelectionState, TextureRef,
    UniformExpression,
};

struct World {
    system: MaterialSystem,
    scene: RenderScene,
    textures: Arc<MapTextureResolver>,
    fallback: MaterialHandle,
    base: MaterialHandle,
}

fn world() -> World {
    let _ = env_logger::builder().is_test(true).try_init();
    let textures = Arc::new(MapTextureResolver::new());
    let (mut system, scene) = MaterialSystem::new(
        MaterialCacheSettings::default(),
        Arc::new(MockShaderCompiler::new()),
        textures.clone(),
    );

    let fallback = system
        .create_definition(
            MaterialDefinition::new("DefaultSurface", MaterialDomain::Surface)
                .with_parameter("exposure", 1.0_f32),
        )
        .unwrap();
    system
        .initialize_defaults([(MaterialDomain::Surface, fallback)])
        .unwrap();

    let intensity = interner::intern("intensity");
    let tint = interner::intern("tint");
    let base = system
        .create_definition(
            MaterialDefinition::new("Emissive", MaterialDomain::Surface)
                .with_parameter("intensity", 1.0_f32)
                .with_parameter("tint", Vec4::new(1.0, 0.5, 0.25, 1.0))
                .with_expression(
                    "emissive",
                    UniformExpression::multiply(
                        UniformExpression::scalar(intensity, 1.0),
                        UniformExpression::vector(tint, Vec4::ONE),
                    ),
                ),
        )
        .unwrap();

    World {
        system,
        scene,
        textures,
        fallback,
        base,
    }
}

fn sym(name: &str) -> myth_material::Symbol {
    interner::intern(name)
}

// ============================================================================
// Batches and fences
// ============================================================================

#[test]
fn edits_are_invisible_until_processed() {
    let mut w = world();
    let a = w
        .system
        .create_instance("EmissiveA", InstanceKind::Constant, Some(w.base))
        .unwrap();
    w.scene.process_commands();

    w.system
        .set_parameter_value(a, "intensity", ParameterValue::Scalar(4.0))
        .unwrap();
    assert_eq!(
        w.scene.scalar_value(a, SelectionState::Unselected, sym("intensity")),
        1.0
    );

    assert_eq!(w.scene.process_commands(), 1);
    assert_eq!(
        w.scene.scalar_value(a, SelectionState::Unselected, sym("intensity")),
        4.0
    );
}

#[test]
fn fence_completes_after_processing() {
    let mut w = world();
    let a = w
        .system
        .create_instance("EmissiveA", InstanceKind::Constant, Some(w.base))
        .unwrap();
    w.system
        .set_parameter_value(a, "intensity", ParameterValue::Scalar(2.0))
        .unwrap();

    let fence = w.system.render_fence();
    assert!(!fence.is_complete());
    w.scene.process_commands();
    assert!(fence.is_complete());
}

#[test]
fn dropped_scene_does_not_block_mutation() {
    let World {
        mut system,
        scene,
        base,
        ..
    } = world();
    drop(scene);

    let a = system
        .create_instance("EmissiveA", InstanceKind::Constant, Some(base))
        .unwrap();
    system
        .set_parameter_value(a, "intensity", ParameterValue::Scalar(2.0))
        .unwrap();
    assert!(system.render_fence().is_complete());
}

// ============================================================================
// Proxy lookups
// ============================================================================

#[test]
fn every_selection_state_sees_the_update() {
    let mut w = world();
    let a = w
        .system
        .create_instance("EmissiveA", InstanceKind::Constant, Some(w.base))
        .unwrap();
    w.system
        .set_parameter_value(a, "intensity", ParameterValue::Scalar(3.0))
        .unwrap();
    w.scene.process_commands();

    for selection in SelectionState::ALL {
        assert_eq!(w.scene.scalar_value(a, selection, sym("intensity")), 3.0);
        let proxy = w.scene.get_render_proxy(a, selection).unwrap();
        assert_eq!(proxy.selection(), selection);
        assert_eq!(proxy.local_scalar(sym("intensity")), Some(3.0));
    }
}

#[test]
fn missing_value_comes_from_domain_default() {
    let mut w = world();
    w.scene.process_commands();
    assert_eq!(
        w.scene.scalar_value(w.base, SelectionState::Unselected, sym("exposure")),
        1.0
    );
    assert_eq!(
        w.scene.scalar_value(w.base, SelectionState::Unselected, sym("undeclared")),
        0.0
    );
}

#[test]
fn domain_without_default_uses_surface_default() {
    let mut w = world();
    let post = w
        .system
        .create_definition(MaterialDefinition::new("Bloom", MaterialDomain::PostProcess))
        .unwrap();
    w.scene.process_commands();

    let default = w
        .scene
        .default_proxy(MaterialDomain::PostProcess, SelectionState::Unselected)
        .unwrap();
    assert_eq!(default.material(), w.fallback);
    assert_eq!(
        w.scene.scalar_value(post, SelectionState::Unselected, sym("exposure")),
        1.0
    );
}

#[test]
fn destroyed_material_renders_as_default() {
    let mut w = world();
    let a = w
        .system
        .create_instance("EmissiveA", InstanceKind::Constant, Some(w.base))
        .unwrap();
    w.scene.process_commands();
    let count = w.scene.proxy_count();

    w.system.destroy(a).unwrap();
    w.scene.process_commands();

    assert_eq!(w.scene.proxy_count(), count - 1);
    assert!(w.scene.get_render_proxy(a, SelectionState::Unselected).is_none());
    assert_eq!(
        w.scene.scalar_value(a, SelectionState::Unselected, sym("exposure")),
        1.0
    );
}

#[test]
fn textures_resolve_through_the_chain() {
    let mut w = world();
    let albedo = TextureRef::new();
    let missing = TextureRef::new();
    w.textures.insert(albedo, GpuTextureHandle(7));

    let wall = w
        .system
        .create_definition(
            MaterialDefinition::new("Wall", MaterialDomain::Surface).with_parameter("albedo", albedo),
        )
        .unwrap();
    let brick = w
        .system
        .create_instance("Brick", InstanceKind::Constant, Some(wall))
        .unwrap();
    w.system
        .set_parameter_value(brick, "albedo", ParameterValue::Texture(missing))
        .unwrap();
    w.scene.process_commands();

    // An unresolvable override leaves no local binding, so the parent's shows through.
    assert_eq!(
        w.scene.texture_value(brick, SelectionState::Unselected, sym("albedo")),
        Some(GpuTextureHandle(7))
    );
}

#[test]
fn teardown_clears_render_defaults() {
    let mut w = world();
    w.scene.process_commands();
    assert!(w
        .scene
        .default_proxy(MaterialDomain::Surface, SelectionState::Unselected)
        .is_some());

    assert_eq!(w.system.teardown_defaults(), vec![w.fallback]);
    w.scene.process_commands();
    assert!(w
        .scene
        .default_proxy(MaterialDomain::Surface, SelectionState::Unselected)
        .is_none());
}

// ============================================================================
// Uniform expressions
// ============================================================================

#[test]
fn expression_uses_effective_values() {
    let mut w = world();
    let a = w
        .system
        .create_instance("EmissiveA", InstanceKind::Constant, Some(w.base))
        .unwrap();
    w.system
        .set_parameter_value(a, "intensity", ParameterValue::Scalar(2.0))
        .unwrap();
    w.scene.process_commands();

    let value = w.scene.uniform_value(a, SelectionState::Unselected, sym("emissive"));
    assert_eq!(value, Vec4::new(2.0, 1.0, 0.5, 2.0));
}

#[test]
fn expression_cache_recomputes_only_after_invalidation() {
    let mut w = world();
    let a = w
        .system
        .create_instance("EmissiveA", InstanceKind::Constant, Some(w.base))
        .unwrap();
    w.scene.process_commands();

    let proxy = || w.scene.get_render_proxy(a, SelectionState::Unselected).unwrap();
    let _ = w.scene.uniform_value(a, SelectionState::Unselected, sym("emissive"));
    let _ = w.scene.uniform_value(a, SelectionState::Unselected, sym("emissive"));
    assert_eq!(proxy().expression_evaluations(), 1);
    assert!(proxy().is_expression_cache_valid());

    // A change on the parent invalidates the child's cache too.
    w.system
        .set_parameter_value(w.base, "intensity", ParameterValue::Scalar(3.0))
        .unwrap();
    w.scene.process_commands();
    assert!(!w
        .scene
        .get_render_proxy(a, SelectionState::Unselected)
        .unwrap()
        .is_expression_cache_valid());

    let value = w.scene.uniform_value(a, SelectionState::Unselected, sym("emissive"));
    assert_eq!(value, Vec4::new(3.0, 1.5, 0.75, 3.0));
    assert_eq!(
        w.scene
            .get_render_proxy(a, SelectionState::Unselected)
            .unwrap()
            .expression_evaluations(),
        2
    );
}

// ============================================================================
// Render thread
// ============================================================================

enum RenderRequest {
    Process(flume::Sender<usize>),
    Scalar(MaterialHandle, myth_material::Symbol, flume::Sender<f32>),
}

fn spawn_render_thread(
    mut scene: RenderScene,
) -> (flume::Sender<RenderRequest>, std::thread::JoinHandle<()>) {
    let (requests, inbox) = flume::unbounded();
    let thread = std::thread::spawn(move || {
        for request in inbox.iter() {
            match request {
                RenderRequest::Process(reply) => {
                    let _ = reply.send(scene.process_commands());
                }
                RenderRequest::Scalar(material, name, reply) => {
                    let _ = reply.send(scene.scalar_value(material, SelectionState::Unselected, name));
                }
            }
        }
    });
    (requests, thread)
}

fn process(requests: &flume::Sender<RenderRequest>) -> usize {
    let (reply, answer) = flume::bounded(1);
    requests.send(RenderRequest::Process(reply)).unwrap();
    answer.recv().unwrap()
}

fn read_scalar(requests: &flume::Sender<RenderRequest>, material: MaterialHandle, name: &str) -> f32 {
    let (reply, answer) = flume::bounded(1);
    requests
        .send(RenderRequest::Scalar(material, sym(name), reply))
        .unwrap();
    answer.recv().unwrap()
}

#[test]
fn render_thread_applies_batches_and_gates_destruction() {
    let World {
        mut system,
        scene,
        base,
        ..
    } = world();
    let old_parent = system
        .create_definition(
            MaterialDefinition::new("Old", MaterialDomain::Surface).with_parameter("intensity", 5.0_f32),
        )
        .unwrap();
    let a = system
        .create_instance("EmissiveA", InstanceKind::Constant, Some(old_parent))
        .unwrap();

    let (requests, thread) = spawn_render_thread(scene);
    assert!(process(&requests) > 0);
    assert_eq!(read_scalar(&requests, a, "intensity"), 5.0);

    // The render thread still references the old parent until it applies the reparent.
    system.set_parent(a, Some(base)).unwrap();
    system.destroy(old_parent).unwrap();
    system
        .set_parameter_value(a, "tint", ParameterValue::Vector(Vec4::ZERO))
        .unwrap();
    assert_eq!(system.pending_destroy_count(), 1);
    assert_eq!(system.collect_garbage(), 0);
    assert!(system.get(old_parent).is_some());
    assert_eq!(read_scalar(&requests, a, "intensity"), 5.0);

    let fence = system.render_fence();
    assert!(!fence.is_complete());
    assert!(process(&requests) > 0);
    assert!(fence.is_complete());
    assert_eq!(read_scalar(&requests, a, "intensity"), 1.0);

    assert_eq!(system.collect_garbage(), 1);
    assert!(system.get(old_parent).is_none());
    assert_eq!(process(&requests), 1);

    drop(requests);
    thread.join().unwrap();
}
