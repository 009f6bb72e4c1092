//! Integration tests for building models and loading them through a source.

use deferred_resources::{Material, Model, ModelSource, ResourceError, primitives};
use glam::{Vec3, Vec4};

fn occluder_scene() -> Model {
    let mut model = Model::default();
    let floor = model.push_material(Material::new(Vec4::splat(0.1), Vec4::splat(0.8)));
    let blocker = model.push_material(Material::from_diffuse(Vec4::new(0.9, 0.2, 0.2, 1.0), 0.1));
    model.push_mesh(primitives::plane(0.0, 4.0, floor));
    model.push_mesh(primitives::quad(
        Vec3::new(0.0, 2.5, 0.0),
        Vec3::X,
        Vec3::NEG_Z,
        blocker,
    ));
    model
}

#[test]
fn test_model_as_source() {
    let model = occluder_scene();
    let loaded = model.load_model().expect("a model is its own source");
    assert_eq!(loaded, model);
    assert!(loaded.validate().is_ok());
    assert_eq!(loaded.aabb_min, Vec3::new(-4.0, 0.0, -4.0));
    assert_eq!(loaded.aabb_max, Vec3::new(4.0, 2.5, 4.0));
}

#[test]
fn test_closure_as_source() {
    let source = || Ok(occluder_scene());
    let boxed: Box<dyn ModelSource> = Box::new(source);
    let model = boxed.load_model().unwrap();
    assert_eq!(model.meshes.len(), 2);
    assert_eq!(model.meshes[1].material_index, 1);
}

#[test]
fn test_failing_source_reports_error() {
    let source = || Err(ResourceError::Source("asset missing".to_string()));
    let err = source.load_model().unwrap_err();
    assert!(err.to_string().contains("asset missing"));
}
