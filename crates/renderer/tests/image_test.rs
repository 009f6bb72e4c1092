//! Pixel-level checks of the rendered attributes and the lit image.

mod common;

use common::{Harness, floor_model, grey, luminance, occluded_floor_model};
use deferred_renderer::POSITION_SENTINEL;
use deferred_resources::{Model, primitives};
use deferred_scene::{Camera, Transform};
use glam::{Mat4, Vec3};

#[test]
fn test_triangle_covers_expected_texels() {
    let mut model = Model::default();
    let material = model.push_material(grey());
    model.push_mesh(primitives::triangle(
        [
            Vec3::new(-1.0, 1.0, 0.5),
            Vec3::new(0.9, 1.0, 0.5),
            Vec3::new(-1.0, -0.9, 0.5),
        ],
        material,
    ));

    let mut harness = Harness::initialized(8, 8, model);
    harness
        .renderer
        .set_view_projection(Mat4::IDENTITY, Mat4::IDENTITY);
    harness.renderer.render_frame().unwrap();
    harness.renderer.wait_idle().unwrap();

    let targets = harness.renderer.frame_targets(0).unwrap();
    let position = harness.device().read_texture(targets.position, 0).unwrap();

    let mut covered = 0;
    for y in 0..8 {
        for x in 0..8 {
            let texel = position.texel(x, y);
            if x + y <= 6 {
                assert_eq!(texel[3], 1.0, "texel ({}, {}) should be covered", x, y);
                covered += 1;
            } else {
                assert_eq!(texel, POSITION_SENTINEL, "texel ({}, {}) should be empty", x, y);
            }
        }
    }
    assert_eq!(covered, 28);
}

/// Luminance of the presented pixel that shows the world origin.
fn origin_luminance(model: Model) -> f32 {
    let mut harness = Harness::initialized(64, 64, model);
    harness.renderer.render_frame().unwrap();
    harness.renderer.wait_idle().unwrap();

    let clip = harness.renderer.camera().view_projection_matrix() * Vec3::ZERO.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    let x = ((ndc.x + 1.0) * 0.5 * 64.0) as u32;
    let y = ((1.0 - ndc.y) * 0.5 * 64.0) as u32;

    let (image, presents) = harness.device().presented_image(harness.surface).unwrap();
    assert_eq!(presents, 1);
    luminance(image.texel(x, y))
}

#[test]
fn test_occluder_darkens_the_floor() {
    let lit = origin_luminance(floor_model());
    let shadowed = origin_luminance(occluded_floor_model());

    assert!(lit > 0.5, "lit floor too dark: {}", lit);
    assert!(shadowed < lit, "occluder did not shadow: {} >= {}", shadowed, lit);
    assert!(shadowed < 0.2, "shadowed floor too bright: {}", shadowed);
}

#[test]
fn test_background_fills_uncovered_pixels() {
    let mut harness = Harness::initialized(16, 16, floor_model());
    // Facing away from the floor
    harness.renderer.set_camera(Camera::looking_at(
        Vec3::new(20.0, 1.0, 0.0),
        Vec3::new(40.0, 1.0, 0.0),
        1.0,
    ));
    harness.renderer.render_frame().unwrap();
    harness.renderer.wait_idle().unwrap();

    let background = harness.renderer.config().background_color;
    let (image, _) = harness.device().presented_image(harness.surface).unwrap();
    for texel in &image.texels {
        for (channel, want) in texel.iter().zip(background) {
            assert!((channel - want).abs() <= 1.0 / 255.0, "{:?} != {:?}", texel, background);
        }
    }
}

#[test]
fn test_world_transform_moves_the_model() {
    let mut harness = Harness::initialized(16, 16, floor_model());
    harness
        .renderer
        .set_world_transform(Transform::new().with_position(Vec3::new(0.0, -500.0, 0.0)));
    harness.renderer.render_frame().unwrap();
    harness.renderer.wait_idle().unwrap();

    let targets = harness.renderer.frame_targets(0).unwrap();
    let position = harness.device().read_texture(targets.position, 0).unwrap();
    assert!(position.texels.iter().all(|t| *t == POSITION_SENTINEL));

    // Back at the origin the floor fills the middle of the view
    harness.renderer.set_world_transform(Transform::default());
    harness.renderer.render_frame().unwrap();
    harness.renderer.wait_idle().unwrap();
    let targets = harness.renderer.frame_targets(1).unwrap();
    let position = harness.device().read_texture(targets.position, 0).unwrap();
    assert_eq!(position.texel(8, 8)[3], 1.0);
}
