use std::sync::Arc;

use image::{Rgba, RgbaImage};
use visual_field_sim::config::{Configuration, CustomDisplay, DisplayConfig, EffectConfig, EffectKind};
use visual_field_sim::display::DeviceKind;
use visual_field_sim::error::EffectError;
use visual_field_sim::frame::{Frame, PixelFormat};
use visual_field_sim::mask::{BLANK_MASK, DirectoryMaskLoader, Eye, MemoryMaskLoader};
use visual_field_sim::processing::backend::UnavailableBackend;
use visual_field_sim::processing::cpu::CpuBackend;
use visual_field_sim::session::Session;

const SCOTOMA_LEFT: &str = "central_scotoma_simulated_left_clamp30_gaussian";
const SCOTOMA_RIGHT: &str = "central_scotoma_simulated_right_clamp30_gaussian";

/// White disc of radius 4 in the middle of a 16x16 black texture.
fn disc_mask() -> RgbaImage {
    RgbaImage::from_fn(16, 16, |x, y| {
        let dx = x as f32 + 0.5 - 8.0;
        let dy = y as f32 + 0.5 - 8.0;
        if dx * dx + dy * dy < 16.0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    })
}

fn scotoma_loader() -> MemoryMaskLoader {
    MemoryMaskLoader::new()
        .with(SCOTOMA_LEFT, disc_mask())
        .with(SCOTOMA_RIGHT, disc_mask())
}

fn config(kind: EffectKind, condition: i32) -> Configuration {
    Configuration {
        display: DisplayConfig {
            device: Some("Vive Pro".into()),
            custom: None,
        },
        effect: EffectConfig::new(kind, condition),
        ..Configuration::default()
    }
}

fn grey_frame(size: u32) -> Frame {
    Frame::from_image(
        RgbaImage::from_pixel(size, size, Rgba([160, 160, 160, 255])),
        PixelFormat::Rgba8Unorm,
    )
}

fn gradient_frame(size: u32) -> Frame {
    Frame::from_image(
        RgbaImage::from_fn(size, size, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8, 255])
        }),
        PixelFormat::Rgba8Unorm,
    )
}

#[test]
fn opaque_scotoma_covers_the_center_only() {
    let mut session = Session::with_backend(
        &config(EffectKind::Opaque, 1),
        Box::new(scotoma_loader()),
        Arc::new(CpuBackend),
    )
    .unwrap();
    assert_eq!(session.profile().id, DeviceKind::VivePro);
    assert!(session.mapping().scale_x > 1.0);

    let source = grey_frame(32);
    for eye in [Eye::Left, Eye::Right] {
        let mut destination = Frame::new(32, 32, PixelFormat::Rgba8Unorm);
        session.render(eye, &source, &mut destination).unwrap();
        assert_eq!(destination.image().get_pixel(16, 16).0, [0, 0, 0, 255]);
        assert_eq!(destination.image().get_pixel(0, 0).0, [160, 160, 160, 255]);
        assert_eq!(destination.image().get_pixel(31, 31).0, [160, 160, 160, 255]);
    }
    assert_eq!(session.compositor(Eye::Left).mask().name(), SCOTOMA_LEFT);
    assert_eq!(session.compositor(Eye::Right).mask().name(), SCOTOMA_RIGHT);
}

#[test]
fn condition_zero_leaves_frames_untouched() {
    let mut session = Session::with_backend(
        &config(EffectKind::Blur, 0),
        Box::new(MemoryMaskLoader::new()),
        Arc::new(CpuBackend),
    )
    .unwrap();
    assert_eq!(session.compositor(Eye::Left).mask().name(), BLANK_MASK);
    let source = gradient_frame(24);
    let mut destination = Frame::new(24, 24, PixelFormat::Rgba8Unorm);
    session.render(Eye::Left, &source, &mut destination).unwrap();
    assert_eq!(destination.image().as_raw(), source.image().as_raw());
}

#[test]
fn blur_scotoma_softens_the_center() {
    let loader = MemoryMaskLoader::new()
        .with("central_scotoma_simulated_left_clamp30_gaussian", disc_mask())
        .with("central_scotoma_simulated_right_clamp30_gaussian", disc_mask());
    let mut session = Session::with_backend(
        &config(EffectKind::Blur, 4),
        Box::new(loader),
        Arc::new(CpuBackend),
    )
    .unwrap();
    let source = Frame::from_image(
        RgbaImage::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        }),
        PixelFormat::Rgba8Unorm,
    );
    let mut destination = Frame::new(32, 32, PixelFormat::Rgba8Unorm);
    session.render(Eye::Right, &source, &mut destination).unwrap();

    let center = destination.image().get_pixel(16, 16).0[0];
    assert!(center > 60 && center < 195, "center {center}");
    assert_eq!(destination.image().get_pixel(0, 0), source.image().get_pixel(0, 0));
}

#[test]
fn missing_mask_fails_session_start() {
    let err = Session::with_backend(
        &config(EffectKind::Blur, 3),
        Box::new(MemoryMaskLoader::new()),
        Arc::new(CpuBackend),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err.downcast_ref::<EffectError>(),
        Some(EffectError::ResourceNotFound(_))
    ));
}

#[test]
fn degenerate_geometry_fails_session_start() {
    let mut cfg = config(EffectKind::Opaque, 0);
    cfg.display.custom = Some(CustomDisplay {
        screen_width: 1440,
        screen_height: 1600,
        fov_x: 0.0,
        fov_y: 100.0,
    });
    let err = Session::with_backend(&cfg, Box::new(MemoryMaskLoader::new()), Arc::new(CpuBackend))
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<EffectError>(),
        Some(EffectError::DegenerateGeometry(_))
    ));
}

#[test]
fn failed_condition_switch_keeps_both_masks() {
    let loader = scotoma_loader();
    let mut session = Session::with_backend(
        &config(EffectKind::Opaque, 1),
        Box::new(loader),
        Arc::new(CpuBackend),
    )
    .unwrap();
    let err = session.set_condition(2).unwrap_err();
    assert!(matches!(err, EffectError::ResourceNotFound(_)));
    assert_eq!(session.compositor(Eye::Left).mask().name(), SCOTOMA_LEFT);
    assert_eq!(session.compositor(Eye::Right).mask().name(), SCOTOMA_RIGHT);

    session.set_condition(17).unwrap();
    assert_eq!(session.compositor(Eye::Left).mask().name(), BLANK_MASK);
    assert_eq!(session.compositor(Eye::Right).mask().name(), BLANK_MASK);
}

#[test]
fn reference_fov_change_is_validated() {
    let mut session = Session::with_backend(
        &config(EffectKind::Opaque, 0),
        Box::new(MemoryMaskLoader::new()),
        Arc::new(CpuBackend),
    )
    .unwrap();
    let before = *session.mapping();
    assert!(matches!(
        session.set_reference_fov(0.0),
        Err(EffectError::DegenerateGeometry(_))
    ));
    assert_eq!(*session.mapping(), before);

    session.set_reference_fov(30.0).unwrap();
    assert!(session.mapping().scale_x > before.scale_x);
    assert!((session.reference_fov() - 30.0).abs() < f32::EPSILON);
}

#[test]
fn unavailable_backend_passes_frames_through() {
    let mut session = Session::with_backend(
        &config(EffectKind::Blur, 4),
        Box::new(scotoma_loader()),
        Arc::new(UnavailableBackend::new("wgpu-compute", "no adapter")),
    )
    .unwrap();
    let source = gradient_frame(16);
    let mut destination = Frame::new(16, 16, PixelFormat::Rgba8Unorm);
    session.render(Eye::Left, &source, &mut destination).unwrap();
    assert_eq!(destination, source);
}

#[test]
fn parameters_can_be_tuned_from_another_thread() {
    let mut session = Session::with_backend(
        &config(EffectKind::Opaque, 1),
        Box::new(scotoma_loader()),
        Arc::new(CpuBackend),
    )
    .unwrap();
    let handle = session.compositor(Eye::Left).parameters().clone();
    std::thread::spawn(move || handle.update(|p| p.mask_color = [1.0, 0.0, 0.0, 1.0]))
        .join()
        .unwrap();

    let source = grey_frame(32);
    let mut destination = Frame::new(32, 32, PixelFormat::Rgba8Unorm);
    session.render(Eye::Left, &source, &mut destination).unwrap();
    assert_eq!(destination.image().get_pixel(16, 16).0, [255, 0, 0, 255]);

    session.render(Eye::Right, &source, &mut destination).unwrap();
    assert_eq!(destination.image().get_pixel(16, 16).0, [0, 0, 0, 255]);
}

#[test]
fn directory_loader_feeds_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let ring = RgbaImage::from_fn(16, 16, |x, _| {
        if x < 2 || x > 13 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    });
    ring.save(dir.path().join("peripheral_loss_left_approx.png"))
        .unwrap();
    ring.save(dir.path().join("peripheral_loss_right_approx.png"))
        .unwrap();

    let mut cfg = config(EffectKind::Opaque, 2);
    cfg.mask_directory = dir.path().to_path_buf();
    let loader = DirectoryMaskLoader::new(&cfg.mask_directory);
    let mut session =
        Session::with_backend(&cfg, Box::new(loader), Arc::new(CpuBackend)).unwrap();
    assert_eq!(
        session.compositor(Eye::Left).mask().name(),
        "peripheral_loss_left_approx"
    );

    let source = grey_frame(32);
    let mut destination = Frame::new(32, 32, PixelFormat::Rgba8Unorm);
    session.render(Eye::Left, &source, &mut destination).unwrap();
    assert_eq!(destination.image().get_pixel(16, 16).0, [160, 160, 160, 255]);
    assert_eq!(destination.image().get_pixel(0, 16).0, [0, 0, 0, 255]);
}
