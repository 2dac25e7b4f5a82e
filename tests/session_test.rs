// SPDX-License-Identifier: Apache-2.0

//! End-to-end session tests driving the acquisition worker thread against
//! the simulated device.

use depthbridge::{
    BodyCandidate, BridgeConfig, ColorFormat, DepthPoint, Error, Session, SimulatedDevice,
    SimulatedDeviceController, StreamKind, JOINT_COUNT, MAX_BODIES,
};
use std::thread;
use std::time::{Duration, Instant};

const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

fn fast_config() -> BridgeConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    BridgeConfig {
        poll_interval: Duration::from_millis(1),
        normalized_depth: true,
        ..BridgeConfig::default()
    }
}

/// Pump `update()` until `kind` publishes or the timeout expires.
fn wait_for_frame(session: &mut Session<SimulatedDevice>, kind: StreamKind) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        session.update();
        if session.is_frame_new(kind) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

fn open_all_streams() -> (Session<SimulatedDevice>, SimulatedDeviceController) {
    let (device, controller) = SimulatedDevice::new();
    let mut session = Session::open(device, fast_config()).unwrap();
    session.init_depth_stream().unwrap();
    session.init_color_stream().unwrap();
    session.init_infrared_stream().unwrap();
    session.init_body_index_stream().unwrap();
    session.init_body_stream(false).unwrap();
    (session, controller)
}

#[test]
fn test_open_without_sensor_fails() {
    let (device, _controller) = SimulatedDevice::unavailable();
    assert!(matches!(
        Session::open(device, fast_config()),
        Err(Error::DeviceUnavailable)
    ));
}

#[test]
fn test_full_lifecycle_all_streams() {
    let (mut session, controller) = open_all_streams();
    session.set_depth_clipping(500.0, 4000.0).unwrap();
    session.start().unwrap();

    let depth_count = session
        .frame_description(StreamKind::Depth)
        .unwrap()
        .pixel_count();
    let color_bytes = session
        .frame_description(StreamKind::Color)
        .unwrap()
        .pixel_count()
        * 4;
    let ir_count = session
        .frame_description(StreamKind::Infrared)
        .unwrap()
        .pixel_count();
    let index_count = session
        .frame_description(StreamKind::BodyIndex)
        .unwrap()
        .pixel_count();

    controller.push_depth_frame(vec![2250u16; depth_count]);
    controller.push_color_frame(vec![0x42u8; color_bytes]);
    controller.push_infrared_frame(vec![7000u16; ir_count]);
    controller.push_body_index_frame(vec![3u8; index_count]);
    let mut tracked = BodyCandidate::untracked();
    tracked.tracked = true;
    controller.push_bodies(vec![tracked]);

    assert!(wait_for_frame(&mut session, StreamKind::Depth));
    assert!(wait_for_frame(&mut session, StreamKind::Color));
    assert!(wait_for_frame(&mut session, StreamKind::Infrared));
    assert!(wait_for_frame(&mut session, StreamKind::BodyIndex));
    assert!(wait_for_frame(&mut session, StreamKind::Body));

    assert_eq!(session.raw_depth_pixels()[0], 2250);
    // 2250mm sits at the midpoint of the 500..4000 clip range.
    let gray = session.depth_pixels()[0];
    assert!(gray > 100 && gray < 155, "midpoint gray was {gray}");
    assert!((session.normalized_depth_pixels()[0] - 2250.0 / 65535.0).abs() < 1e-6);

    assert_eq!(session.color_pixels()[0], 0x42);
    assert_eq!(session.infrared_pixels()[0], 7000);
    assert_eq!(session.body_index_pixels()[0], 3);

    let bodies = session.bodies();
    assert_eq!(bodies.len(), MAX_BODIES);
    assert!(bodies[0].tracked);
    assert_eq!(bodies[0].joints.len(), JOINT_COUNT);
    assert!(bodies[1..].iter().all(|b| !b.tracked && b.joints.is_empty()));

    session.close();
    assert!(!controller.is_open());
}

#[test]
fn test_published_frames_are_never_torn() {
    // Stage frames of distinct uniform values; every published raw frame
    // must be uniform, never a mix of two staged frames.
    let (device, controller) = SimulatedDevice::new();
    let mut session = Session::open(device, fast_config()).unwrap();
    session.init_depth_stream().unwrap();
    session.start().unwrap();

    let count = session
        .frame_description(StreamKind::Depth)
        .unwrap()
        .pixel_count();

    let mut seen = Vec::new();
    for value in 1..=20u16 {
        controller.push_depth_frame(vec![value; count]);
        if wait_for_frame(&mut session, StreamKind::Depth) {
            let front = session.raw_depth_pixels();
            let first = front[0];
            assert!(
                front.iter().all(|&sample| sample == first),
                "torn frame observed at value {first}"
            );
            seen.push(first);
        }
    }

    // Frames publish in staging order, none invented.
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] < w[1]));

    session.close();
}

#[test]
fn test_stale_cycle_publishes_nothing() {
    let (device, controller) = SimulatedDevice::new();
    let mut session = Session::open(device, fast_config()).unwrap();
    session.init_depth_stream().unwrap();
    session.start().unwrap();

    let count = session
        .frame_description(StreamKind::Depth)
        .unwrap()
        .pixel_count();
    controller.push_depth_frame(vec![1234u16; count]);
    assert!(wait_for_frame(&mut session, StreamKind::Depth));

    // Let the worker drain the (now empty) queue, then update again: the
    // front buffer must keep the last published frame verbatim.
    thread::sleep(Duration::from_millis(20));
    session.update();
    assert!(!session.is_frame_new(StreamKind::Depth));
    assert!(!session.is_any_frame_new());
    assert_eq!(session.raw_depth_pixels()[0], 1234);

    session.close();
}

#[test]
fn test_stop_joins_worker_before_release() {
    let (device, controller) = SimulatedDevice::new();
    let mut session = Session::open(device, fast_config()).unwrap();
    session.init_depth_stream().unwrap();
    session.start().unwrap();

    // Worker is alive and polling.
    let before = controller.poll_count();
    thread::sleep(Duration::from_millis(20));
    assert!(controller.poll_count() > before);

    session.stop();

    // After stop() returns the worker has exited: no further device access.
    let after_stop = controller.poll_count();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(controller.poll_count(), after_stop);
    assert!(controller.is_open());

    session.close();
    assert!(!controller.is_open());
    assert_eq!(controller.closed_count(), 1);
}

#[test]
fn test_drop_stops_worker_and_closes_device() {
    let (device, controller) = SimulatedDevice::new();
    let mut session = Session::open(device, fast_config()).unwrap();
    session.init_depth_stream().unwrap();
    session.start().unwrap();
    drop(session);

    let after_drop = controller.poll_count();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(controller.poll_count(), after_drop);
    assert!(!controller.is_open());
}

#[test]
fn test_mapping_with_retained_depth_image() {
    // The `_with` variants map against a caller-retained depth image
    // instead of the live front buffer, which here is still all zeros.
    let (device, _controller) = SimulatedDevice::new();
    let mut session = Session::open(device, fast_config()).unwrap();
    session.init_depth_stream().unwrap();
    session.init_color_stream().unwrap();

    let depth_desc = session.frame_description(StreamKind::Depth).unwrap();
    let mut retained = vec![0u16; depth_desc.pixel_count()];
    retained[212 * depth_desc.width as usize + 256] = 2000;
    let points = vec![DepthPoint::new(256.0, 212.0)];

    let camera = session
        .map_depth_points_to_camera_with(&points, &retained)
        .unwrap();
    assert_eq!(camera.len(), 1);
    assert!((camera[0].z - 2.0).abs() < 1e-6);

    let color = session
        .map_depth_points_to_color_with(&points, &retained)
        .unwrap();
    assert_eq!(color.len(), 1);
    // 256 * 1920/512 + (40000/2000 - 40) = 940.
    assert!((color[0].x - 940.0).abs() < 1e-3);
    assert!((color[0].y - 212.0 * 1080.0 / 424.0).abs() < 1e-3);

    // The live front buffer is untouched zeros: the same query against it
    // hits the no-return path instead.
    let live = session.map_depth_points_to_camera(&points).unwrap();
    assert_eq!(live[0].z, 0.0);
}

#[test]
fn test_yuy2_color_stream_sizing() {
    let (device, controller) = SimulatedDevice::new();
    let config = BridgeConfig {
        color_format: ColorFormat::Yuy2,
        ..fast_config()
    };
    let mut session = Session::open(device, config).unwrap();
    session.init_color_stream().unwrap();

    let desc = session.frame_description(StreamKind::Color).unwrap();
    // Buffers are allocated at 2 bytes per pixel before any frame arrives.
    assert_eq!(session.color_pixels().len(), desc.pixel_count() * 2);

    session.start().unwrap();
    controller.push_color_frame(vec![0x55u8; desc.pixel_count() * 2]);
    assert!(wait_for_frame(&mut session, StreamKind::Color));
    assert_eq!(session.color_pixels().len(), desc.pixel_count() * 2);
    assert_eq!(session.color_pixels()[0], 0x55);

    session.close();
}

#[test]
fn test_mapping_through_running_session() {
    let (device, controller) = SimulatedDevice::new();
    let mut session = Session::open(device, fast_config()).unwrap();
    session.init_depth_stream().unwrap();
    session.init_color_stream().unwrap();
    session.start().unwrap();

    let depth_desc = session.frame_description(StreamKind::Depth).unwrap();
    controller.push_depth_frame(vec![1000u16; depth_desc.pixel_count()]);
    assert!(wait_for_frame(&mut session, StreamKind::Depth));

    let cloud = session.map_depth_frame_to_camera().unwrap();
    assert_eq!(cloud.len(), depth_desc.pixel_count());
    // Uniform 1m depth plane.
    assert!(cloud.iter().all(|p| (p.z - 1.0).abs() < 1e-6));

    let points = vec![depthbridge::DepthPoint::new(256.0, 212.0)];
    let color = session.map_depth_points_to_color(&points).unwrap();
    assert_eq!(color.len(), 1);
    let color_desc = session.frame_description(StreamKind::Color).unwrap();
    assert!(color[0].x >= 0.0 && color[0].x <= color_desc.width as f32 - 1.0);
    assert!(color[0].y >= 0.0 && color[0].y <= color_desc.height as f32 - 1.0);

    session.close();
}
