//! Sample detections with deterministic content.

use firerelay::detection::{Detection, Image, Telemetry};

/// Twelve bytes opening and closing a JPEG stream.
pub const JPEG_STUB: [u8; 12] = [
    0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46, 0x49, 0x46, 0xff, 0xd9,
];

/// Telemetry for a fixed position over the test range.
#[must_use]
pub fn sample_telemetry() -> Telemetry {
    Telemetry {
        captured_at: 1_700_000_000_000_000,
        latitude: 34.0522,
        longitude: -118.2437,
        altitude: 120.5,
        yaw: 90.0,
        pitch: -2.5,
        roll: 0.25,
        speed: 42.0,
    }
}

/// A detection with [`JPEG_STUB`] as its image.
///
/// # Panics
///
/// Never; the `jpg` extension is always valid.
#[must_use]
pub fn sample_detection(id: &str) -> Detection {
    let image = Image::new(JPEG_STUB.to_vec(), "jpg").expect("jpg is a valid extension");
    Detection::new(id, sample_telemetry(), 87.5, image)
}

/// A detection whose telemetry and image bytes are derived from `id`.
///
/// Different ids yield different artifacts, so a server that mixed up
/// payloads between sessions stores something other than
/// `distinct_detection(id)` under `id`.
///
/// # Panics
///
/// Never; the `jpg` extension is always valid.
#[must_use]
pub fn distinct_detection(id: &str) -> Detection {
    let seed = id
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
            (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
    let fraction = |shift: u32| f64::from(u16::try_from((seed >> shift) & 0x3fff).unwrap_or(0)) / 100.0;
    let telemetry = Telemetry {
        captured_at: 1_700_000_000_000_000 + (seed >> 24) % 1_000_000_000,
        latitude: 30.0 + fraction(0),
        longitude: -120.0 + fraction(14),
        altitude: 50.0 + fraction(28),
        yaw: fraction(42) / 50.0,
        ..sample_telemetry()
    };
    let mut bytes = JPEG_STUB[..10].to_vec();
    bytes.extend_from_slice(id.as_bytes());
    bytes.extend_from_slice(&seed.to_be_bytes());
    bytes.extend_from_slice(&JPEG_STUB[10..]);
    let image = Image::new(bytes, "jpg").expect("jpg is a valid extension");
    Detection::new(id, telemetry, 50.0 + fraction(50) / 400.0, image)
}
