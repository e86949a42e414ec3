//! Helpers shared by the unit tests: a spherical harmonic evaluator, a direct
//! convolution reference and synthetic filter stores.

use std::io::Cursor;

use filters::{Ear, FilterStore, MemoryStore};
use rand::{Rng, SeedableRng};

use crate::geometry::SphericalAngle;
use crate::order::AmbisonicOrder;

pub const SAMPLE_RATE: u32 = 48000;

/// Real SN3D spherical harmonics of `direction` up to `order`, ACN order.
pub fn sh_sn3d(order: usize, direction: SphericalAngle) -> Vec<f32> {
    let (az, el) = (direction.azimuth() as f64, direction.elevation() as f64);
    let mut out = Vec::with_capacity((order + 1) * (order + 1));

    for l in 0..=order {
        for m in -(l as isize)..=l as isize {
            let am = m.unsigned_abs();
            let delta = if m == 0 { 1.0 } else { 2.0 };
            let norm = (delta * factorial(l - am) / factorial(l + am)).sqrt();
            let p = legendre(l, am, el.sin());

            let value = if m >= 0 {
                norm * p * (am as f64 * az).cos()
            } else {
                norm * p * (am as f64 * az).sin()
            };

            out.push(value as f32);
        }
    }

    out
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|v| v as f64).product()
}

/// Associated Legendre function without the Condon-Shortley phase.
fn legendre(l: usize, m: usize, x: f64) -> f64 {
    let s = (1.0 - x * x).max(0.0).sqrt();
    let mut pmm = 1.0;
    let mut f = 1.0;

    for _ in 0..m {
        pmm *= f * s;
        f += 2.0;
    }

    if l == m {
        return pmm;
    }

    let mut pm1 = x * (2 * m + 1) as f64 * pmm;

    for ll in m + 2..=l {
        let pll = ((2 * ll - 1) as f64 * x * pm1 - (ll + m - 1) as f64 * pmm) / (ll - m) as f64;
        pmm = pm1;
        pm1 = pll;
    }

    pm1
}

/// Linear convolution of `x` with `h`, truncated to `x.len()` samples.
pub fn convolve_from_definition(x: &[f32], h: &[f32]) -> Vec<f32> {
    let mut x_neg_terms = vec![0.0; h.len() - 1];
    x_neg_terms.extend_from_slice(x);

    (0..x.len())
        .map(|i| {
            Iterator::zip(x_neg_terms.iter().skip(i), h.iter().rev())
                .map(|(x, h)| x * h)
                .fold(0.0, |acc, x| acc + x)
        })
        .collect::<Vec<_>>()
}

/// Deterministic pseudo random taps of ACN channel `channel`.
pub fn hrir_taps(order: AmbisonicOrder, ear: Ear, channel: usize, filter_len: usize) -> Vec<f32> {
    let seed = (order.get() as u64) << 32 | (ear as u64) << 16 | channel as u64;
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    (0..filter_len)
        .map(|t| rng.gen_range(-1.0..1.0) / (1.0 + t as f32))
        .collect()
}

/// Float wave file holding `channels`, all of the same length.
pub fn wav_blob(channels: &[Vec<f32>], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let frames = channels.first().map_or(0, Vec::len);
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();

    for t in 0..frames {
        for channel in channels {
            writer.write_sample(channel[t]).unwrap();
        }
    }

    writer.finalize().unwrap();
    cursor.into_inner()
}

/// Store holding both ears of `order`, built from [`hrir_taps`].
pub fn filter_store(order: AmbisonicOrder, filter_len: usize) -> MemoryStore {
    Ear::ALL.into_iter().fold(MemoryStore::new(), |store, ear| {
        let channels = (0..order.num_channels())
            .map(|k| hrir_taps(order, ear, k, filter_len))
            .collect::<Vec<_>>();

        store.with_filter(order.filter_key(ear), wav_blob(&channels, SAMPLE_RATE))
    })
}

/// Store holding every order.
pub fn full_filter_store(filter_len: usize) -> MemoryStore {
    AmbisonicOrder::all().fold(MemoryStore::new(), |mut store, order| {
        let single = filter_store(order, filter_len);

        for ear in Ear::ALL {
            let key = order.filter_key(ear);
            store.insert(key, single.filter(key).unwrap());
        }

        store
    })
}

#[test]
fn sh_matches_first_order_closed_form() {
    let direction = SphericalAngle::from_degrees(30.0, 20.0);
    let (az, el) = (direction.azimuth(), direction.elevation());
    let sh = sh_sn3d(1, direction);

    assert!((sh[0] - 1.0).abs() < 1e-6);
    assert!((sh[1] - az.sin() * el.cos()).abs() < 1e-6);
    assert!((sh[2] - el.sin()).abs() < 1e-6);
    assert!((sh[3] - az.cos() * el.cos()).abs() < 1e-6);
}
