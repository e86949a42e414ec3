//! Spherical harmonic HRIR sets.
//!
//! A filter store payload is a wave file with one channel per ambisonic
//! channel: channel `k` is the impulse response that takes ACN channel `k` to
//! one ear. Integer samples are scaled to `[-1, 1)`, float samples are taken
//! as is.

use std::io::Cursor;

use filters::{Ear, FilterKey, FilterStore};
use hound::{SampleFormat, WavReader};
use log::debug;

use crate::error::Error;
use crate::order::AmbisonicOrder;

/// Impulse responses of one ambisonic channel, one per ear.
#[derive(Clone, Copy, Debug)]
pub struct HrirPair<'a> {
    pub left: &'a [f32],
    pub right: &'a [f32],
}

/// Impulse responses of every channel of one ambisonic order.
#[derive(Clone, Debug)]
pub struct HrirSet {
    order: AmbisonicOrder,
    sample_rate: u32,
    filter_len: usize,
    /// channel-major left ear taps
    left: Box<[f32]>,
    /// channel-major right ear taps
    right: Box<[f32]>,
}

impl HrirSet {
    /// Fetch and parse both ears of `order` from `store`.
    ///
    /// Fails if a set is missing, malformed, holds the wrong number of
    /// channels or is sampled at a rate other than `sample_rate`.
    pub fn from_store<S>(store: &S, order: AmbisonicOrder, sample_rate: u32) -> Result<Self, Error>
    where
        S: FilterStore + ?Sized,
    {
        let left = EarTaps::load(store, order, Ear::Left, sample_rate)?;
        let right = EarTaps::load(store, order, Ear::Right, sample_rate)?;

        if left.filter_len != right.filter_len {
            return Err(Error::FilterLengthMismatch(left.filter_len, right.filter_len));
        }

        Ok(HrirSet {
            order,
            sample_rate,
            filter_len: left.filter_len,
            left: left.taps,
            right: right.taps,
        })
    }

    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Taps per impulse response.
    pub fn filter_len(&self) -> usize {
        self.filter_len
    }

    pub fn num_channels(&self) -> usize {
        self.order.num_channels()
    }

    /// Impulse responses of ACN channel `channel`.
    pub fn pair(&self, channel: usize) -> HrirPair<'_> {
        let taps = channel * self.filter_len..(channel + 1) * self.filter_len;

        HrirPair {
            left: &self.left[taps.clone()],
            right: &self.right[taps],
        }
    }

    pub fn pairs(&self) -> impl Iterator<Item = HrirPair<'_>> {
        (0..self.num_channels()).map(|channel| self.pair(channel))
    }
}

struct EarTaps {
    filter_len: usize,
    taps: Box<[f32]>,
}

impl EarTaps {
    fn load<S>(store: &S, order: AmbisonicOrder, ear: Ear, sample_rate: u32) -> Result<Self, Error>
    where
        S: FilterStore + ?Sized,
    {
        let key = order.filter_key(ear);
        let blob = store.filter(key).ok_or(Error::MissingFilter(key))?;

        let taps = Self::parse(key, blob, order.num_channels(), sample_rate)?;
        debug!("Parsed filter {key}: {} taps per channel", taps.filter_len);

        Ok(taps)
    }

    fn parse(key: FilterKey, blob: &[u8], channels: usize, sample_rate: u32) -> Result<Self, Error> {
        let invalid = |err| Error::InvalidFilter(key, err);

        let mut reader = WavReader::new(Cursor::new(blob)).map_err(invalid)?;
        let spec = reader.spec();

        if spec.channels as usize != channels {
            return Err(Error::FilterChannelMismatch {
                key,
                expected: channels,
                found: spec.channels as usize,
            });
        }

        if spec.sample_rate != sample_rate {
            return Err(Error::SampleRateMismatch {
                key,
                expected: sample_rate,
                found: spec.sample_rate,
            });
        }

        let interleaved = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>(),
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|s| s as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()
            }
        }
        .map_err(invalid)?;

        let filter_len = interleaved.len() / channels;

        if filter_len == 0 {
            return Err(Error::EmptyFilter(key));
        }

        let mut taps = vec![0.0; channels * filter_len].into_boxed_slice();

        for (t, frame) in interleaved.chunks_exact(channels).enumerate() {
            for (k, sample) in frame.iter().enumerate() {
                taps[k * filter_len + t] = *sample;
            }
        }

        Ok(EarTaps { filter_len, taps })
    }
}
