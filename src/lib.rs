//! # Ambinaural
//!
//! Ambisonic to binaural rendering
//!
//! This crate renders Ambisonic sound fields of order 1 to 7 (ACN channel
//! ordering, SN3D normalization) to two-channel headphone audio. A sound field
//! is rotated by the [`rotator`] module to follow a listener's head, then
//! decoded by the [`decoder`] module, which convolves every ambisonic channel
//! with its pair of spherical harmonic head related impulse responses.
//!
//! Impulse responses are fetched by key from an injected
//! [`FilterStore`](filters::FilterStore), see the `binaural-filters` crate.
//!
//! [`rotator`]: `crate::rotator`
//! [`decoder`]: `crate::decoder`
//!
//! # Example
//!
//! ```no_run
//!
//! use ambinaural::filters::MemoryStore;
//! use ambinaural::{AmbisonicFrame, AmbisonicOrder, Renderer};
//! use glam::Quat;
//!
//! // Filter sets named `1OA_L.wav`, `1OA_R.wav`, ...
//! let store = MemoryStore::from_dir("my/filters").unwrap();
//!
//! let (mut renderer, mut handle) = Renderer::builder(3)
//!     .with_sample_rate(48000.0)
//!     .with_partition_len(256)
//!     .build(&store)
//!     .unwrap();
//!
//! // from the control thread
//! handle.set_listener_rotation(Quat::from_rotation_y(0.5));
//!
//! let order = AmbisonicOrder::new(3).unwrap();
//! let mut frame = AmbisonicFrame::new(order, 256);
//! let mut left = vec![0.0; 256];
//! let mut right = vec![0.0; 256];
//!
//! // read_input(&mut frame)
//!
//! renderer.process(&mut frame, &mut left, &mut right).unwrap();
//! ```

pub mod decoder;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod hrir;
pub mod order;
pub mod renderer;
pub mod rotator;

#[cfg(test)]
mod test_utils;

pub use filters;

pub use decoder::{BinauralDecoder, DecoderBuilder};
pub use error::Error;
pub use frame::AmbisonicFrame;
pub use geometry::{SphericalAngle, WorldPosition, WorldRotation};
pub use order::AmbisonicOrder;
pub use renderer::{Renderer, RendererBuilder, RotationHandle};
pub use rotator::{AmbisonicRotator, ShRotationMatrix};
