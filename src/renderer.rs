//! Rotate-then-decode pipeline.
//!
//! [`Renderer`] lives on the audio thread. Orientation updates come from a
//! [`RotationHandle`] owned by a control thread, through a lock-free single
//! producer single consumer queue. Only the newest queued rotation is applied,
//! the rotation matrix is rebuilt on the audio thread before the next frame.

use filters::FilterStore;
use log::info;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::decoder::{BinauralDecoder, DEFAULT_PARTITION_LEN, DEFAULT_SAMPLE_RATE};
use crate::error::Error;
use crate::frame::AmbisonicFrame;
use crate::geometry::WorldRotation;
use crate::order::AmbisonicOrder;
use crate::rotator::AmbisonicRotator;

const DEFAULT_ROTATION_QUEUE_LEN: usize = 16;

#[must_use]
pub struct RendererBuilder {
    order: usize,
    sample_rate: f32,
    partition_len: usize,
    rotation_queue_len: usize,
}

impl RendererBuilder {
    fn new(order: usize) -> RendererBuilder {
        RendererBuilder {
            order,
            sample_rate: DEFAULT_SAMPLE_RATE,
            partition_len: DEFAULT_PARTITION_LEN,
            rotation_queue_len: DEFAULT_ROTATION_QUEUE_LEN,
        }
    }

    /// Set sampling rate of the filter sets. Default value is 48_000.0.
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set partition size for uniformly partitioned convolution algorithm.
    pub fn with_partition_len(mut self, partition_len: usize) -> Self {
        self.partition_len = partition_len;
        self
    }

    /// Number of rotation updates that may be pending between two frames.
    /// Default value is 16, zero is bumped to one.
    pub fn with_rotation_queue_len(mut self, rotation_queue_len: usize) -> Self {
        self.rotation_queue_len = rotation_queue_len;
        self
    }

    /// Try to build [Renderer](crate::renderer::Renderer) together with the
    /// handle that steers it.
    pub fn build<S>(self, store: &S) -> Result<(Renderer, RotationHandle), Error>
    where
        S: FilterStore + ?Sized,
    {
        let decoder = BinauralDecoder::builder(self.order)
            .with_sample_rate(self.sample_rate)
            .with_partition_len(self.partition_len)
            .build(store)?;

        let rotator = AmbisonicRotator::new(self.order)?;

        let queue_len = self.rotation_queue_len.max(1);
        let (producer, consumer) = HeapRb::new(queue_len).split();

        info!(
            "Renderer ready: order {}, rotation queue of {queue_len}",
            decoder.order().get()
        );

        Ok((
            Renderer {
                rotator,
                decoder,
                updates: consumer,
            },
            RotationHandle { updates: producer },
        ))
    }
}

/// Control side of a [`Renderer`]. Never blocks.
pub struct RotationHandle {
    updates: HeapProd<WorldRotation>,
}

impl RotationHandle {
    /// Queue a scene rotation, see
    /// [`AmbisonicRotator::set_rotation`](crate::rotator::AmbisonicRotator::set_rotation).
    ///
    /// Returns `false` if the queue is full and the update was dropped.
    pub fn set_rotation(&mut self, rotation: WorldRotation) -> bool {
        self.updates.try_push(rotation).is_ok()
    }

    /// Queue a listener head orientation, the inverse of a scene rotation.
    ///
    /// Returns `false` if the queue is full and the update was dropped.
    pub fn set_listener_rotation(&mut self, orientation: WorldRotation) -> bool {
        self.set_rotation(orientation.normalize().inverse())
    }
}

/// Audio side: rotates every frame by the newest orientation and decodes it to
/// stereo.
pub struct Renderer {
    rotator: AmbisonicRotator,
    decoder: BinauralDecoder,
    updates: HeapCons<WorldRotation>,
}

impl Renderer {
    /// Get default [`renderer builder`](crate::renderer::RendererBuilder)
    pub fn builder(order: usize) -> RendererBuilder {
        RendererBuilder::new(order)
    }

    pub fn order(&self) -> AmbisonicOrder {
        self.decoder.order()
    }

    pub fn rotator(&self) -> &AmbisonicRotator {
        &self.rotator
    }

    pub fn decoder(&self) -> &BinauralDecoder {
        &self.decoder
    }

    /// Rotate `frame` in place and decode it to `left` and `right`.
    ///
    /// # Panics
    ///
    /// This method panics if:
    /// - `frame.order() != self.order()`
    /// - `frame.frames() != left.len()`
    /// - `frame.frames() != right.len()`
    pub fn process<O: AsMut<[f32]>>(
        &mut self,
        frame: &mut AmbisonicFrame,
        left: O,
        right: O,
    ) -> Result<(), Error> {
        if let Some(rotation) = self.drain_updates() {
            self.rotator.set_rotation(rotation);
        }

        self.rotator.process(frame);
        self.decoder.process(frame, left, right)
    }

    /// Clear convolution history. The current rotation is kept.
    pub fn reset(&mut self) {
        self.decoder.reset();
    }

    fn drain_updates(&mut self) -> Option<WorldRotation> {
        let mut newest = None;

        while let Some(rotation) = self.updates.try_pop() {
            newest = Some(rotation);
        }

        newest
    }
}
