//! Spherical harmonic rotation of ambisonic sound fields.
//!
//! A rotation acts on every degree `l` separately, so the rotation matrix of
//! an order-`N` sound field is block diagonal with one `(2l+1)×(2l+1)` block
//! per degree. The degree-1 block is the cartesian rotation matrix expressed
//! in the ambisonic axes. Higher blocks follow from the degree-1 block and the
//! block one degree lower through the recurrence of Ivanic and Ruedenberg:
//!
//! J. Ivanic, K. Ruedenberg, "Rotation Matrices for Real Spherical Harmonics.
//! Direct Determination by Recursion", J. Phys. Chem. 100 (1996) and the
//! additions and corrections in J. Phys. Chem. A 102 (1998).
//!
//! Ambisonic axes relate to the world frame as `X = -z` (front), `Y = -x`
//! (left) and `Z = y` (up). Channels are in ACN order, the blocks are the same
//! for SN3D and N3D normalization.

use glam::{Mat3, Quat};

use crate::error::Error;
use crate::frame::AmbisonicFrame;
use crate::geometry::{WorldRotation, EPSILON};
use crate::order::AmbisonicOrder;

/// Sign of world axis `i` when expressed in the degree-1 ambisonic channels
/// `(Y, Z, X)`. The channel order happens to match the world axis order
/// `(x, y, z)`.
const AXIS_SIGNS: [f32; 3] = [-1.0, 1.0, -1.0];

/// Rotation matrix acting on the ACN channels of one ambisonic order.
#[derive(Clone, Debug)]
pub struct ShRotationMatrix {
    order: AmbisonicOrder,
    /// row-major block of every degree, `bands[l]` is `(2l+1)²` long
    bands: Box<[Box<[f32]>]>,
    /// recurrence weights `[u, v, w]` per block element, empty below degree 2
    weights: Box<[Box<[[f32; 3]]>]>,
    identity: bool,
}

impl ShRotationMatrix {
    /// Identity rotation of `order`.
    pub fn new(order: AmbisonicOrder) -> Self {
        let n = order.get();

        let bands = (0..=n)
            .map(|l| identity_block(2 * l + 1))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let weights = (0..=n)
            .map(|l| match l {
                0 | 1 => Box::default(),
                _ => band_weights(l),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        ShRotationMatrix {
            order,
            bands,
            weights,
            identity: true,
        }
    }

    pub fn from_rotation(order: AmbisonicOrder, rotation: WorldRotation) -> Self {
        let mut matrix = Self::new(order);
        matrix.update(rotation);
        matrix
    }

    /// Recompute every block for `rotation`. Does not allocate.
    ///
    /// Rotations closer than [`EPSILON`] to the identity produce the exact
    /// identity matrix. A zero or non finite quaternion counts as identity.
    pub fn update(&mut self, rotation: WorldRotation) {
        let rotation = normalized(rotation);

        if rotation.xyz().length() < EPSILON {
            if !self.identity {
                for (l, band) in self.bands.iter_mut().enumerate() {
                    set_identity(band, 2 * l + 1);
                }
                self.identity = true;
            }
            return;
        }

        let r = Mat3::from_quat(rotation);

        for i in 0..3 {
            for j in 0..3 {
                self.bands[1][i * 3 + j] = AXIS_SIGNS[i] * AXIS_SIGNS[j] * r.col(j)[i];
            }
        }

        for l in 2..=self.order.get() {
            let (lower, upper) = self.bands.split_at_mut(l);
            band_rotation(l, &lower[1], &lower[l - 1], &self.weights[l], &mut upper[0]);
        }

        self.identity = false;
    }

    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    pub fn num_channels(&self) -> usize {
        self.order.num_channels()
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Row-major `(2l+1)×(2l+1)` block of degree `l`.
    pub fn band(&self, l: usize) -> &[f32] {
        &self.bands[l]
    }

    /// Element of the full matrix, zero outside the diagonal blocks.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        let (l, m) = crate::order::degree_and_index(row);
        let (k, n) = crate::order::degree_and_index(col);

        if l != k {
            return 0.0;
        }

        centered(&self.bands[l], l, m, n)
    }

    /// Full row-major `(N+1)²×(N+1)²` matrix.
    pub fn to_dense(&self) -> Vec<f32> {
        let k = self.num_channels();
        let mut dense = vec![0.0; k * k];

        for (l, band) in self.bands.iter().enumerate() {
            let (off, d) = (l * l, 2 * l + 1);

            for (i, row) in band.chunks_exact(d).enumerate() {
                dense[(off + i) * k + off..(off + i) * k + off + d].copy_from_slice(row);
            }
        }

        dense
    }

    /// Rotate a single vector of channel coefficients.
    ///
    /// # Panics
    ///
    /// This method panics if:
    /// - `input.len() != self.num_channels()`
    /// - `output.len() != self.num_channels()`
    pub fn apply(&self, input: &[f32], output: &mut [f32]) {
        assert_eq!(input.len(), self.num_channels());
        assert_eq!(output.len(), self.num_channels());

        for (l, band) in self.bands.iter().enumerate() {
            let (off, d) = (l * l, 2 * l + 1);
            let x = &input[off..off + d];

            for (y, row) in Iterator::zip(output[off..off + d].iter_mut(), band.chunks_exact(d)) {
                *y = dot(row, x);
            }
        }
    }
}

/// Rotates ambisonic frames in place.
///
/// [`set_rotation`](AmbisonicRotator::set_rotation) only records the new
/// orientation; the matrix is rebuilt by the next call to
/// [`process`](AmbisonicRotator::process), on the thread that processes audio.
#[derive(Clone, Debug)]
pub struct AmbisonicRotator {
    matrix: ShRotationMatrix,
    rotation: WorldRotation,
    dirty: bool,
    /// input coefficients of one band at one sample
    scratch: Box<[f32]>,
}

impl AmbisonicRotator {
    /// Rotator for sound fields of `order`, which must be in `1..=7`.
    pub fn new(order: usize) -> Result<Self, Error> {
        let order = AmbisonicOrder::new(order)?;

        Ok(AmbisonicRotator {
            matrix: ShRotationMatrix::new(order),
            rotation: Quat::IDENTITY,
            dirty: false,
            scratch: vec![0.0; 2 * order.get() + 1].into_boxed_slice(),
        })
    }

    pub fn order(&self) -> AmbisonicOrder {
        self.matrix.order()
    }

    /// Rotate the scene: a source at direction `d` ends up at `rotation * d`.
    pub fn set_rotation(&mut self, rotation: WorldRotation) {
        self.rotation = normalized(rotation);
        self.dirty = true;
    }

    /// Compensate the listener's head orientation, the inverse of
    /// [`set_rotation`](AmbisonicRotator::set_rotation).
    pub fn set_listener_rotation(&mut self, orientation: WorldRotation) {
        self.set_rotation(normalized(orientation).inverse());
    }

    pub fn rotation(&self) -> WorldRotation {
        self.rotation
    }

    /// Rotation matrix for the current rotation.
    pub fn matrix(&mut self) -> &ShRotationMatrix {
        self.refresh();
        &self.matrix
    }

    /// Rotate `frame` in place, sample by sample.
    ///
    /// # Panics
    ///
    /// This method panics if:
    /// - `frame.order() != self.order()`
    pub fn process(&mut self, frame: &mut AmbisonicFrame) {
        assert_eq!(frame.order(), self.order());

        self.refresh();

        if self.matrix.is_identity() {
            return;
        }

        let frames = frame.frames();
        let data = frame.as_mut_slice();

        for t in 0..frames {
            // degree 0 is rotation invariant
            for l in 1..self.matrix.bands.len() {
                let (off, d) = (l * l, 2 * l + 1);
                let x = &mut self.scratch[..d];

                for (i, x) in x.iter_mut().enumerate() {
                    *x = data[(off + i) * frames + t];
                }

                for (i, row) in self.matrix.bands[l].chunks_exact(d).enumerate() {
                    data[(off + i) * frames + t] = dot(row, x);
                }
            }
        }
    }

    fn refresh(&mut self) {
        if self.dirty {
            self.matrix.update(self.rotation);
            self.dirty = false;
        }
    }
}

fn normalized(rotation: WorldRotation) -> WorldRotation {
    let len = rotation.length();

    if len.is_finite() && len > 0.0 {
        rotation / len
    } else {
        Quat::IDENTITY
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    Iterator::zip(a.iter(), b.iter())
        .map(|(a, b)| a * b)
        .fold(0.0, |acc, x| acc + x)
}

fn identity_block(d: usize) -> Box<[f32]> {
    let mut block = vec![0.0; d * d].into_boxed_slice();
    set_identity(&mut block, d);
    block
}

fn set_identity(block: &mut [f32], d: usize) {
    block.fill(0.0);
    for i in 0..d {
        block[i * d + i] = 1.0;
    }
}

/// Element `(m, n)` of the degree-`l` block, indices in `[-l, l]`.
#[inline]
fn centered(block: &[f32], l: usize, m: isize, n: isize) -> f32 {
    let d = 2 * l + 1;
    let (i, j) = ((m + l as isize) as usize, (n + l as isize) as usize);
    block[i * d + j]
}

/// Recurrence weights `[u, v, w]` for every `(m, n)` of degree `l`.
fn band_weights(l: usize) -> Box<[[f32; 3]]> {
    let li = l as isize;

    (-li..=li)
        .flat_map(|m| (-li..=li).map(move |n| uvw(li, m, n)))
        .collect()
}

fn uvw(l: isize, m: isize, n: isize) -> [f32; 3] {
    let d = if m == 0 { 1.0 } else { 0.0 };
    let am = m.abs();

    let denom = if n.abs() == l {
        (2 * l * (2 * l - 1)) as f64
    } else {
        ((l + n) * (l - n)) as f64
    };

    let u = (((l + m) * (l - m)) as f64 / denom).sqrt();
    let v = 0.5 * ((1.0 + d) * ((l + am - 1) * (l + am)) as f64 / denom).sqrt() * (1.0 - 2.0 * d);
    let w = -0.5 * (((l - am - 1) * (l - am)).max(0) as f64 / denom).sqrt() * (1.0 - d);

    [u as f32, v as f32, w as f32]
}

/// Block of degree `l` from the degree-1 block `r1` and the degree `l-1`
/// block `prev`.
fn band_rotation(l: usize, r1: &[f32], prev: &[f32], weights: &[[f32; 3]], out: &mut [f32]) {
    let li = l as isize;
    let rec = Recurrence { l: li, r1, prev };

    for (idx, (out, [u, v, w])) in Iterator::zip(out.iter_mut(), weights.iter()).enumerate() {
        let m = (idx / (2 * l + 1)) as isize - li;
        let n = (idx % (2 * l + 1)) as isize - li;

        // zero weights guard terms whose indices fall outside degree l-1
        let mut acc = 0.0;

        if *u != 0.0 {
            acc += u * rec.u(m, n);
        }
        if *v != 0.0 {
            acc += v * rec.v(m, n);
        }
        if *w != 0.0 {
            acc += w * rec.w(m, n);
        }

        *out = acc;
    }
}

struct Recurrence<'a> {
    l: isize,
    r1: &'a [f32],
    prev: &'a [f32],
}

impl Recurrence<'_> {
    fn r1(&self, i: isize, j: isize) -> f32 {
        centered(self.r1, 1, i, j)
    }

    fn prev(&self, i: isize, j: isize) -> f32 {
        centered(self.prev, (self.l - 1) as usize, i, j)
    }

    fn p(&self, i: isize, a: isize, b: isize) -> f32 {
        let l = self.l;

        if b == l {
            self.r1(i, 1) * self.prev(a, l - 1) - self.r1(i, -1) * self.prev(a, -l + 1)
        } else if b == -l {
            self.r1(i, 1) * self.prev(a, -l + 1) + self.r1(i, -1) * self.prev(a, l - 1)
        } else {
            self.r1(i, 0) * self.prev(a, b)
        }
    }

    fn u(&self, m: isize, n: isize) -> f32 {
        self.p(0, m, n)
    }

    fn v(&self, m: isize, n: isize) -> f32 {
        match m {
            0 => self.p(1, 1, n) + self.p(-1, -1, n),
            1 => self.p(1, 0, n) * std::f32::consts::SQRT_2,
            -1 => self.p(-1, 0, n) * std::f32::consts::SQRT_2,
            m if m > 0 => self.p(1, m - 1, n) - self.p(-1, -m + 1, n),
            m => self.p(1, m + 1, n) + self.p(-1, -m - 1, n),
        }
    }

    fn w(&self, m: isize, n: isize) -> f32 {
        match m {
            0 => 0.0,
            m if m > 0 => self.p(1, m + 1, n) + self.p(-1, -m - 1, n),
            m => self.p(1, m - 1, n) - self.p(-1, -m + 1, n),
        }
    }
}
