//! Activation functions for CPPN nodes.
//!
//! Every node carries its own activation function, stored as a small integer id
//! into a fixed table. The functions are tuned to give an interesting range of
//! outputs for raw values in roughly `[0, 1]`, which is where CPPN coordinates
//! and clamped outputs live.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Activation function table, in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Activation {
    /// `1 / (1 + e^(8x - 4))`
    Sigmoid = 0,
    /// `tanh(8x - 4)`
    Tanh = 1,
    /// `sin(2πx - π)`, periodic patterns
    Sin = 2,
    /// `e^(-(4x - 2)^2)`, radial patterns
    Gaus = 3,
    /// `max(0, x)`
    Relu = 4,
    /// `x`
    #[default]
    Identity = 5,
    /// `x` clamped to `[0, 1]`
    Clamped = 6,
    /// `1 / x`, or 0 at the origin
    Inv = 7,
    /// `ln(max(1e-7, 8x))`
    Log = 8,
    /// `e^(4x - 2)`
    Exp = 9,
    /// `|x|`, bilateral symmetry
    Abs = 10,
    /// `x^2`
    Square = 11,
    /// `x^3`
    Cube = 12,
    /// Triangle wave with period 1
    Triangle = 13,
    /// Sawtooth wave with period 0.5
    Sawtooth = 14,
    /// Square wave with period 1
    SqrWave = 15,
    /// 1 inside `(-0.1, 0.1)`, 0 elsewhere
    Notch = 16,
    /// `floor(x)`
    Step = 17,
}

impl Activation {
    /// Number of entries in the table.
    pub const COUNT: usize = 18;

    /// All activation functions, indexed by id.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Sigmoid,
        Self::Tanh,
        Self::Sin,
        Self::Gaus,
        Self::Relu,
        Self::Identity,
        Self::Clamped,
        Self::Inv,
        Self::Log,
        Self::Exp,
        Self::Abs,
        Self::Square,
        Self::Cube,
        Self::Triangle,
        Self::Sawtooth,
        Self::SqrWave,
        Self::Notch,
        Self::Step,
    ];

    /// The table id of this function.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Look up a function by table id.
    #[inline]
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Pick a function uniformly at random.
    #[inline]
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.random_range(0..Self::COUNT)]
    }

    /// Apply this activation function to a raw value.
    #[inline]
    #[must_use]
    pub fn apply(self, x: f32) -> f32 {
        use std::f32::consts::PI;

        match self {
            Self::Sigmoid => 1.0 / (1.0 + (8.0 * x - 4.0).exp()),
            Self::Tanh => (8.0 * x - 4.0).tanh(),
            Self::Sin => (2.0 * x * PI - PI).sin(),
            Self::Gaus => (-(4.0 * x - 2.0).powi(2)).exp(),
            Self::Relu => x.max(0.0),
            Self::Identity => x,
            Self::Clamped => x.clamp(0.0, 1.0),
            Self::Inv => {
                if x == 0.0 {
                    0.0
                } else {
                    1.0 / x
                }
            }
            Self::Log => (8.0 * x).max(1e-7).ln(),
            Self::Exp => (4.0 * x - 2.0).exp(),
            Self::Abs => x.abs(),
            Self::Square => x * x,
            Self::Cube => x * x * x,
            Self::Triangle => 2.0 * (2.0 * (x - (x + 0.5).floor())).abs() - 1.0,
            Self::Sawtooth => 4.0 * x.rem_euclid(0.5) - 1.0,
            Self::SqrWave => {
                if x.rem_euclid(1.0) > 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::Notch => {
                if x > -0.1 && x < 0.1 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Step => x.floor(),
        }
    }
}
