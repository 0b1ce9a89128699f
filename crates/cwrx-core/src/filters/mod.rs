//! Filter implementations
//!
//! The decode pipeline only needs one filter family: low-pass IIR
//! cascades for the I and Q branches of the quadrature demodulator.

pub mod biquad;

pub use biquad::{Biquad, ButterworthLowpass};
