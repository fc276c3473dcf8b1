pub mod fir;
mod remez;

pub use fir::{BandResponse, BandpassFilter};
