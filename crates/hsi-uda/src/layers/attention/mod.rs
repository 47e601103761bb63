//! Attention modules.
pub mod simam;
