//! # Module / Weight Caches
//!
//! * [`disk`] - the on-disk download cache, under ``~/.cache/hsi-uda``.
//! * [`weights`] - descriptors of downloadable pretrained weights.
//! * [`prefabs`] - tables of well-known named configs.

pub mod disk;
pub mod prefabs;
pub mod weights;
