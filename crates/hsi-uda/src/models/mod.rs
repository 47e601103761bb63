//! # Models
//!
//! Feature-extracting backbones and the transfer network built on them.

pub mod alexnet;
pub mod backbone;
pub mod dann;
pub mod resnet;
pub mod rsp_resnet;
pub mod transfer_net;
