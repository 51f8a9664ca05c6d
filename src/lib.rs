#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
mod clock;
mod cose;
mod cwt;
mod error;
mod fetch;
mod hcert;
mod parse;
mod recovery;
mod rules;
mod storage;
mod store;
mod trustlist;
mod vaccination;
mod verifier;

pub mod config;
pub mod valuesets;

pub use clock::*;
pub use cose::*;
pub use cwt::*;
pub use error::*;
pub use fetch::*;
pub use hcert::*;
pub use parse::*;
pub use recovery::*;
pub use rules::*;
pub use storage::*;
pub use store::*;
pub use test::*;
pub use trustlist::*;
pub use vaccination::*;
pub use verifier::*;

pub use config::{ConnectionOptions, ValidationPolicy};
pub use valuesets::{ValueSet, ValueSetValue, ValueSets};
