//! Application layer containing the resolution pipeline.
//!
//! `DescriptorBuilder` is the entry point. It drives the scope resolver, the display
//! assembler and the action composer over a shared, read-only `ConfigStore`. The
//! integrity validator walks the same store offline.

pub mod assembler;
pub mod builder;
pub mod composer;
pub mod overrides;
pub mod polling;
pub mod resolver;
pub mod validator;
