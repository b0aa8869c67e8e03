//! Domain model: request context, scoped configuration rows and the produced documents.

pub mod action;
pub mod context;
pub mod descriptor;
pub mod display;
pub mod ports;
pub mod rows;
pub mod scope;
pub mod store;
