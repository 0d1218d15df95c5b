//! Domains module containing business logic organized by bounded contexts.
//!
//! The only domain is **tools**: descriptors, input schemas, handlers and the
//! registry that binds them together.

pub mod tools;
