//! Domain model module declarations.

pub mod course;
pub mod message;
pub mod reminder;
pub mod session;
