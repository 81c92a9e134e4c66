//! Eingebaute Processor-Handler
//!
//! - `collab`: cursor:move, canvas:save, chat:message, user:typing

pub mod collab;

pub use collab::collab_handler_registrieren;
