//! Eingebaute Handler
//!
//! - `basis`: echo, getTime, calculate (Requests) sowie chat, setUsername (Events)

pub mod basis;

pub use basis::basis_handler_registrieren;
