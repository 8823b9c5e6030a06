//! Background tasks that run alongside the HTTP server

pub mod autosave;

pub use autosave::autosave_task;
