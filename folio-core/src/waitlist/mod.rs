//! Priority waitlists for exhausted titles.

pub mod scoring;
mod service;

pub use service::WaitlistService;
