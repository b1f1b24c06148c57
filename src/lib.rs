//! # markup-rs
//!
//! Postgres-backed core of a crowd-labeling service.
//!
//! Assessors ask for work and receive one reserved markup at a time, drawn
//! from active batches with a priority-weighted lottery. Each answer is
//! reduced to a fingerprint of the fields it marked; a markup settles once
//! an admin answers it or enough assessors agree. A background reaper
//! reclaims reservations nobody finished.

pub mod clock;
pub mod config;
pub mod consensus;
pub mod db;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod model;
pub mod selection;
pub mod telemetry;
