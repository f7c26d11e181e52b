// src/models/mod.rs
pub mod certificate;
pub mod verification;
