// src/koinonia/clients/mod.rs

pub mod common;
pub mod openai;
