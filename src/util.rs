//! Shared utility modules used across imgsim components.

pub mod simd;
pub mod varint;
