//! Application services: form intake and the background reaper.

pub mod reaper;
pub mod upload;
