// Internal utilities shared by every shpbridge module

pub mod error;
