pub mod media;
pub mod spec;
