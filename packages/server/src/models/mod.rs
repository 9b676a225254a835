pub mod shared;
pub mod spec;
