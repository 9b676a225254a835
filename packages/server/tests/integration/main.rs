mod common;

mod delete;
mod media;
mod read;
