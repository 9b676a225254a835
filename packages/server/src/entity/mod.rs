pub mod genre;
pub mod license_option;
pub mod purchase;
pub mod spec;
pub mod spec_genre;
