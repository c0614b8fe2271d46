pub mod endpoints;
pub mod events;
pub mod payload;
pub mod runs;
