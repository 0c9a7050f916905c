pub mod context;
pub mod creative;
pub mod event;
pub mod placements;
pub mod response;
