pub mod bot;
pub mod placement;
