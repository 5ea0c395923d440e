pub mod bot;
pub mod game;
pub mod room;
pub mod user;
pub mod ws;
