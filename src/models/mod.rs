pub mod board;
pub mod game;
pub mod room;
pub mod user;
