pub mod broadcast;
pub mod games;
pub mod history;
pub mod rooms;
