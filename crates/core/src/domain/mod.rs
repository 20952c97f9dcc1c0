pub mod booking;
pub mod search;
pub mod session;
pub mod slots;
