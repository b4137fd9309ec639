pub mod account;
pub mod ask;
pub mod nutrition;
pub mod tips;
pub mod tracker;
