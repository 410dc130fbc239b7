pub mod mock;
pub mod ttp;
