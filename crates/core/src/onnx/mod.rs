pub mod load;
pub mod proto;
pub mod save;
