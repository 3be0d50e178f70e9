pub mod collision;
pub mod explosion;
