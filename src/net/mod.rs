pub mod protocol;
pub mod sink;
