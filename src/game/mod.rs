pub mod constants;
pub mod stats;
pub mod state;
pub mod upgrades;
pub mod systems;
pub mod runtime;
pub mod match_result;
