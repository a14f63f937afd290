pub mod action_queue;
pub mod handlers;
pub mod progress;
pub mod registry;
pub mod scheduler;
