pub mod calc;
pub mod character;
pub mod list;
pub mod preset;
pub mod reconcile;
pub mod resets;
pub mod seed;
pub mod snapshot;
pub mod task;
pub mod view;
