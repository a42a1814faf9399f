pub mod grid;
pub mod ledger;
pub mod models;
pub mod planner;
