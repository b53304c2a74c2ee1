pub mod controller;
pub mod fsm;
pub mod probe;
pub mod versions;
