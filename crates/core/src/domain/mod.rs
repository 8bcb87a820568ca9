pub mod ids;
pub mod menu;
pub mod symbol;
