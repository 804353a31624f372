pub mod desktop;
pub mod group;
