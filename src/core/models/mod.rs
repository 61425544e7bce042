pub mod sensor;
pub mod usage;
