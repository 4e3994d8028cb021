pub mod structures;
pub mod time;
