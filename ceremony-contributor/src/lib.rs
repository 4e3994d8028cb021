#[macro_use]
extern crate serde_derive;

#[cfg(test)]
#[macro_use]
extern crate lazy_static;

pub mod attestation;
pub mod cli;
pub mod commands;
pub mod directory;
pub mod entropy;
pub mod environment;
pub mod errors;
pub mod functions;
pub mod logger;
pub mod objects;
pub mod status;
pub mod store;
pub mod tasks;
pub mod transfer;
pub mod utils;

#[cfg(test)]
mod testing;
