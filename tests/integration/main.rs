#[path = "../fixtures/mod.rs"]
mod fixtures;

mod reactive_test;
