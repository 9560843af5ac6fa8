//! Integration test modules

mod convergence;
mod fakes;
mod schema;
