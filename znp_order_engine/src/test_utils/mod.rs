//! Helpers for tests and local development: throwaway databases and seed data.
pub mod prepare_env;
pub mod seed;
