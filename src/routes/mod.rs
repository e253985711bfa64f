pub mod cors;
pub mod routes;
