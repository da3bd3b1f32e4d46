//! # Domain Layer for Query Routing
//!
//! - **hash_functions**: keyword tokenisation and the slot hash
//! - **query_route_table**: the table itself (`QueryRouteTable`)
//! - **nibbles**: 4-bit patch entry packing

mod hash_functions;
mod nibbles;
mod query_route_table;

pub use hash_functions::*;
pub use query_route_table::*;
