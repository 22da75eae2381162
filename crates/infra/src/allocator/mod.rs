//! Counter-backed sequence allocators.
//!
//! One durable counter per `(tenant, series, fiscal year)` partition is the
//! engine's only shared mutable resource. Both adapters make the
//! read-increment-write indivisible and bound the time spent waiting on the
//! partition lock.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemorySequenceAllocator;
pub use postgres::PostgresSequenceAllocator;
