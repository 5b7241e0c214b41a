//! Catalog mirror core: upstream client, pagination fetch loop, category
//! partitioning, the snapshot cache and its refresh/query layers.

pub mod cache;
pub mod categorize;
pub mod error;
pub mod fetcher;
pub mod product;
pub mod query;
pub mod scheduler;
pub mod upstream;
