pub mod filter;
pub mod graph;
pub mod models;
pub mod postgres;
pub mod qdrant;
pub mod schema;
pub mod vector;

mod error;

pub use error::Error;

use std::{future::Future, pin::Pin};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
