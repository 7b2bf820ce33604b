pub mod postgres;

pub use postgres::StateStore;
