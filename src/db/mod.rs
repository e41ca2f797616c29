pub mod catalog;
pub mod connect;
pub mod manager;
pub mod pool;
