pub mod circuit_breaker;
pub mod database;
pub mod health;
pub mod mail;
pub mod rbmq;
pub mod schedule;
pub mod search;
