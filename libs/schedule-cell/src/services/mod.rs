pub mod blocks;
pub mod schedule;
