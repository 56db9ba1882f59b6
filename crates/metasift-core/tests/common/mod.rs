#![allow(dead_code)]

pub mod fixtures;
pub mod range_server;
