#![forbid(unsafe_code)]

pub mod visitors;
