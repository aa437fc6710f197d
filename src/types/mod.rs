// src/types/mod.rs
//! 数据类型：String / List

pub mod list;
pub mod string;
