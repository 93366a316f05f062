#![forbid(unsafe_code)]

//! Yggdrasil: peer identity space and XOR-metric peer table.

pub mod peer_table;
