//! Transform adapters from upstream API shapes into display-oriented rows.

pub mod university;
