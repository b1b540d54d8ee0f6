//! Database layer: schema, migrations, ranking routines.

pub mod migrations;
pub mod ranking;
pub mod schema;
