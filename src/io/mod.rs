pub mod atomic;
pub mod cloud;
pub mod csv_sink;
pub mod database;
pub mod excel;
pub mod fs;
pub mod parquet_sink;
pub mod ports;
