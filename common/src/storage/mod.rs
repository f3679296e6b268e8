pub mod chunk_index;
pub mod db;
pub mod types;
