pub mod image_encoding;
pub mod jsonl_flag_store;
pub mod memory_flag_store;
pub mod openai_compatible_backend;
pub mod rest_flag_store;

#[cfg(test)]
pub(crate) mod stub_server;
