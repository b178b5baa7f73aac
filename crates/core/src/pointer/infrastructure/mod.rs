pub mod log_pointer;
