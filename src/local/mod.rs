pub mod process_file;
pub mod record;
